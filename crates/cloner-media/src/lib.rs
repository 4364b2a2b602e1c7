//! FFmpeg CLI wrapper and media downloads.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeouts via tokio
//! - Clip concatenation with optional background music
//! - Streaming downloads of generated assets

pub mod combine;
pub mod command;
pub mod concat;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use combine::{CombineRequest, Combiner, FfmpegCombiner, DEFAULT_COMBINE_TIMEOUT};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::ConcatList;
pub use download::{Downloader, HttpDownloader};
pub use error::{MediaError, MediaResult};
pub use probe::probe_duration;
pub use progress::FfmpegProgress;
