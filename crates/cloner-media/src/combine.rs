//! Clip combination.
//!
//! Clips are joined with the concat demuxer, either by stream copy or by
//! re-encoding to H.264/AAC. An optional music track then replaces the
//! audio and fades out over the last seconds of the video.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::concat::ConcatList;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_files;
use crate::probe::probe_duration;

/// Default combination timeout.
pub const DEFAULT_COMBINE_TIMEOUT: Duration = Duration::from_secs(300);

/// What to combine and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineRequest {
    /// Clips in playback order
    pub clips: Vec<PathBuf>,
    pub output: PathBuf,
    /// Background track replacing the clips' audio
    pub music: Option<PathBuf>,
    /// Music fade-out length in seconds
    pub fade_duration: f64,
    /// Re-encode instead of stream copy
    pub re_encode: bool,
}

impl CombineRequest {
    pub fn new(clips: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            clips,
            output: output.into(),
            music: None,
            fade_duration: 2.0,
            re_encode: false,
        }
    }

    pub fn with_music(mut self, music: impl Into<PathBuf>, fade_duration: f64) -> Self {
        self.music = Some(music.into());
        self.fade_duration = fade_duration;
        self
    }

    pub fn with_re_encode(mut self, re_encode: bool) -> Self {
        self.re_encode = re_encode;
        self
    }
}

/// Joins clips into one file.
#[async_trait]
pub trait Combiner: Send + Sync {
    async fn combine(&self, request: &CombineRequest) -> MediaResult<PathBuf>;
}

/// Concat command over a list file.
pub fn concat_command(list: &Path, output: &Path, re_encode: bool) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(output).input_with(["-f", "concat", "-safe", "0"], list);
    if re_encode {
        cmd.video_codec("libx264")
            .preset("medium")
            .crf(23)
            .audio_codec("aac")
    } else {
        cmd.output_args(["-c", "copy"])
    }
}

/// Music overlay with a fade-out starting `fade` seconds before `video_duration`.
pub fn music_command(
    video: &Path,
    music: &Path,
    output: &Path,
    video_duration: f64,
    fade: f64,
) -> FfmpegCommand {
    let start = (video_duration - fade).max(0.0);
    FfmpegCommand::new(output)
        .input(video)
        .input(music)
        .filter_complex(format!("[1:a]afade=t=out:st={start:.3}:d={fade:.3}[audio]"))
        .map("0:v")
        .map("[audio]")
        .video_codec("copy")
        .audio_codec("aac")
        .output_arg("-shortest")
}

/// FFmpeg-backed [`Combiner`].
#[derive(Debug, Clone)]
pub struct FfmpegCombiner {
    runner: FfmpegRunner,
}

impl Default for FfmpegCombiner {
    fn default() -> Self {
        Self::new(DEFAULT_COMBINE_TIMEOUT)
    }
}

impl FfmpegCombiner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(timeout),
        }
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.runner = self.runner.with_cancel(cancel_rx);
        self
    }

    async fn check_inputs(request: &CombineRequest) -> MediaResult<()> {
        if request.clips.is_empty() {
            return Err(MediaError::NothingToCombine("no clips given".to_string()));
        }
        for clip in request.clips.iter().chain(request.music.iter()) {
            if !tokio::fs::try_exists(clip).await? {
                return Err(MediaError::FileNotFound(clip.clone()));
            }
        }
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn run_steps(&self, request: &CombineRequest, temp: &mut Vec<PathBuf>) -> MediaResult<()> {
        let dir = request
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let tag = Uuid::new_v4().simple().to_string();

        // Where the joined clips go before music is laid over them.
        let joined = if request.music.is_some() {
            let p = dir.join(format!(".combined-{tag}.mp4"));
            temp.push(p.clone());
            p
        } else {
            request.output.clone()
        };

        if request.clips.len() == 1 {
            info!("Single clip, copying instead of concatenating");
            tokio::fs::copy(&request.clips[0], &joined).await?;
        } else {
            let list_path = dir.join(format!(".concat-{tag}.txt"));
            temp.push(list_path.clone());
            ConcatList::new(request.clips.iter().cloned())
                .write_to(&list_path)
                .await?;

            info!(
                clips = request.clips.len(),
                re_encode = request.re_encode,
                "Combining clips"
            );
            self.runner
                .run(&concat_command(&list_path, &joined, request.re_encode))
                .await?;
        }

        if let Some(music) = &request.music {
            let duration = match probe_duration(&joined).await {
                Ok(d) => d,
                Err(e) => {
                    warn!("Could not probe combined duration, fading from the start: {}", e);
                    request.fade_duration
                }
            };
            info!(music = %music.display(), fade = request.fade_duration, "Adding background music");
            self.runner
                .run(&music_command(
                    &joined,
                    music,
                    &request.output,
                    duration,
                    request.fade_duration,
                ))
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Combiner for FfmpegCombiner {
    async fn combine(&self, request: &CombineRequest) -> MediaResult<PathBuf> {
        Self::check_inputs(request).await?;

        let mut temp = Vec::new();
        let result = self.run_steps(request, &mut temp).await;
        remove_files(&temp).await;
        result?;

        if !tokio::fs::try_exists(&request.output).await? {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg succeeded but the output file is missing",
                None,
                None,
            ));
        }
        let size = tokio::fs::metadata(&request.output).await?.len();
        info!(
            "Combined {} clip(s) into {} ({:.2} MB)",
            request.clips.len(),
            request.output.display(),
            size as f64 / 1_048_576.0
        );
        Ok(request.output.clone())
    }
}
