//! FFmpeg concat demuxer list files.

use std::path::{Path, PathBuf};

use crate::error::MediaResult;

/// Ordered list of clips for `-f concat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcatList {
    clips: Vec<PathBuf>,
}

impl ConcatList {
    pub fn new<I, P>(clips: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            clips: clips.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clips(&self) -> &[PathBuf] {
        &self.clips
    }

    /// File contents: one `file '<path>'` line per clip.
    ///
    /// Paths use forward slashes; single quotes are closed, escaped and
    /// reopened as the demuxer expects.
    pub fn render(&self) -> String {
        self.clips
            .iter()
            .map(|p| {
                let path = p.to_string_lossy().replace('\\', "/").replace('\'', r"'\''");
                format!("file '{path}'\n")
            })
            .collect()
    }

    /// Write the list with absolute clip paths.
    pub async fn write_to(&self, list_path: &Path) -> MediaResult<()> {
        let mut absolute = Vec::with_capacity(self.clips.len());
        for clip in &self.clips {
            absolute.push(tokio::fs::canonicalize(clip).await?);
        }
        tokio::fs::write(list_path, Self { clips: absolute }.render()).await?;
        Ok(())
    }
}
