//! Result downloads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;

/// Fetches a generated asset to a local path.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64>;
}

/// Streams HTTP responses to `<dest>.part`, then moves them into place.
#[derive(Clone)]
pub struct HttpDownloader {
    http: Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("cloner-media/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!("{url} returned {status}")));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut part_name = dest.as_os_str().to_os_string();
        part_name.push(".part");
        let part = std::path::PathBuf::from(part_name);

        let written = async {
            let mut file = tokio::fs::File::create(&part).await?;
            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<_, MediaError>(written)
        }
        .await;

        let written = match written {
            Ok(0) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(MediaError::download_failed(format!("{url} returned an empty body")));
            }
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        move_file(&part, dest).await?;
        debug!(url, bytes = written, "Download complete");
        info!("Downloaded {} ({:.2} MB)", dest.display(), written as f64 / 1_048_576.0);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_writes_destination_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scene_1.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4 bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("videos").join("scene_1.mp4");
        let n = HttpDownloader::new(Duration::from_secs(5))
            .unwrap()
            .download(&format!("{}/scene_1.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(n, 9);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"mp4 bytes");
        assert!(!dir.path().join("videos").join("scene_1.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_download_http_error_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("scene_2.mp4");
        let err = HttpDownloader::new(Duration::from_secs(5))
            .unwrap()
            .download(&format!("{}/expired", server.uri()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed { .. }));
        assert!(!dest.exists());
    }
}
