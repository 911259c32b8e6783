//! Saves synthesized audio to a local directory.
//!
//! The body is streamed into `<name>.partial` and renamed once complete, so
//! an interrupted download never leaves a truncated file under the final name.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::orchestrator::DownloadSink;

/// [`DownloadSink`] that writes files into `dir`.
#[derive(Debug, Clone)]
pub struct HttpDownloadSink {
    client: reqwest::Client,
    dir: PathBuf,
}

impl HttpDownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch `url` into `dir/filename`, returning the final path.
    pub async fn save(&self, url: &str, filename: &str) -> Result<PathBuf, String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("failed to create download dir: {e}"))?;

        let dest = self.dir.join(filename);
        let partial = self.dir.join(format!("{filename}.partial"));

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("download request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("download failed with status {}", resp.status()));
        }

        let total = resp.content_length();
        let file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| format!("failed to open partial file: {e}"))?;

        // Once the partial file exists, every failure goes through here.
        let bytes_done = match finish(resp, file, &partial, &dest).await {
            Ok(n) => n,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&partial).await {
                    warn!("download: could not remove {}: {rm}", partial.display());
                }
                return Err(e);
            }
        };

        match total {
            Some(t) => debug!("download: {bytes_done}/{t} bytes"),
            None => debug!("download: {bytes_done} bytes"),
        }
        info!("download: saved {}", dest.display());
        Ok(dest)
    }
}

/// Stream the body into `file`, then move `partial` onto `dest`.
async fn finish(
    resp: reqwest::Response,
    mut file: tokio::fs::File,
    partial: &Path,
    dest: &Path,
) -> Result<u64, String> {
    let mut bytes_done = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| format!("download stream error: {e}"))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("failed to write chunk: {e}"))?;
        bytes_done += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| format!("flush failed: {e}"))?;
    drop(file);

    tokio::fs::rename(partial, dest)
        .await
        .map_err(|e| format!("failed to finalize download: {e}"))?;
    Ok(bytes_done)
}

impl DownloadSink for HttpDownloadSink {
    async fn download(&self, url: &str, filename: &str) -> Result<(), String> {
        self.save(url, filename).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    #[tokio::test]
    async fn saves_body_under_final_name() {
        let router =
            Router::new().route("/f.mp3", get(|| async { vec![0xFFu8, 0xFB, 0x90, 0x00] }));
        let base = spawn_mock(router).await;
        let dir = tempfile::tempdir().unwrap();
        let sink = HttpDownloadSink::new(dir.path().join("out"));

        let path = sink.save(&format!("{base}/f.mp3"), "듣기.mp3").await.unwrap();
        assert_eq!(path, dir.path().join("out").join("듣기.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xFB, 0x90, 0x00]);
        assert!(!dir.path().join("out").join("듣기.mp3.partial").exists());
    }

    #[tokio::test]
    async fn http_error_leaves_nothing_behind() {
        let router = Router::new().route("/gone.mp3", get(|| async { StatusCode::NOT_FOUND }));
        let base = spawn_mock(router).await;
        let dir = tempfile::tempdir().unwrap();
        let sink = HttpDownloadSink::new(dir.path());

        let err = sink
            .download(&format!("{base}/gone.mp3"), "x.mp3")
            .await
            .unwrap_err();
        assert!(err.contains("404"));
        assert!(!dir.path().join("x.mp3").exists());
    }

    #[tokio::test]
    async fn failed_finalize_removes_partial_file() {
        let router =
            Router::new().route("/f.mp3", get(|| async { vec![0xFFu8, 0xFB, 0x90, 0x00] }));
        let base = spawn_mock(router).await;
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        std::fs::create_dir_all(dir.path().join("x.mp3").join("occupied")).unwrap();
        let sink = HttpDownloadSink::new(dir.path());

        let err = sink.save(&format!("{base}/f.mp3"), "x.mp3").await.unwrap_err();
        assert!(err.contains("failed to finalize download"));
        assert!(!dir.path().join("x.mp3.partial").exists());
        assert!(dir.path().join("x.mp3").is_dir());
    }
}
