//! [`Fetcher`] over HTTP(S) with `reqwest`.
//!
//! Downloads run on a [`JoinSet`], at most `concurrency` at a time. Each one
//! is bounded by a timeout that covers the freshness check and the body.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{destination_for, FetchReport, Fetcher};
use crate::config::FetchConfig;
use crate::error::FetchError;

/// Downloads remote images into a cache directory.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    dest_dir: PathBuf,
    concurrency: usize,
    timeout: Duration,
    progress: Option<MultiProgress>,
}

impl HttpFetcher {
    /// Build a fetcher that stores files under `dest_dir`.
    pub fn new(config: &FetchConfig, dest_dir: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self {
            client,
            dest_dir: dest_dir.into(),
            concurrency: config.concurrency.max(1),
            timeout: config.timeout(),
            progress: None,
        })
    }

    /// Override the per-download timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show one byte-progress bar per download.
    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, urls: &[String]) -> FetchReport {
        let mut report = FetchReport::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();

        for url in urls {
            if !seen.insert(url.as_str()) {
                continue;
            }
            let dest = match destination_for(&self.dest_dir, url) {
                Ok(dest) => dest,
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping image");
                    report.failed.insert(url.clone(), e);
                    continue;
                }
            };

            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let progress = self.progress.clone();
            let timeout = self.timeout;
            let url = url.clone();

            tasks.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire_owned().await;
                info!(url = %url, dest = %dest.display(), "Fetching image");

                let download = download(&client, &url, &dest, progress.as_ref());
                let result = match tokio::time::timeout(timeout, download).await {
                    Ok(result) => result.map(|()| dest),
                    Err(_) => {
                        let _ = tokio::fs::remove_file(part_path(&dest)).await;
                        Err(FetchError::Timeout(timeout))
                    }
                };
                (url, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, Ok(path))) => {
                    report.downloaded.insert(url, path);
                }
                Ok((url, Err(e))) => {
                    warn!(url = %url, error = %e, "Download failed");
                    report.failed.insert(url, e);
                }
                Err(e) => warn!(error = %e, "Download task aborted"),
            }
        }

        report
    }
}

/// Download `url` into `dest`, unless `dest` already holds the same number
/// of bytes a successful HEAD announces for it.
async fn download(
    client: &Client,
    url: &str,
    dest: &Path,
    progress: Option<&MultiProgress>,
) -> Result<(), FetchError> {
    if let Ok(meta) = tokio::fs::metadata(dest).await {
        match client.head(url).send().await {
            Ok(head)
                if head.status().is_success() && declared_length(&head) == Some(meta.len()) =>
            {
                debug!(url = %url, "Cached copy is current");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!(url = %url, error = %e, "HEAD failed, downloading again"),
        }
    }

    let mut response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let expected = response.content_length();

    let part = part_path(dest);
    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| FetchError::io(&part, e))?;

    let bar = progress.map(|multi| multi.add(download_bar(url, expected)));
    let mut written: u64 = 0;
    let copied: Result<(), FetchError> = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(&part, e))?;
            written += chunk.len() as u64;
            if let Some(bar) = &bar {
                bar.inc(chunk.len() as u64);
            }
        }
        file.flush().await.map_err(|e| FetchError::io(&part, e))
    }
    .await;
    drop(file);
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    // A short body usually fails in `chunk()` already; this covers a clean close
    let verified = copied.and_then(|()| match expected {
        Some(expected) if written < expected => Err(FetchError::truncated(expected, written)),
        _ => Ok(()),
    });
    if let Err(e) = verified {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e);
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| FetchError::io(dest, e))
}

/// `Content-Length` as sent by the server.
///
/// Read from the header map: for HEAD responses the body is empty and the
/// size hint would say zero.
fn declared_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn download_bar(url: &str, length: Option<u64>) -> ProgressBar {
    let bar = match length {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:40!} [{bar:30.cyan/blue}] {bytes}/{total_bytes}")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    bar.set_message(url.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

    fn fetcher(dir: &Path) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default(), dir).unwrap()
    }

    #[tokio::test]
    async fn test_downloads_each_url_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/logo.png", server.uri());
        let report = fetcher(dir.path())
            .fetch(&[url.clone(), url.clone(), url.clone()])
            .await;

        assert!(report.failed.is_empty());
        let local = report.path(&url).unwrap();
        assert_eq!(std::fs::read(local).unwrap(), PNG);
        assert_eq!(local.extension().and_then(|e| e.to_str()), Some("png"));
    }

    #[tokio::test]
    async fn test_current_cache_skips_download() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", PNG.len().to_string().as_str())
                    .set_body_bytes(PNG),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/logo.png", server.uri());

        let first = fetcher(dir.path()).fetch(&[url.clone()]).await;
        let second = fetcher(dir.path()).fetch(&[url.clone()]).await;

        assert_eq!(first.path(&url), second.path(&url));
        assert!(second.failed.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/gone.png", server.uri());
        let report = fetcher(dir.path()).fetch(&[url.clone()]).await;

        assert!(report.path(&url).is_none());
        assert!(matches!(report.failed.get(&url), Some(FetchError::Status(404))));
        // Nothing half-written is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_slow_download_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(PNG)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/slow.png", server.uri());
        let report = fetcher(dir.path())
            .with_timeout(Duration::from_millis(200))
            .fetch(&[url.clone()])
            .await;

        assert!(matches!(report.failed.get(&url), Some(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_mixed_batch_keeps_successes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.gif"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"GIF89a"[..]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.gif"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ok = format!("{}/ok.gif", server.uri());
        let broken = format!("{}/broken.gif", server.uri());
        let report = fetcher(dir.path())
            .fetch(&[ok.clone(), broken.clone(), "mailto:x".to_string()])
            .await;

        assert!(report.path(&ok).is_some());
        assert!(report.path(&broken).is_none());
        assert_eq!(report.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_head_does_not_keep_cached_copy() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("content-length", PNG.len().to_string().as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/logo.png", server.uri());
        let cached = destination_for(dir.path(), &url).unwrap();
        // Same size as the remote image, different bytes
        std::fs::write(&cached, vec![0u8; PNG.len()]).unwrap();

        let report = fetcher(dir.path()).fetch(&[url.clone()]).await;

        assert!(report.failed.is_empty());
        assert_eq!(std::fs::read(&cached).unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_downloads_are_bounded_by_concurrency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(PNG)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let urls: Vec<String> = (0..6)
            .map(|i| format!("{}/img{i}.png", server.uri()))
            .collect();

        let started = std::time::Instant::now();
        let report = fetcher(dir.path()).fetch(&urls).await;
        let elapsed = started.elapsed();

        assert_eq!(report.downloaded.len(), 6);
        assert!(report.failed.is_empty());
        // Three at a time: two rounds of the delay, not one
        assert!(elapsed >= Duration::from_millis(950), "took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_short_body_is_discarded() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let url = format!("http://{addr}/cut.png");
        let report = fetcher(dir.path()).fetch(&[url.clone()]).await;
        server.await.unwrap();

        assert!(report.downloaded.is_empty());
        assert!(report.failed.contains_key(&url));
        // Neither the partial file nor the final one survives
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
