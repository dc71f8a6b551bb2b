//! Remote image downloads.
//!
//! A [`Fetcher`] turns a list of URLs into local files under a cache
//! directory. Failures are per URL: a broken image never aborts the email,
//! it is reported in the [`FetchReport`] and left out of the book.

pub mod http;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::FetchError;
use crate::naming::{digest_hex, plain_extension};

pub use http::HttpFetcher;

/// Downloads a batch of URLs into local files.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch every distinct URL in `urls`.
    ///
    /// Returns once all downloads have finished or failed.
    async fn fetch(&self, urls: &[String]) -> FetchReport;
}

/// Outcome of one [`Fetcher::fetch`] call.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// URL → local file, for every successful download (or cache hit).
    pub downloaded: HashMap<String, PathBuf>,
    /// URL → reason, for every URL that has no usable local file.
    pub failed: HashMap<String, FetchError>,
}

impl FetchReport {
    /// Local file for `url`, if it was fetched.
    #[cfg(test)]
    pub fn path(&self, url: &str) -> Option<&Path> {
        self.downloaded.get(url).map(PathBuf::as_path)
    }
}

/// Cache location for `url`: a digest of the whole URL plus the extension of
/// its path component, so the same URL always maps to the same file.
///
/// Query strings and fragments never leak into the extension.
pub fn destination_for(dir: &Path, url: &str) -> Result<PathBuf, FetchError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "{url}: unsupported scheme {}",
            parsed.scheme()
        )));
    }
    let extension = plain_extension(parsed.path());
    Ok(dir.join(format!("{}{}", digest_hex(url), extension)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_keeps_path_extension() {
        let dir = Path::new("/cache");
        let a = destination_for(dir, "https://example.com/img/logo.png?size=2#top").unwrap();
        assert_eq!(a.parent(), Some(dir));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("png"));

        let b = destination_for(dir, "https://example.com/track").unwrap();
        assert!(b.extension().is_none());
    }

    #[test]
    fn test_destination_is_deterministic_per_url() {
        let dir = Path::new("cache");
        let a = destination_for(dir, "https://example.com/a.gif").unwrap();
        assert_eq!(a, destination_for(dir, "https://example.com/a.gif").unwrap());
        assert_ne!(a, destination_for(dir, "https://example.com/a.gif?v=2").unwrap());
    }

    #[test]
    fn test_destination_rejects_bad_urls() {
        let dir = Path::new("cache");
        assert!(matches!(
            destination_for(dir, "not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            destination_for(dir, "ftp://example.com/a.png"),
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
