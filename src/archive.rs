use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::SyncError;

/// Source of segment tarballs.
pub trait ArchiveSource: Send + Sync {
    /// Streams `url` into `destination`, returning the number of bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, SyncError>;
}

#[derive(Clone)]
pub struct HttpArchiveSource {
    client: Client,
}

impl HttpArchiveSource {
    pub fn new() -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kepler-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::ArchiveHttp(err.to_string()))?,
        );
        // Segment tarballs run to several gigabytes.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(6 * 60 * 60))
            .build()
            .map_err(|err| SyncError::ArchiveHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, SyncError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SyncError::ArchiveHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "archive request failed".to_string());
            return Err(SyncError::ArchiveStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| SyncError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SyncError::ArchiveHttp(err.to_string()))
    }
}
