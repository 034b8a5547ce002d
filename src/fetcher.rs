use std::fs;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::archive::ArchiveSource;
use crate::domain::Segment;
use crate::error::SyncError;
use crate::fs_util;
use crate::workspace::{Workspace, claim_dir};

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub segment: String,
    pub skipped: bool,
    pub path: String,
    pub bytes: u64,
    pub files: usize,
}

/// Downloads and unpacks one segment, once.
pub struct SegmentFetcher<'a, A: ArchiveSource> {
    source: &'a A,
    workspace: &'a Workspace,
    base_url: &'a str,
}

impl<'a, A: ArchiveSource> SegmentFetcher<'a, A> {
    pub fn new(source: &'a A, workspace: &'a Workspace, base_url: &'a str) -> Self {
        Self {
            source,
            workspace,
            base_url,
        }
    }

    /// An existing segment folder short-circuits before any network or filesystem write.
    /// Otherwise the archive is unpacked into a staging directory that is renamed onto
    /// the segment folder only once extraction succeeded.
    pub fn fetch(&self, segment: &Segment) -> Result<FetchResult, SyncError> {
        let target = self.workspace.segment_dir(segment);
        if self.workspace.is_fetched(segment) {
            debug!(%segment, "segment folder present, skipping download");
            return Ok(FetchResult {
                segment: segment.name(),
                skipped: true,
                path: target.to_string(),
                bytes: 0,
                files: 0,
            });
        }

        let staging = self.workspace.staging_dir(segment)?;
        let archive_path = staging.path().join(segment.archive_file_name());
        let extract_dir = staging.path().join("extract");

        let url = segment.archive_url(self.base_url);
        info!(%segment, %url, "downloading segment");
        let start = Instant::now();
        let bytes = self.source.download(&url, &archive_path)?;
        info!(
            %segment,
            bytes,
            latency_ms = start.elapsed().as_millis() as u64,
            "download complete, extracting"
        );

        let files = fs_util::extract_tgz(&archive_path, &extract_dir)?;
        fs::remove_file(&archive_path).map_err(|err| SyncError::Filesystem(err.to_string()))?;

        let claimed = claim_dir(&extract_dir, target.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        if !claimed {
            debug!(%segment, "segment folder appeared during download, keeping existing");
        } else {
            info!(%segment, files, "segment extracted");
        }

        Ok(FetchResult {
            segment: segment.name(),
            skipped: !claimed,
            path: target.to_string(),
            bytes,
            files,
        })
    }
}
