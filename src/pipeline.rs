use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::archive::ArchiveSource;
use crate::conversion::{ConversionDriver, ConversionStats};
use crate::converter::{self, Converter};
use crate::domain::{Dataset, Segment, Selection};
use crate::error::SyncError;
use crate::fetcher::SegmentFetcher;
use crate::registry::ArchiveCatalog;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub lock: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dataset: Dataset,
    pub started_at: String,
    pub finished_at: String,
    pub segments: Vec<SegmentReport>,
    pub lock: LockOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub campaign: String,
    pub segment: String,
    pub action: String,
    pub bytes: u64,
    pub conversion: Option<ConversionStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LockOutcome {
    NotRequested,
    Skipped { path: String },
    Removed { path: String },
    Missing { path: String },
    Failed { path: String, error: String },
}

/// Fetch-then-convert over every segment of the selected campaigns of one dataset.
pub struct CampaignPipeline<'a, A: ArchiveSource, C: Converter> {
    registry: ArchiveCatalog,
    workspace: Workspace,
    archive_url: String,
    source: &'a A,
    converter: &'a C,
}

impl<'a, A: ArchiveSource, C: Converter> CampaignPipeline<'a, A, C> {
    pub fn new(
        registry: ArchiveCatalog,
        workspace: Workspace,
        archive_url: String,
        source: &'a A,
        converter: &'a C,
    ) -> Self {
        Self {
            registry,
            workspace,
            archive_url,
            source,
            converter,
        }
    }

    pub fn dataset(&self) -> Dataset {
        self.registry.dataset()
    }

    /// Segments run strictly in order; a transfer error aborts the run and leaves the
    /// lock marker in place.
    pub fn run(
        &self,
        filter: &Selection,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, SyncError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let dataset = self.dataset();

        if !options.dry_run {
            for dir in self.workspace.ensure_layout()? {
                sink.event(ProgressEvent::message(format!("created folder {dir}")));
            }
        }

        let fetcher = SegmentFetcher::new(self.source, &self.workspace, &self.archive_url);
        let columns = converter::columns(dataset);
        let driver = ConversionDriver::new(self.converter, columns);
        let csv_dir = self.workspace.csv_dir();

        let mut segments = Vec::new();
        let selected = self.registry.select(filter);
        for (campaign, count) in &selected {
            sink.event(ProgressEvent::message(format!(
                "{dataset} campaign {campaign}: {count} segment(s)"
            )));
            for number in 1..=*count {
                let segment = Segment::new(dataset, campaign.clone(), number);

                if options.dry_run {
                    let action = if self.workspace.is_fetched(&segment) {
                        "present"
                    } else {
                        "would-download"
                    };
                    sink.event(ProgressEvent::message(format!("{segment}: {action}")));
                    segments.push(SegmentReport {
                        campaign: campaign.to_string(),
                        segment: segment.name(),
                        action: action.to_string(),
                        bytes: 0,
                        conversion: None,
                    });
                    continue;
                }

                let start = std::time::Instant::now();
                let fetched = fetcher.fetch(&segment)?;
                let action = if fetched.skipped {
                    "present"
                } else {
                    "download"
                };
                sink.event(ProgressEvent {
                    message: format!("{segment}: {action}"),
                    elapsed: Some(start.elapsed()),
                });

                let start = std::time::Instant::now();
                let segment_dir = self.workspace.segment_dir(&segment);
                let stats = driver.convert(segment_dir.as_std_path(), csv_dir.as_std_path())?;
                sink.event(ProgressEvent {
                    message: format!(
                        "{segment}: converted={} skipped={} failed={}",
                        stats.converted,
                        stats.skipped,
                        stats.failed.len()
                    ),
                    elapsed: Some(start.elapsed()),
                });
                for failure in &stats.failed {
                    sink.event(ProgressEvent::message(format!(
                        "conversion error {}: {}",
                        failure.file, failure.error
                    )));
                }

                segments.push(SegmentReport {
                    campaign: campaign.to_string(),
                    segment: segment.name(),
                    action: action.to_string(),
                    bytes: fetched.bytes,
                    conversion: Some(stats),
                });
            }
            sink.event(ProgressEvent::message(format!("campaign {campaign} done")));
        }

        let lock = match &options.lock {
            None => LockOutcome::NotRequested,
            Some(path) if options.dry_run => LockOutcome::Skipped {
                path: path.display().to_string(),
            },
            Some(path) => release_lock(path),
        };
        match &lock {
            LockOutcome::Removed { path } => {
                sink.event(ProgressEvent::message(format!("removed lock {path}")));
            }
            LockOutcome::Missing { path } => {
                sink.event(ProgressEvent::message(format!("lock {path} not found")));
            }
            LockOutcome::Failed { path, error } => {
                sink.event(ProgressEvent::message(format!(
                    "could not remove lock {path}: {error}"
                )));
            }
            LockOutcome::NotRequested | LockOutcome::Skipped { .. } => {}
        }

        info!(%dataset, segments = segments.len(), "ingestion run finished");
        Ok(RunReport {
            dataset,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            segments,
            lock,
        })
    }
}

/// Removing the marker tells an outside scheduler that ingestion finished.
fn release_lock(path: &Path) -> LockOutcome {
    let lock_path = path.display().to_string();
    match fs::remove_file(path) {
        Ok(()) => {
            info!(lock = %lock_path, "lock released");
            LockOutcome::Removed { path: lock_path }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(lock = %lock_path, "lock marker missing");
            LockOutcome::Missing { path: lock_path }
        }
        Err(err) => {
            warn!(lock = %lock_path, %err, "failed to remove lock marker");
            LockOutcome::Failed {
                path: lock_path,
                error: err.to_string(),
            }
        }
    }
}
