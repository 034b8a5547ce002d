use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::aggregate::MetadataAggregator;
use crate::archive::ArchiveSource;
use crate::catalog::CatalogClient;
use crate::config::ResolvedConfig;
use crate::converter::Converter;
use crate::dispatch::{DispatchResult, MetadataStore, SyncDispatcher};
use crate::domain::{Dataset, Selection};
use crate::error::SyncError;
use crate::pipeline::{CampaignPipeline, RunOptions, RunReport};
use crate::script::{SyncScript, SyncScriptGenerator};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub campaigns: Selection,
    pub lock: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub datasets: Selection,
    pub read_token: String,
    pub write_token: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: String,
    pub finished_at: String,
    pub datasets: Vec<DatasetSyncReport>,
}

impl SyncReport {
    pub fn failures(&self) -> usize {
        self.datasets
            .iter()
            .map(|dataset| dataset.results.iter().filter(|result| !result.ok).count())
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSyncReport {
    pub dataset: Dataset,
    pub bundles: usize,
    pub confirmed: usize,
    pub results: Vec<DispatchResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<SyncScript>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<A: ArchiveSource, C: Converter, K: CatalogClient, S: MetadataStore> {
    config: ResolvedConfig,
    archive: A,
    converter: C,
    catalog: K,
    store: S,
}

impl<A: ArchiveSource, C: Converter, K: CatalogClient, S: MetadataStore> App<A, C, K, S> {
    pub fn new(config: ResolvedConfig, archive: A, converter: C, catalog: K, store: S) -> Self {
        Self {
            config,
            archive,
            converter,
            catalog,
            store,
        }
    }

    /// Downloads, extracts and converts the selected campaigns of `dataset`.
    pub fn init(
        &self,
        dataset: Dataset,
        options: InitOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, SyncError> {
        sink.event(ProgressEvent::message(format!(
            "initializing {dataset} under {}",
            self.config.root
        )));
        let pipeline = CampaignPipeline::new(
            self.config.registry(dataset),
            Workspace::new(self.config.root.clone()),
            self.config.archive_url.clone(),
            &self.archive,
            &self.converter,
        );
        let run_options = RunOptions {
            dry_run: options.dry_run,
            lock: options.lock,
        };
        pipeline.run(&options.campaigns, &run_options, sink)
    }

    /// Aggregates the catalog of each selected dataset and pushes one script per bundle.
    pub fn update(
        &self,
        options: UpdateOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, SyncError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let generator =
            SyncScriptGenerator::new(&self.config.label)?.with_window(self.config.window);
        generator.check_tokens(&options.read_token, &options.write_token)?;
        let dispatcher = SyncDispatcher::new(&self.store);

        let mut datasets = Vec::new();
        for dataset in options.datasets.datasets() {
            sink.event(ProgressEvent::message(format!("fetching {dataset} catalog")));
            let start = Instant::now();
            let rows = self.catalog.rows(dataset)?;
            let bundles = MetadataAggregator::for_dataset(dataset).try_aggregate(rows)?;
            let confirmed = bundles.values().filter(|bundle| bundle.is_confirmed()).count();
            sink.event(ProgressEvent {
                message: format!(
                    "{dataset}: {} bundle(s), {confirmed} confirmed",
                    bundles.len()
                ),
                elapsed: Some(start.elapsed()),
            });

            let mut results = Vec::new();
            let mut scripts = Vec::new();
            for bundle in bundles.values() {
                let script =
                    match generator.render(bundle, &options.read_token, &options.write_token) {
                        Ok(script) => script,
                        Err(err) => {
                            sink.event(ProgressEvent::message(format!(
                                "{dataset} {}: {err}",
                                bundle.id
                            )));
                            results.push(DispatchResult {
                                id: bundle.id.clone(),
                                ok: false,
                                status: None,
                                error: Some(err.to_string()),
                            });
                            continue;
                        }
                    };

                if options.dry_run {
                    scripts.push(script);
                    continue;
                }

                let start = Instant::now();
                let result = dispatcher.dispatch(&script);
                let message = match (result.ok, &result.error) {
                    (true, _) => format!("{dataset} {}: updated", result.id),
                    (false, Some(error)) => format!("{dataset} {}: failed: {error}", result.id),
                    (false, None) => format!("{dataset} {}: failed", result.id),
                };
                sink.event(ProgressEvent {
                    message,
                    elapsed: Some(start.elapsed()),
                });
                results.push(result);
            }

            info!(
                %dataset,
                bundles = bundles.len(),
                failed = results.iter().filter(|result| !result.ok).count(),
                "metadata sync finished"
            );
            datasets.push(DatasetSyncReport {
                dataset,
                bundles: bundles.len(),
                confirmed,
                results,
                scripts,
            });
        }

        Ok(SyncReport {
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            datasets,
        })
    }
}
