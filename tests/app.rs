use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;

use kepler_sync::app::{App, InitOptions, UpdateOptions};
use kepler_sync::archive::ArchiveSource;
use kepler_sync::catalog::{CatalogClient, CatalogRow, CatalogRows, parse_rows};
use kepler_sync::config::{Config, ConfigLoader, ResolvedConfig};
use kepler_sync::converter::Converter;
use kepler_sync::dispatch::{MetadataStore, StoreResponse};
use kepler_sync::domain::{Dataset, Selection};
use kepler_sync::error::SyncError;
use kepler_sync::output::JsonOutput;
use kepler_sync::script::FetchWindow;

const KOI_CSV: &str = "kepid,kepoi_name,koi_disposition,koi_score\n\
12345,K00001.01,CANDIDATE,0.5\n\
12345,K00001.02,CONFIRMED,1.0\n\
999,K00002.01,FALSE POSITIVE,0.0\n";

const K2_CSV: &str = "epic_name,epic_candname,pl_name,k2c_disp\n\
EPIC 201367065,EPIC 201367065.01,K2-3 b,CONFIRMED\n";

struct NopArchive;

impl ArchiveSource for NopArchive {
    fn download(&self, _url: &str, _destination: &Path) -> Result<u64, SyncError> {
        Err(SyncError::ArchiveHttp("offline".to_string()))
    }
}

struct NopConverter;

impl Converter for NopConverter {
    fn convert(&self, _input: &Path, _output: &Path, _columns: &[&str]) -> Result<(), SyncError> {
        Err(SyncError::MissingTool("stilts".to_string()))
    }
}

#[derive(Default)]
struct MockCatalog {
    requested: Mutex<Vec<Dataset>>,
}

impl CatalogClient for MockCatalog {
    fn rows(&self, dataset: Dataset) -> Result<CatalogRows<'_>, SyncError> {
        self.requested.lock().unwrap().push(dataset);
        let body = match dataset {
            Dataset::Kepler => KOI_CSV,
            Dataset::K2 => K2_CSV,
        };
        Ok(parse_rows(dataset, body.as_bytes()))
    }
}

/// Yields one good row, then fails mid-stream.
struct BrokenCatalog;

impl CatalogClient for BrokenCatalog {
    fn rows(&self, _dataset: Dataset) -> Result<CatalogRows<'_>, SyncError> {
        let rows = vec![
            Ok(CatalogRow {
                object_id: "1".to_string(),
                name: "K1.01".to_string(),
                disposition: "CANDIDATE".to_string(),
                ..CatalogRow::default()
            }),
            Err(SyncError::CatalogParse("truncated body".to_string())),
        ];
        Ok(Box::new(rows.into_iter()))
    }
}

/// Rejects the script for kepid 999.
#[derive(Default)]
struct MockStore {
    scripts: Mutex<Vec<String>>,
}

impl MetadataStore for MockStore {
    fn exec(&self, script: &str) -> Result<StoreResponse, SyncError> {
        self.scripts.lock().unwrap().push(script.to_string());
        let status = if script.contains("000000999") { 500 } else { 200 };
        Ok(StoreResponse {
            status,
            body: String::new(),
        })
    }
}

fn config(root: &Path) -> ResolvedConfig {
    ConfigLoader::resolve_config(Config {
        root: Some(root.to_string_lossy().to_string()),
        ..Config::default()
    })
    .unwrap()
}

fn update_options(datasets: &str, dry_run: bool) -> UpdateOptions {
    UpdateOptions {
        datasets: Selection::parse(datasets),
        read_token: "READ".to_string(),
        write_token: "WRITE".to_string(),
        dry_run,
    }
}

#[test]
fn update_dispatches_every_bundle() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        config(temp.path()),
        NopArchive,
        NopConverter,
        MockCatalog::default(),
        MockStore::default(),
    );

    let report = app.update(update_options("all", false), &JsonOutput).unwrap();

    assert_eq!(report.datasets.len(), 2);
    let kepler = &report.datasets[0];
    assert_eq!(kepler.dataset, Dataset::Kepler);
    assert_eq!(kepler.bundles, 2);
    assert_eq!(kepler.confirmed, 1);
    assert_eq!(kepler.results.len(), 2);
    assert_eq!(report.failures(), 1);
    assert!(kepler.scripts.is_empty());

    let k2 = &report.datasets[1];
    assert_eq!(k2.confirmed, 1);
    assert!(k2.results.iter().all(|result| result.ok));
}

#[test]
fn dry_run_renders_without_dispatching() {
    let temp = tempfile::tempdir().unwrap();
    let store = MockStore::default();
    let catalog = MockCatalog::default();
    let app = App::new(config(temp.path()), NopArchive, NopConverter, catalog, store);

    let report = app.update(update_options("k2", true), &JsonOutput).unwrap();

    assert_eq!(report.datasets.len(), 1);
    let k2 = &report.datasets[0];
    assert!(k2.results.is_empty());
    assert_eq!(k2.scripts.len(), 1);
    assert_eq!(k2.scripts[0].label_pattern, "~(201367065)");
    assert!(k2.scripts[0].as_str().contains("K2-3 b"));
}

#[test]
fn update_refuses_malformed_tokens_before_fetching() {
    let temp = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::default();
    let app = App::new(
        config(temp.path()),
        NopArchive,
        NopConverter,
        catalog,
        MockStore::default(),
    );
    let mut options = update_options("all", false);
    options.write_token = "WRITE' DROP".to_string();

    let err = app.update(options, &JsonOutput).unwrap_err();
    assert_matches!(err, SyncError::InvalidScript(_));
}

#[test]
fn catalog_stream_error_fails_the_update() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        config(temp.path()),
        NopArchive,
        NopConverter,
        BrokenCatalog,
        MockStore::default(),
    );

    let err = app
        .update(update_options("kepler", false), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, SyncError::CatalogParse(_));
}

#[test]
fn init_with_nothing_to_fetch_still_lays_out_root() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("data");
    let app = App::new(
        config(&root),
        NopArchive,
        NopConverter,
        MockCatalog::default(),
        MockStore::default(),
    );
    let options = InitOptions {
        campaigns: Selection::parse("c404"),
        lock: None,
        dry_run: false,
    };

    let report = app.init(Dataset::K2, options, &JsonOutput).unwrap();

    assert!(report.segments.is_empty());
    assert!(root.join("lightcurves").is_dir());
    assert!(root.join("csv").is_dir());
    assert!(fs::read_dir(root.join("csv")).unwrap().next().is_none());
}

#[test]
fn configured_window_reaches_rendered_scripts() {
    let temp = tempfile::tempdir().unwrap();
    let mut resolved = config(temp.path());
    resolved.window = FetchWindow {
        end: Some(1_400_000_000_000_000),
        span: -100,
    };
    let app = App::new(
        resolved,
        NopArchive,
        NopConverter,
        MockCatalog::default(),
        MockStore::default(),
    );

    let report = app.update(update_options("k2", true), &JsonOutput).unwrap();

    let script = report.datasets[0].scripts[0].as_str();
    assert!(script.contains("'~(201367065)' } 1400000000000000 -100 ] FETCH"));
    assert!(!script.contains("NOW"));
}
