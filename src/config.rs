use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::Dataset;
use crate::error::SyncError;
use crate::registry::ArchiveCatalog;
use crate::script::FetchWindow;

pub const DEFAULT_CONFIG_FILE: &str = "kepler-sync.json";
pub const DEFAULT_ARCHIVE_URL: &str = "https://archive.stsci.edu/pub";
pub const DEFAULT_CATALOG_URL: &str =
    "https://exoplanetarchive.ipac.caltech.edu/cgi-bin/nstedAPI/nph-nstedAPI";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
pub const DEFAULT_LABEL: &str = "id";
pub const DEFAULT_CONVERTER: &str = "stilts";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub archive_url: Option<String>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub converter: Option<ConverterEntry>,
    /// FETCH range used when selecting the series to update.
    #[serde(default)]
    pub window: Option<FetchWindow>,
    #[serde(default)]
    pub campaigns: BTreeMap<Dataset, BTreeMap<String, u32>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConverterEntry {
    Shorthand(String),
    Detailed(ConverterEntryObject),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterEntryObject {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub root: Utf8PathBuf,
    pub archive_url: String,
    pub catalog_url: String,
    pub endpoint: String,
    pub label: String,
    pub converter: ConverterConfig,
    pub window: FetchWindow,
    registries: BTreeMap<Dataset, ArchiveCatalog>,
}

impl ResolvedConfig {
    pub fn registry(&self, dataset: Dataset) -> ArchiveCatalog {
        self.registries
            .get(&dataset)
            .cloned()
            .unwrap_or_else(|| ArchiveCatalog::builtin(dataset))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kepler-sync.json` in the working directory when present.
    /// Without either, built-in defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SyncError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(SyncError::MissingConfig(config_path));
            }
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SyncError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SyncError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SyncError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let root = match config.root {
            Some(root) => Utf8PathBuf::from(root),
            None => default_root()?,
        };

        let converter = match config.converter {
            Some(ConverterEntry::Shorthand(program)) => ConverterConfig {
                program,
                args: Vec::new(),
            },
            Some(ConverterEntry::Detailed(obj)) => ConverterConfig {
                program: obj.program,
                args: obj.args,
            },
            None => ConverterConfig {
                program: DEFAULT_CONVERTER.to_string(),
                args: Vec::new(),
            },
        };

        let mut registries = BTreeMap::new();
        for dataset in Dataset::ALL {
            let builtin = ArchiveCatalog::builtin(dataset);
            let registry = match config.campaigns.get(&dataset) {
                Some(overrides) => builtin.with_overrides(overrides)?,
                None => builtin,
            };
            registries.insert(dataset, registry);
        }

        Ok(ResolvedConfig {
            schema_version,
            root,
            archive_url: config
                .archive_url
                .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string()),
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            endpoint: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            label: config.label.unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            converter,
            window: config.window.unwrap_or_default(),
            registries,
        })
    }
}

pub fn default_root() -> Result<Utf8PathBuf, SyncError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.cache_dir().join("kepler-sync")).ok())
        .ok_or_else(|| SyncError::Filesystem("unable to resolve data directory".to_string()))
}
