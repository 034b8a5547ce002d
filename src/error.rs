use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("invalid dataset: {0} (expected kepler or k2)")]
    InvalidDataset(String),

    #[error("invalid campaign code: {0}")]
    InvalidCampaign(String),

    #[error("missing config file at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("archive extraction failed: {0}")]
    Extraction(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("malformed catalog row: {0}")]
    CatalogParse(String),

    #[error("metadata store request failed: {0}")]
    StoreHttp(String),

    #[error("refusing to render script: {0}")]
    InvalidScript(String),
}

impl SyncError {
    /// Transfer failures abort a pipeline run.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            SyncError::ArchiveHttp(_) | SyncError::ArchiveStatus { .. } | SyncError::Extraction(_)
        )
    }
}
