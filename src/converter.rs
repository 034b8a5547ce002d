use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ConverterConfig;
use crate::domain::Dataset;
use crate::error::SyncError;

const KEPLER_COLUMNS: &[&str] = &[
    "TIME",
    "TIMECORR",
    "CADENCENO",
    "SAP_FLUX",
    "SAP_FLUX_ERR",
    "PDCSAP_FLUX",
    "PDCSAP_FLUX_ERR",
    "SAP_QUALITY",
];

const K2_COLUMNS: &[&str] = &[
    "TIME",
    "CADENCENO",
    "SAP_FLUX",
    "SAP_FLUX_ERR",
    "PDCSAP_FLUX",
    "PDCSAP_FLUX_ERR",
    "SAP_QUALITY",
    "POS_CORR1",
    "POS_CORR2",
];

/// Light-curve columns kept in the tabular output.
pub fn columns(dataset: Dataset) -> &'static [&'static str] {
    match dataset {
        Dataset::Kepler => KEPLER_COLUMNS,
        Dataset::K2 => K2_COLUMNS,
    }
}

/// Turns one binary light-curve file into one csv file.
pub trait Converter: Send + Sync {
    fn convert(&self, input: &Path, output: &Path, columns: &[&str]) -> Result<(), SyncError>;
}

/// Runs an external table tool (STILTS `tpipe` by default).
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: Option<PathBuf>,
    name: String,
    extra_args: Vec<String>,
}

impl CommandConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        let candidate = PathBuf::from(&config.program);
        let program = if candidate.components().count() > 1 {
            candidate.exists().then_some(candidate)
        } else {
            find_in_path(&config.program)
        };
        Self {
            program,
            name: config.program.clone(),
            extra_args: config.args.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }

    fn require_program(&self) -> Result<&PathBuf, SyncError> {
        self.program
            .as_ref()
            .ok_or_else(|| SyncError::MissingTool(self.name.clone()))
    }

    fn build_args(&self, input: &Path, output: &Path, columns: &[&str]) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "tpipe".to_string(),
            format!("in={}", input.to_string_lossy()),
            "ifmt=fits".to_string(),
            format!("cmd=keepcols \"{}\"", columns.join(" ")),
            format!("out={}", output.to_string_lossy()),
            "ofmt=csv".to_string(),
        ]);
        args
    }
}

impl Converter for CommandConverter {
    fn convert(&self, input: &Path, output: &Path, columns: &[&str]) -> Result<(), SyncError> {
        let program = self.require_program()?;
        let args = self.build_args(input, output, columns);
        let output_status = Command::new(program)
            .args(&args)
            .output()
            .map_err(|err| SyncError::Conversion(err.to_string()))?;
        if output_status.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output_status.stderr)
            .trim()
            .to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {} on {}", program.display(), input.display())
        } else {
            stderr
        };
        Err(SyncError::Conversion(message))
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
