use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::converter::Converter;
use crate::error::SyncError;
use crate::fs_util;

const CONVERTIBLE_EXT: &str = "fits";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub converted: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub failed: Vec<ConversionFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionFailure {
    pub file: String,
    pub error: String,
}

/// Converts every pending binary member of a segment folder into `<output>/<stem>.csv`.
pub struct ConversionDriver<'a, C: Converter> {
    converter: &'a C,
    columns: &'a [&'a str],
}

impl<'a, C: Converter> ConversionDriver<'a, C> {
    pub fn new(converter: &'a C, columns: &'a [&'a str]) -> Self {
        Self { converter, columns }
    }

    /// Already-converted members are skipped, a failing member is recorded and left in
    /// place, and a converted member's binary input is removed.
    pub fn convert(
        &self,
        segment_folder: &Path,
        output_folder: &Path,
    ) -> Result<ConversionStats, SyncError> {
        fs::create_dir_all(output_folder).map_err(|err| SyncError::Filesystem(err.to_string()))?;

        let mut stats = ConversionStats::default();
        for input in fs_util::walk_files(segment_folder)? {
            let Some(stem) = convertible_stem(&input) else {
                stats.ignored += 1;
                continue;
            };

            let output = output_folder.join(format!("{stem}.csv"));
            if output.exists() {
                debug!(file = %input.display(), "already converted");
                stats.skipped += 1;
                continue;
            }

            let partial = output_folder.join(format!("{stem}.csv.partial"));
            let result = self
                .converter
                .convert(&input, &partial, self.columns)
                .and_then(|()| {
                    fs::rename(&partial, &output)
                        .map_err(|err| SyncError::Filesystem(err.to_string()))
                });
            match result {
                Ok(()) => {
                    stats.converted += 1;
                    if let Err(err) = fs::remove_file(&input) {
                        warn!(
                            file = %input.display(),
                            %err,
                            "converted but could not remove input"
                        );
                    }
                }
                Err(err) => {
                    warn!(file = %input.display(), %err, "conversion failed, continuing");
                    let _ = fs::remove_file(&partial);
                    stats.failed.push(ConversionFailure {
                        file: input.display().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            folder = %segment_folder.display(),
            converted = stats.converted,
            skipped = stats.skipped,
            failed = stats.failed.len(),
            "conversion pass finished"
        );
        Ok(stats)
    }
}

fn convertible_stem(path: &Path) -> Option<String> {
    let is_convertible = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(CONVERTIBLE_EXT))
        .unwrap_or(false);
    if !is_convertible {
        return None;
    }
    path.file_stem()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_suffix() {
        assert_eq!(
            convertible_stem(Path::new("c1/ktwo201367065-c01_llc.fits")).as_deref(),
            Some("ktwo201367065-c01_llc")
        );
        assert_eq!(
            convertible_stem(Path::new("kplr000757076-2009166043257_llc.FITS")).as_deref(),
            Some("kplr000757076-2009166043257_llc")
        );
        assert_eq!(convertible_stem(Path::new("README.txt")), None);
    }
}
