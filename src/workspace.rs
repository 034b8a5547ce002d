use std::fs;
use std::io;
use std::path::Path;

use camino::Utf8PathBuf;
use tempfile::{Builder, TempDir};

use crate::domain::Segment;
use crate::error::SyncError;

/// On-disk layout of one data root. Presence of a segment folder means "fetched",
/// presence of a csv file means "converted".
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn lightcurves_dir(&self) -> Utf8PathBuf {
        self.root.join("lightcurves")
    }

    pub fn csv_dir(&self) -> Utf8PathBuf {
        self.root.join("csv")
    }

    pub fn segment_dir(&self, segment: &Segment) -> Utf8PathBuf {
        self.lightcurves_dir().join(segment.name())
    }

    pub fn is_fetched(&self, segment: &Segment) -> bool {
        self.segment_dir(segment).as_std_path().exists()
    }

    /// Creates `lightcurves/` and `csv/` when missing. Returns the folders it created.
    pub fn ensure_layout(&self) -> Result<Vec<Utf8PathBuf>, SyncError> {
        let mut created = Vec::new();
        for dir in [self.lightcurves_dir(), self.csv_dir()] {
            if !dir.as_std_path().exists() {
                fs::create_dir_all(dir.as_std_path())
                    .map_err(|err| SyncError::Filesystem(err.to_string()))?;
                created.push(dir);
            }
        }
        Ok(created)
    }

    /// Scratch directory next to the segment folders, removed on drop.
    pub fn staging_dir(&self, segment: &Segment) -> Result<TempDir, SyncError> {
        let parent = self.lightcurves_dir();
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix(&format!(".staging-{}-", segment.name()))
            .tempdir_in(parent.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))
    }
}

/// Moves a fully prepared directory onto `to`. Returns `false` without touching
/// anything when `to` is already populated.
pub fn claim_dir(from: &Path, to: &Path) -> io::Result<bool> {
    if to.exists() {
        return Ok(false);
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(_) if to.exists() => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Dataset;

    #[test]
    fn layout_paths() {
        let workspace = Workspace::new(Utf8PathBuf::from("/tmp/kepler"));
        let segment = Segment::new(Dataset::K2, "c5".parse().unwrap(), 2);
        assert_eq!(
            workspace.segment_dir(&segment),
            Utf8PathBuf::from("/tmp/kepler/lightcurves/public_c5_long_2")
        );
        assert!(workspace.csv_dir().ends_with("csv"));
    }

    #[test]
    fn claim_refuses_existing_destination() {
        let temp = tempfile::tempdir().unwrap();
        let from = temp.path().join("staged");
        let to = temp.path().join("segment");
        fs::create_dir_all(&from).unwrap();
        fs::write(from.join("a.fits"), b"x").unwrap();
        fs::create_dir_all(&to).unwrap();

        assert!(!claim_dir(&from, &to).unwrap());
        assert!(from.join("a.fits").exists());
    }
}
