use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogRow, PLANET_NAME};
use crate::domain::Dataset;
use crate::error::SyncError;

pub const STATUS_KEY: &str = "status";
pub const SIZE_KEY: &str = "size";
pub const CONFIRMED: &str = "CONFIRMED";

const KEPLER_FILE_PREFIX: &str = "kplr";
const K2_FILE_PREFIX: &str = "ktwo";

/// Merged metadata for one physical object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataBundle {
    pub id: String,
    /// First-seen order, no duplicates.
    pub fragments: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    /// Rows merged into this bundle.
    pub size: u32,
}

impl MetadataBundle {
    fn new(id: String) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.attributes.get(STATUS_KEY).map(String::as_str) == Some(CONFIRMED)
    }

    fn add_fragment(&mut self, fragment: String) {
        if !fragment.is_empty() && !self.fragments.contains(&fragment) {
            self.fragments.push(fragment);
        }
    }

    /// `status` only ever moves up to CONFIRMED, never back down.
    fn merge_status(&mut self, disposition: &str) {
        if self.is_confirmed() {
            return;
        }
        self.attributes
            .insert(STATUS_KEY.to_string(), disposition.to_string());
    }
}

/// Dataset specific keying and merge rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    Kepler,
    K2,
}

impl MergeRule {
    pub fn for_dataset(dataset: Dataset) -> Self {
        match dataset {
            Dataset::Kepler => MergeRule::Kepler,
            Dataset::K2 => MergeRule::K2,
        }
    }

    /// kepid for Kepler; the second token of `EPIC <n>` for K2.
    pub fn key(&self, row: &CatalogRow) -> Option<String> {
        let key = match self {
            MergeRule::Kepler => Some(row.object_id.trim()),
            MergeRule::K2 => row.object_id.split_whitespace().nth(1),
        };
        key.filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    }

    fn fragments(&self, key: &str, row: &CatalogRow) -> Vec<String> {
        let prefix = match self {
            MergeRule::Kepler => KEPLER_FILE_PREFIX,
            MergeRule::K2 => K2_FILE_PREFIX,
        };
        let from_files = row
            .files
            .iter()
            .flatten()
            .filter_map(|file| file_fragment(file, prefix))
            .collect::<Vec<_>>();
        if !from_files.is_empty() {
            return from_files;
        }
        match self {
            MergeRule::Kepler => vec![format!("{key:0>9}")],
            MergeRule::K2 => vec![key.to_string()],
        }
    }

    fn merge(&self, bundle: &mut MetadataBundle, row: &CatalogRow) {
        let disposition = row.disposition.trim();
        bundle.size += 1;
        match self {
            MergeRule::Kepler => {
                let name = row.name.trim();
                if name.is_empty() {
                    debug!(id = %bundle.id, "row without KOI name, only status merged");
                } else {
                    bundle
                        .attributes
                        .insert(name.to_string(), disposition.to_string());
                    if let Some(score) = row.score {
                        bundle
                            .attributes
                            .insert(format!("{name}:score"), score.to_string());
                    }
                }
                bundle
                    .attributes
                    .insert(SIZE_KEY.to_string(), bundle.size.to_string());
            }
            MergeRule::K2 => {
                let label = if disposition == CONFIRMED {
                    row.extra.get(PLANET_NAME).map(String::as_str)
                } else {
                    Some(row.name.as_str())
                };
                let label = label.map(str::trim).unwrap_or_default();
                bundle
                    .attributes
                    .insert(label.to_string(), disposition.to_string());
            }
        }
        if disposition == CONFIRMED {
            bundle
                .attributes
                .insert(STATUS_KEY.to_string(), CONFIRMED.to_string());
        } else {
            bundle.merge_status(disposition);
        }
    }
}

/// Base name of `file` with the mission prefix removed, cut at the first `-`.
fn file_fragment(file: &str, prefix: &str) -> Option<String> {
    let base = file.rsplit(['/', '\\']).next().unwrap_or(file).trim();
    let rest = base.strip_prefix(prefix).unwrap_or(base);
    let fragment = rest
        .split(['-', '.', '_'])
        .next()
        .unwrap_or_default()
        .trim();
    (!fragment.is_empty()).then(|| fragment.to_string())
}

pub struct MetadataAggregator {
    rule: MergeRule,
}

impl MetadataAggregator {
    pub fn new(rule: MergeRule) -> Self {
        Self { rule }
    }

    pub fn for_dataset(dataset: Dataset) -> Self {
        Self::new(MergeRule::for_dataset(dataset))
    }

    pub fn aggregate<I>(&self, rows: I) -> BTreeMap<String, MetadataBundle>
    where
        I: IntoIterator<Item = CatalogRow>,
    {
        let mut bundles = BTreeMap::new();
        for row in rows {
            self.merge_row(&mut bundles, &row);
        }
        bundles
    }

    /// Consumes the whole stream before returning; a later row may still upgrade an
    /// earlier bundle's status.
    pub fn try_aggregate<I>(&self, rows: I) -> Result<BTreeMap<String, MetadataBundle>, SyncError>
    where
        I: IntoIterator<Item = Result<CatalogRow, SyncError>>,
    {
        let mut bundles = BTreeMap::new();
        let mut seen = 0usize;
        for row in rows {
            let row = row?;
            seen += 1;
            self.merge_row(&mut bundles, &row);
        }
        info!(rows = seen, bundles = bundles.len(), rule = ?self.rule, "catalog aggregated");
        Ok(bundles)
    }

    fn merge_row(&self, bundles: &mut BTreeMap<String, MetadataBundle>, row: &CatalogRow) {
        let Some(key) = self.rule.key(row) else {
            warn!(object_id = %row.object_id, "row without usable object identifier, skipped");
            return;
        };
        let bundle = match bundles.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut bundle = MetadataBundle::new(entry.key().clone());
                for fragment in self.rule.fragments(entry.key(), row) {
                    bundle.add_fragment(fragment);
                }
                entry.insert(bundle)
            }
        };
        self.rule.merge(bundle, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kepler_fragment_strips_prefix_and_timestamp() {
        assert_eq!(
            file_fragment("/q1/kplr000757076-2009166043257_llc.fits", "kplr").as_deref(),
            Some("000757076")
        );
    }

    #[test]
    fn k2_key_is_second_token() {
        let row = CatalogRow {
            object_id: "EPIC 201367065".to_string(),
            ..CatalogRow::default()
        };
        assert_eq!(MergeRule::K2.key(&row).as_deref(), Some("201367065"));
        let bare = CatalogRow {
            object_id: "201367065".to_string(),
            ..CatalogRow::default()
        };
        assert_eq!(MergeRule::K2.key(&bare), None);
    }

    #[test]
    fn kepler_fallback_fragment_is_padded() {
        let row = CatalogRow {
            object_id: "757076".to_string(),
            ..CatalogRow::default()
        };
        assert_eq!(MergeRule::Kepler.fragments("757076", &row), vec!["000757076"]);
    }
}
