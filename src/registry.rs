use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::domain::{CampaignCode, Dataset, Segment, Selection};
use crate::error::SyncError;

const K2_TARFILES: &[(&str, u32)] = &[
    ("c1", 2),
    ("c102", 2),
    ("c111", 1),
    ("c112", 2),
    ("c12", 3),
    ("c3", 3),
    ("c4", 1),
    ("c5", 2),
    ("c6", 3),
    ("c7", 1),
    ("c8", 2),
];

const KEPLER_TARFILES: &[(&str, u32)] = &[
    ("Q0", 1),
    ("Q1", 1),
    ("Q2", 2),
    ("Q3", 2),
    ("Q4", 2),
    ("Q5", 2),
    ("Q6", 2),
    ("Q7", 2),
    ("Q8", 2),
    ("Q9", 2),
    ("Q10", 2),
    ("Q11", 2),
    ("Q12", 2),
    ("Q13", 2),
    ("Q14", 2),
    ("Q15", 2),
    ("Q16", 2),
    ("Q17", 1),
];

/// Campaign code to segment count for one dataset. Declaration order is run order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveCatalog {
    dataset: Dataset,
    campaigns: Vec<(CampaignCode, u32)>,
}

impl ArchiveCatalog {
    pub fn builtin(dataset: Dataset) -> Self {
        let table = match dataset {
            Dataset::Kepler => KEPLER_TARFILES,
            Dataset::K2 => K2_TARFILES,
        };
        let campaigns = table
            .iter()
            .map(|&(code, count)| (CampaignCode::from_static(code), count))
            .collect();
        Self { dataset, campaigns }
    }

    pub fn from_entries<I>(dataset: Dataset, entries: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let campaigns = entries
            .into_iter()
            .map(|(code, count)| Ok((code.parse()?, count)))
            .collect::<Result<Vec<_>, SyncError>>()?;
        Ok(Self { dataset, campaigns })
    }

    /// Replaces counts of known campaigns and appends new ones.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, u32>) -> Result<Self, SyncError> {
        for (code, count) in overrides {
            let code: CampaignCode = code.parse()?;
            match self.campaigns.iter_mut().find(|(known, _)| *known == code) {
                Some(entry) => entry.1 = *count,
                None => self.campaigns.push((code, *count)),
            }
        }
        Ok(self)
    }

    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    pub fn segment_count(&self, campaign: &CampaignCode) -> Option<u32> {
        self.campaigns
            .iter()
            .find(|(code, _)| code == campaign)
            .map(|(_, count)| *count)
    }

    pub fn campaigns(&self) -> impl Iterator<Item = (&CampaignCode, u32)> {
        self.campaigns.iter().map(|(code, count)| (code, *count))
    }

    /// Intersects the filter with the registry; unknown codes fall out silently.
    pub fn select(&self, filter: &Selection) -> Vec<(CampaignCode, u32)> {
        if let Selection::Only(items) = filter {
            for item in items {
                let known = self
                    .campaigns
                    .iter()
                    .any(|(code, _)| code.as_str().eq_ignore_ascii_case(item));
                if !known {
                    debug!(dataset = %self.dataset, campaign = %item, "ignoring unknown campaign");
                }
            }
        }
        self.campaigns
            .iter()
            .filter(|(code, _)| filter.selects(code.as_str()))
            .cloned()
            .collect()
    }

    /// Segments 1..=N of every selected campaign, in run order.
    pub fn segments(&self, filter: &Selection) -> Vec<Segment> {
        self.select(filter)
            .into_iter()
            .flat_map(|(campaign, count)| {
                (1..=count).map(move |number| Segment::new(self.dataset, campaign.clone(), number))
            })
            .collect()
    }
}
