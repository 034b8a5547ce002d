use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Kepler,
    K2,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Kepler, Dataset::K2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Kepler => "kepler",
            Dataset::K2 => "k2",
        }
    }

    /// Kepler quarter folders carry a `_public` marker, K2 campaign folders do not.
    pub fn campaign_dir(&self, campaign: &CampaignCode) -> String {
        match self {
            Dataset::Kepler => format!("{}_public", campaign.as_str()),
            Dataset::K2 => campaign.as_str().to_string(),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kepler" => Ok(Dataset::Kepler),
            "k2" => Ok(Dataset::K2),
            _ => Err(SyncError::InvalidDataset(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampaignCode(String);

impl CampaignCode {
    pub(crate) fn from_static(code: &'static str) -> Self {
        Self(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampaignCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CampaignCode {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !is_valid {
            return Err(SyncError::InvalidCampaign(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// One numbered downloadable archive unit of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Segment {
    pub dataset: Dataset,
    pub campaign: CampaignCode,
    pub number: u32,
}

impl Segment {
    pub fn new(dataset: Dataset, campaign: CampaignCode, number: u32) -> Self {
        Self {
            dataset,
            campaign,
            number,
        }
    }

    /// `public_<campaign>_long_<n>`, shared by the archive file and the output folder.
    pub fn name(&self) -> String {
        format!("public_{}_long_{}", self.campaign, self.number)
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}.tgz", self.name())
    }

    pub fn archive_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/lightcurves/tarfiles/{}/{}",
            base_url.trim_end_matches('/'),
            self.dataset,
            self.dataset.campaign_dir(&self.campaign),
            self.archive_file_name()
        )
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.name())
    }
}

/// `all` or a comma separated list. Entries that match nothing are dropped, never rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Only(Vec<String>),
}

impl Selection {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Selection::All;
        }
        let items = trimmed
            .split(',')
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| item.to_string())
            .collect();
        Selection::Only(items)
    }

    pub fn selects(&self, key: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(items) => items.iter().any(|item| item.eq_ignore_ascii_case(key)),
        }
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        Dataset::ALL
            .into_iter()
            .filter(|dataset| self.selects(dataset.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn kepler_url_carries_public_marker() {
        let segment = Segment::new(Dataset::Kepler, "Q3".parse().unwrap(), 2);
        assert_eq!(
            segment.archive_url("https://archive.stsci.edu/pub/"),
            "https://archive.stsci.edu/pub/kepler/lightcurves/tarfiles/Q3_public/public_Q3_long_2.tgz"
        );
    }

    #[test]
    fn k2_url_has_no_marker() {
        let segment = Segment::new(Dataset::K2, "c102".parse().unwrap(), 1);
        assert_eq!(
            segment.archive_url("https://archive.stsci.edu/pub"),
            "https://archive.stsci.edu/pub/k2/lightcurves/tarfiles/c102/public_c102_long_1.tgz"
        );
    }

    #[test]
    fn rejects_path_like_campaign() {
        let err = "../c1".parse::<CampaignCode>().unwrap_err();
        assert_matches!(err, SyncError::InvalidCampaign(_));
    }
}
