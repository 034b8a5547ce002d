use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::Dataset;
use crate::error::SyncError;

/// Mission-specific extra field holding a K2 confirmed planet name.
pub const PLANET_NAME: &str = "pl_name";

/// One raw catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    /// kepid for Kepler, the `EPIC <n>` name for K2.
    pub object_id: String,
    /// KOI name or K2 candidate designation.
    pub name: String,
    pub disposition: String,
    pub score: Option<f64>,
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

pub type CatalogRows<'a> = Box<dyn Iterator<Item = Result<CatalogRow, SyncError>> + 'a>;

pub trait CatalogClient: Send + Sync {
    /// Lazily yields every row of the dataset's candidate table.
    fn rows(&self, dataset: Dataset) -> Result<CatalogRows<'_>, SyncError>;
}

#[derive(Clone)]
pub struct ExoplanetArchiveClient {
    client: Client,
    base_url: String,
}

impl ExoplanetArchiveClient {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kepler-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn query(dataset: Dataset) -> [(&'static str, &'static str); 3] {
        match dataset {
            Dataset::Kepler => [
                ("table", "cumulative"),
                ("select", "kepid,kepoi_name,koi_disposition,koi_score"),
                ("format", "csv"),
            ],
            Dataset::K2 => [
                ("table", "k2candidates"),
                ("select", "epic_name,epic_candname,pl_name,k2c_disp"),
                ("format", "csv"),
            ],
        }
    }
}

impl CatalogClient for ExoplanetArchiveClient {
    fn rows(&self, dataset: Dataset) -> Result<CatalogRows<'_>, SyncError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&Self::query(dataset))
            .send()
            .map_err(|err| SyncError::CatalogHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "catalog request failed".to_string());
            return Err(SyncError::CatalogStatus { status, message });
        }
        Ok(parse_rows(dataset, response))
    }
}

#[derive(Debug, Deserialize)]
struct KoiRecord {
    kepid: String,
    kepoi_name: Option<String>,
    koi_disposition: Option<String>,
    koi_score: Option<f64>,
    #[serde(default)]
    files: Option<String>,
}

#[derive(Debug, Deserialize)]
struct K2Record {
    epic_name: String,
    epic_candname: Option<String>,
    pl_name: Option<String>,
    k2c_disp: Option<String>,
    #[serde(default)]
    files: Option<String>,
}

/// Streams catalog rows out of the archive's csv export. An optional `files`
/// column holds space separated light-curve file names.
pub fn parse_rows<'a, R: Read + 'a>(dataset: Dataset, reader: R) -> CatalogRows<'a> {
    let reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);
    match dataset {
        Dataset::Kepler => Box::new(reader.into_deserialize::<KoiRecord>().map(|record| {
            let record = record.map_err(|err| SyncError::CatalogParse(err.to_string()))?;
            Ok(CatalogRow {
                object_id: record.kepid,
                name: record.kepoi_name.unwrap_or_default(),
                disposition: record.koi_disposition.unwrap_or_default(),
                score: record.koi_score,
                files: split_files(record.files),
                extra: BTreeMap::new(),
            })
        })),
        Dataset::K2 => Box::new(reader.into_deserialize::<K2Record>().map(|record| {
            let record = record.map_err(|err| SyncError::CatalogParse(err.to_string()))?;
            let mut extra = BTreeMap::new();
            if let Some(planet) = record.pl_name {
                extra.insert(PLANET_NAME.to_string(), planet);
            }
            Ok(CatalogRow {
                object_id: record.epic_name,
                name: record.epic_candname.unwrap_or_default(),
                disposition: record.k2c_disp.unwrap_or_default(),
                score: None,
                files: split_files(record.files),
                extra,
            })
        })),
    }
}

fn split_files(value: Option<String>) -> Option<Vec<String>> {
    let files = value?
        .split_whitespace()
        .map(|item| item.to_string())
        .collect::<Vec<_>>();
    (!files.is_empty()).then_some(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_koi_csv() {
        let body = "# comment line\nkepid,kepoi_name,koi_disposition,koi_score\n10797460,K00752.01,CONFIRMED,1.0\n10811496,K00753.01,CANDIDATE,\n";
        let rows = parse_rows(Dataset::Kepler, body.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].object_id, "10797460");
        assert_eq!(rows[0].score, Some(1.0));
        assert_eq!(rows[1].score, None);
        assert_eq!(rows[1].files, None);
    }

    #[test]
    fn parses_k2_planet_name() {
        let body = "epic_name,epic_candname,pl_name,k2c_disp\nEPIC 201367065,EPIC 201367065.01,K2-3 b,CONFIRMED\n";
        let rows = parse_rows(Dataset::K2, body.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].extra.get(PLANET_NAME).map(String::as_str), Some("K2-3 b"));
    }
}
