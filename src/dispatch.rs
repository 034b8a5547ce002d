use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::script::SyncScript;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResponse {
    pub status: u16,
    pub body: String,
}

impl StoreResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote endpoint that executes update scripts.
pub trait MetadataStore: Send + Sync {
    fn exec(&self, script: &str) -> Result<StoreResponse, SyncError>;
}

#[derive(Clone)]
pub struct HttpMetadataStore {
    client: Client,
    exec_url: String,
}

impl HttpMetadataStore {
    pub fn new(endpoint: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kepler-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::StoreHttp(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| SyncError::StoreHttp(err.to_string()))?;
        Ok(Self {
            client,
            exec_url: Self::exec_url(endpoint),
        })
    }

    pub fn exec_url(endpoint: &str) -> String {
        format!("{}/api/v0/exec", endpoint.trim_end_matches('/'))
    }
}

impl MetadataStore for HttpMetadataStore {
    fn exec(&self, script: &str) -> Result<StoreResponse, SyncError> {
        let response = self
            .client
            .post(&self.exec_url)
            .body(script.to_string())
            .send()
            .map_err(|err| SyncError::StoreHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| SyncError::StoreHttp(err.to_string()))?;
        Ok(StoreResponse { status, body })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub id: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Posts scripts one at a time. Failures are reported and never stop the batch.
pub struct SyncDispatcher<'a, S: MetadataStore> {
    store: &'a S,
}

impl<'a, S: MetadataStore> SyncDispatcher<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn dispatch(&self, script: &SyncScript) -> DispatchResult {
        match self.store.exec(script.as_str()) {
            Ok(response) if response.is_success() => {
                debug!(id = %script.id, status = response.status, "metadata updated");
                DispatchResult {
                    id: script.id.clone(),
                    ok: true,
                    status: Some(response.status),
                    error: None,
                }
            }
            Ok(response) => {
                warn!(
                    id = %script.id,
                    status = response.status,
                    body = %response.body,
                    script = %script.as_str(),
                    "metadata store rejected script"
                );
                DispatchResult {
                    id: script.id.clone(),
                    ok: false,
                    status: Some(response.status),
                    error: Some(response.body),
                }
            }
            Err(err) => {
                warn!(
                    id = %script.id,
                    %err,
                    script = %script.as_str(),
                    "metadata store unreachable"
                );
                DispatchResult {
                    id: script.id.clone(),
                    ok: false,
                    status: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
