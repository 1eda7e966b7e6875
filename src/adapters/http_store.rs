use crate::adapters::json_store::{decode_keys, decode_taxpayers, encode_keys, encode_taxpayers, UnparsedEntries};
use crate::domain::keys::{ContractKey, TaxpayerId};
use crate::domain::model::StatusSetKind;
use crate::domain::ports::StatusStore;
use crate::utils::error::{ReconError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

const STORE_NAME: &str = "http";

/// Status sets kept in a remote spreadsheet service.
///
/// `GET {endpoint}/{set}` returns the set as a JSON array (404 means empty)
/// and may carry an `ETag`. `PUT {endpoint}/{set}` replaces it, sending the
/// last seen tag as `If-Match`, so the service can answer 409/412 when
/// someone else wrote in between.
pub struct HttpStatusStore {
    client: Client,
    endpoint: String,
    etags: Mutex<HashMap<StatusSetKind, String>>,
    unparsed: UnparsedEntries,
}

impl HttpStatusStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            etags: Mutex::new(HashMap::new()),
            unparsed: UnparsedEntries::default(),
        })
    }

    fn url(&self, kind: StatusSetKind) -> String {
        format!("{}/{}", self.endpoint, kind.store_name())
    }

    fn remember_etag(&self, kind: StatusSetKind, response: &reqwest::Response) {
        let tag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Ok(mut tags) = self.etags.lock() {
            match tag {
                Some(tag) => {
                    tags.insert(kind, tag);
                }
                None => {
                    tags.remove(&kind);
                }
            }
        }
    }

    fn etag(&self, kind: StatusSetKind) -> Option<String> {
        self.etags.lock().ok().and_then(|tags| tags.get(&kind).cloned())
    }

    async fn get_set(&self, kind: StatusSetKind) -> Result<Vec<Value>> {
        let url = self.url(kind);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReconError::store_unavailable(STORE_NAME, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            self.remember_etag(kind, &response);
            return Ok(Vec::new());
        }
        check_status(kind, status)?;

        self.remember_etag(kind, &response);
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| ReconError::store_unavailable(STORE_NAME, format!("invalid body for '{}': {}", kind, e)))
    }

    async fn put_set(&self, kind: StatusSetKind, values: Vec<Value>) -> Result<()> {
        let url = self.url(kind);
        let values = self.unparsed.merge_into(kind, values);
        let mut request = self.client.put(&url).json(&values);
        if let Some(tag) = self.etag(kind) {
            request = request.header(header::IF_MATCH, tag);
        }
        tracing::debug!("PUT {} ({} entries)", url, values.len());

        let response = request
            .send()
            .await
            .map_err(|e| ReconError::store_unavailable(STORE_NAME, e.to_string()))?;
        check_status(kind, response.status())?;

        self.remember_etag(kind, &response);
        Ok(())
    }
}

fn check_status(kind: StatusSetKind, status: StatusCode) -> Result<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Err(ReconError::StoreConflict {
            set: kind.store_name().to_string(),
        }),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(
            ReconError::store_unavailable(STORE_NAME, format!("HTTP {} on '{}'", s, kind)),
        ),
        s => Err(ReconError::ConfigError {
            message: format!("status store rejected request for '{}': HTTP {}", kind, s),
        }),
    }
}

#[async_trait]
impl StatusStore for HttpStatusStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    async fn read_active(&self) -> Result<BTreeSet<TaxpayerId>> {
        let kind = StatusSetKind::Active;
        let (set, unparsed) = decode_taxpayers(kind.store_name(), self.get_set(kind).await?);
        self.unparsed.remember(kind, unparsed);
        Ok(set)
    }

    async fn read_awaiting(&self) -> Result<BTreeSet<ContractKey>> {
        let kind = StatusSetKind::Awaiting;
        let (set, unparsed) = decode_keys(kind.store_name(), self.get_set(kind).await?);
        self.unparsed.remember(kind, unparsed);
        Ok(set)
    }

    async fn read_reconciled(&self) -> Result<BTreeSet<ContractKey>> {
        let kind = StatusSetKind::Reconciled;
        let (set, unparsed) = decode_keys(kind.store_name(), self.get_set(kind).await?);
        self.unparsed.remember(kind, unparsed);
        Ok(set)
    }

    async fn write_active(&self, set: &BTreeSet<TaxpayerId>) -> Result<()> {
        self.put_set(StatusSetKind::Active, encode_taxpayers(set)).await
    }

    async fn write_awaiting(&self, set: &BTreeSet<ContractKey>) -> Result<()> {
        self.put_set(StatusSetKind::Awaiting, encode_keys(set)?).await
    }

    async fn write_reconciled(&self, set: &BTreeSet<ContractKey>) -> Result<()> {
        self.put_set(StatusSetKind::Reconciled, encode_keys(set)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(check_status(StatusSetKind::Awaiting, StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusSetKind::Awaiting, StatusCode::PRECONDITION_FAILED),
            Err(ReconError::StoreConflict { .. })
        ));
        assert!(check_status(StatusSetKind::Awaiting, StatusCode::BAD_GATEWAY)
            .unwrap_err()
            .is_retryable());
        assert!(!check_status(StatusSetKind::Awaiting, StatusCode::UNAUTHORIZED)
            .unwrap_err()
            .is_retryable());
    }

    #[test]
    fn test_endpoint_trailing_slash_is_ignored() {
        let store = HttpStatusStore::new("https://sheets.example.com/status/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.url(StatusSetKind::Reconciled),
            "https://sheets.example.com/status/tombados"
        );
    }
}
