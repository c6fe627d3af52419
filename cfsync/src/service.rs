#![doc = "HTTP implementation of the core's CustomFormatService for Radarr/Sonarr v3 APIs."]
//
//! # Remote service client
//!
//! [`ArrClient`] wires the [`CustomFormatService`] trait from `cfsync-core` to a real
//! Radarr or Sonarr instance. Both expose the same `/api/v3/customformat` endpoints and
//! authenticate with an `X-Api-Key` header, so one client serves both.
//!
//! Transport failures, non-success status codes and unexpected payloads are all returned
//! as boxed errors; the core records them as per-item failures (or aborts the target on a
//! failed listing). Request timeouts are enforced here.

use std::time::Duration;

use async_trait::async_trait;
use cfsync_core::contract::{CustomFormatService, RemoteDocument, ServiceError};
use cfsync_core::document::Document;
use serde_json::Value;

pub const API_KEY_HEADER: &str = "X-Api-Key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ArrClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ArrClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        tracing::info!(
            base_url,
            api_key_set = !api_key.is_empty(),
            "Initialized ArrClient"
        );
        Ok(ArrClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.base_url, path)
    }
}

#[async_trait]
impl CustomFormatService for ArrClient {
    async fn list(&self) -> Result<Vec<RemoteDocument>, ServiceError> {
        let url = self.endpoint("customformat");
        tracing::debug!(url = %url, "Listing custom formats");
        let values: Vec<Value> = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let documents = parse_listing(values);
        tracing::info!(count = documents.len(), "Fetched custom formats");
        Ok(documents)
    }

    async fn create(&self, document: &Document) -> Result<i64, ServiceError> {
        let url = self.endpoint("customformat");
        tracing::debug!(url = %url, name = ?document.name(), "Creating custom format");
        let created: Value = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(document)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        created
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| "create response did not contain a numeric id".into())
    }

    async fn update(&self, remote_id: i64, document: &Document) -> Result<(), ServiceError> {
        let url = self.endpoint(&format!("customformat/{remote_id}"));
        tracing::debug!(url = %url, name = ?document.name(), "Updating custom format");
        self.http
            .put(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(document)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, remote_id: i64) -> Result<(), ServiceError> {
        let url = self.endpoint(&format!("customformat/{remote_id}"));
        tracing::debug!(url = %url, "Deleting custom format");
        self.http
            .delete(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Keeps every listed object that carries a numeric `id`.
pub fn parse_listing(values: Vec<Value>) -> Vec<RemoteDocument> {
    values
        .into_iter()
        .filter_map(|value| {
            let document = Document::try_from(value).ok()?;
            match document.id() {
                Some(remote_id) => Some(RemoteDocument {
                    remote_id,
                    document,
                }),
                None => {
                    tracing::warn!(name = ?document.name(), "Ignoring listed custom format without an id");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client = ArrClient::new("http://localhost:7878/", "key").unwrap();
        assert_eq!(
            client.endpoint("customformat/3"),
            "http://localhost:7878/api/v3/customformat/3"
        );
    }

    #[test]
    fn listing_skips_entries_without_numeric_id() {
        let documents = parse_listing(vec![
            json!({"id": 1, "name": "A"}),
            json!({"name": "no id"}),
            json!({"id": "2", "name": "string id"}),
            json!("not an object"),
        ]);

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].remote_id, 1);
        assert_eq!(documents[0].document.name(), Some("A"));
    }
}
