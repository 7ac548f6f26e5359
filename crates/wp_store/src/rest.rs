//! Supabase (PostgREST) snapshot store
//!
//! Rows go to `POST {url}/rest/v1/{table}` and are purged with
//! `DELETE {url}/rest/v1/{table}?snapshot_ts=lt.{cutoff}`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;
use wp_config::StoreConfig;

use crate::{
    MAX_ERROR_BODY_CHARS, SnapshotRow, SnapshotStore, StoreError, body_excerpt,
    format_snapshot_ts, schema,
};

/// PostgREST-backed store
pub struct RestStore {
    base_url: String,
    api_key: String,
    table: String,
    client: reqwest::Client,
}

impl RestStore {
    /// Create a store for `base_url` / `table` with a bounded request timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConfigError`] if the URL is empty or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(StoreError::ConfigError("store.url (SUPABASE_URL) is not set".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::ConfigError(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            client,
        })
    }

    /// Create a store from the `[store]` config section
    ///
    /// # Errors
    ///
    /// See [`RestStore::new`].
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(
            config.url.clone(),
            config.api_key.clone(),
            config.table.clone(),
            config.timeout(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn status_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::StatusError {
            status,
            body: body_excerpt(&body, MAX_ERROR_BODY_CHARS),
        }
    }
}

fn transport_error(err: &reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::HttpError(format!("request timed out: {err}"))
    } else {
        StoreError::HttpError(err.to_string())
    }
}

#[async_trait]
impl SnapshotStore for RestStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn insert_snapshot_rows(&self, rows: &[SnapshotRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let response = self
            .authorized(self.client.post(self.endpoint()))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            return Err(Self::status_error(response).await);
        }

        debug!(rows = rows.len(), table = %self.table, "Inserted snapshot rows");
        Ok(rows.len())
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let filter = format!("lt.{}", format_snapshot_ts(&cutoff));

        let response = self
            .authorized(self.client.delete(self.endpoint()))
            .header("Prefer", "return=representation")
            .query(&[(schema::columns::SNAPSHOT_TS, filter.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        if response.status().as_u16() != 200 {
            // 204 No Content carries no representation to count
            return Ok(0);
        }

        let deleted: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::QueryError(format!("Invalid delete response: {e}")))?;
        Ok(deleted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TABLE: &str = "five9_agent_snapshots";

    fn store_for(server: &MockServer) -> RestStore {
        RestStore::new(server.uri(), "service-key", TABLE, Duration::from_secs(5)).unwrap()
    }

    fn sample_row(username: &str) -> SnapshotRow {
        SnapshotRow {
            snapshot_ts: Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap(),
            username: username.to_string(),
            full_name: String::new(),
            state: "Ready".to_string(),
            reason_code: String::new(),
            state_since: "2024-01-15 10:00:00".to_string(),
            state_since_utc: "2024-01-15 18:00:00".to_string(),
            state_duration: String::new(),
            campaign_name: String::new(),
            call_type: String::new(),
            media_availability: String::new(),
        }
    }

    #[test]
    fn test_new_requires_url() {
        let result = RestStore::new("", "key", TABLE, Duration::from_secs(5));
        assert!(matches!(result, Err(StoreError::ConfigError(_))));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let store = RestStore::new(
            "https://project.supabase.co/",
            "key",
            TABLE,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            store.endpoint(),
            "https://project.supabase.co/rest/v1/five9_agent_snapshots"
        );
    }

    #[test]
    fn test_from_config() {
        let config = StoreConfig {
            url: "https://project.supabase.co".to_string(),
            api_key: "key".to_string(),
            ..StoreConfig::default()
        };
        let store = RestStore::from_config(&config).unwrap();
        assert_eq!(store.name(), "supabase");
        assert!(store.endpoint().ends_with("/rest/v1/five9_agent_snapshots"));
    }

    #[tokio::test]
    async fn test_insert_posts_rows_with_auth_headers() {
        let server = MockServer::start().await;
        let rows = vec![sample_row("alice"), sample_row("bob")];

        Mock::given(method("POST"))
            .and(path("/rest/v1/five9_agent_snapshots"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("prefer", "return=minimal"))
            .and(body_json(serde_json::to_value(&rows).unwrap()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let written = store_for(&server).insert_snapshot_rows(&rows).await.unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_insert_empty_batch_skips_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let written = store_for(&server).insert_snapshot_rows(&[]).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_insert_failure_carries_truncated_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("e".repeat(2000)))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .insert_snapshot_rows(&[sample_row("alice")])
            .await
            .unwrap_err();

        match err {
            StoreError::StatusError { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("Expected StatusError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_counts_returned_rows() {
        let server = MockServer::start().await;
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 13, 18, 0, 0).unwrap();

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/five9_agent_snapshots"))
            .and(query_param("snapshot_ts", "lt.2024-01-13T18:00:00.000000+00:00"))
            .and(header("prefer", "return=representation"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"username": "a"}, {"username": "b"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let deleted = store_for(&server).delete_snapshots_before(cutoff).await.unwrap();
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn test_delete_failure_status() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .delete_snapshots_before(Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("unavailable"));
    }
}
