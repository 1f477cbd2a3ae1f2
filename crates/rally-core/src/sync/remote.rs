//! Remote store client
//!
//! The authoritative store is reached through [`RemoteStore`], a narrow
//! surface the adapters call. The production implementation speaks JSON over
//! HTTP to a per-entity table endpoint; tests substitute an in-memory fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::util::{compact_text, format_timestamp, is_http_url, normalize_text_option};

/// The remote surface an entity adapter syncs against
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace a record in the named table, keyed by its `id`.
    ///
    /// Must be idempotent: re-sending the same version after a lost
    /// acknowledgment leaves the table unchanged.
    async fn upsert(&self, table: &str, record: Value) -> Result<()>;

    /// Records in the named table mutated at or after `since` (all records
    /// when `since` is `None`), capped at `limit`.
    async fn changed_since(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Value>>;
}

/// HTTP implementation of [`RemoteStore`]
#[derive(Clone)]
pub struct HttpRemoteStore {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Build a client for the configured endpoint
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let endpoint = normalize_endpoint(config.endpoint.clone())?;
        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/{table}", self.endpoint)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(&self, table: &str, record: Value) -> Result<()> {
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .header("Accept", "application/json")
            .json(&record);

        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(parse_api_error(status, &body)));
        }
        Ok(())
    }

    async fn changed_since(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let mut query = vec![
            ("order".to_string(), "updated_at.desc".to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(since) = since {
            query.push((
                "updated_at".to_string(),
                format!("gte.{}", format_timestamp(since)),
            ));
        }

        let request = self
            .client
            .get(self.table_url(table))
            .query(&query)
            .header("Accept", "application/json");

        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(parse_api_error(status, &body)));
        }

        Ok(response.json::<Vec<Value>>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RemoteErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "remote endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_endpoint_strips_trailing_slash() {
        let endpoint = normalize_endpoint("https://api.example.com/".to_string()).unwrap();
        assert_eq!(endpoint, "https://api.example.com");
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let message = parse_api_error(
            StatusCode::CONFLICT,
            r#"{"message": "duplicate key value"}"#,
        );
        assert_eq!(message, "duplicate key value (409)");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_then_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream unavailable"),
            "upstream unavailable (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn table_url_joins_cleanly() {
        let store = HttpRemoteStore::new(&RemoteConfig::new("https://api.example.com/", None))
            .unwrap();
        assert_eq!(store.table_url("players"), "https://api.example.com/rest/players");
    }
}
