//! Persistence sink for served predictions.
//!
//! Write-only and best-effort: the prediction service hands records to a sink
//! on a detached task and only counts and logs the outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use config_rs::SupabaseConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;

use crate::classifier::{ClassProbabilities, PredictionResult};
use crate::schema::{AdaptedFeatureRecord, INTENSITE_AVANT, TEMPERATURE, TYPE_FRIGO};

/// Row appended to the predictions table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceRecord {
    pub predicted_status: String,
    pub probabilities: ClassProbabilities,
    pub intensite_avant: f64,
    pub temperature: f64,
    pub type_frigo: String,
}

impl PersistenceRecord {
    /// Combine a prediction with the input fields kept alongside it.
    ///
    /// Returns `None` if the record lacks one of those fields, which cannot
    /// happen for a record produced by [`crate::schema::adapt`].
    pub fn from_prediction(result: &PredictionResult, record: &AdaptedFeatureRecord) -> Option<Self> {
        Some(Self {
            predicted_status: result.predicted_status.clone(),
            probabilities: result.probabilities.clone(),
            intensite_avant: record.number(INTENSITE_AVANT.column)?,
            temperature: record.number(TEMPERATURE.column)?,
            type_frigo: record.text(TYPE_FRIGO.column)?.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("invalid sink configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("datastore returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("datastore acknowledged the insert without returning the row")]
    EmptyResponse,
}

/// Append-only destination for prediction records.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn append(&self, record: &PersistenceRecord) -> Result<(), SinkError>;
}

/// Outcome counters of persistence writes
#[derive(Debug, Default)]
pub struct PersistenceStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl PersistenceStats {
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Sink writing to a Supabase table through its REST interface.
#[derive(Debug, Clone)]
pub struct SupabaseSink {
    http_client: reqwest::Client,
    endpoint: Url,
    table: String,
}

impl SupabaseSink {
    pub fn new(config: &SupabaseConfig) -> Result<Self, SinkError> {
        let base = if config.url.ends_with('/') {
            config.url.clone()
        } else {
            format!("{}/", config.url)
        };
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join(&format!("rest/v1/{}", config.table)))
            .map_err(|e| SinkError::Config(format!("invalid SUPABASE_URL '{}': {}", config.url, e)))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SinkError::Config(format!(
                "unsupported scheme '{}' in SUPABASE_URL",
                endpoint.scheme()
            )));
        }

        let key = HeaderValue::from_str(&config.key)
            .map_err(|_| SinkError::Config("SUPABASE_KEY is not a valid header value".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.key))
            .map_err(|_| SinkError::Config("SUPABASE_KEY is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("prefer", HeaderValue::from_static("return=representation"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            table: config.table.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PersistenceSink for SupabaseSink {
    fn name(&self) -> &str {
        &self.table
    }

    async fn append(&self, record: &PersistenceRecord) -> Result<(), SinkError> {
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        if rows.is_empty() {
            return Err(SinkError::EmptyResponse);
        }

        Ok(())
    }
}
