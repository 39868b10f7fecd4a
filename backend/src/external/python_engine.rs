use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::EngineSettings;
use crate::external::analysis_engine::{AnalysisEngine, EngineError};

/// HTTP client for the Python analysis service.
pub struct HttpAnalysisEngine {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    tickers: &'a [String],
    period: &'a str,
}

impl HttpAnalysisEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
        })
    }

    fn batch_url(&self) -> String {
        format!("{}/analyze/batch", self.base_url)
    }

    fn map_send_error(&self, err: reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::Timeout(self.timeout.as_secs())
        } else {
            EngineError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl AnalysisEngine for HttpAnalysisEngine {
    async fn analyze_batch(&self, tickers: &[String], period: &str) -> Result<Value, EngineError> {
        tracing::info!(
            "Calling analysis engine for {} ticker(s) (period {})",
            tickers.len(),
            period
        );

        let resp = self
            .client
            .post(self.batch_url())
            .json(&BatchRequest { tickers, period })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::BadStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        resp.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout(self.timeout.as_secs())
            } else {
                EngineError::Parse(e.to_string())
            }
        })
    }
}
