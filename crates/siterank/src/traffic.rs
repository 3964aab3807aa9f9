// Domain traffic data source
//
// SimilarWebClient calls the upstream API once per request; retries and
// caching are the analyzer's business.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use autoads_core::UpstreamError;
use prometheus::HistogramVec;
use serde_json::Value;

#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Traffic payload for a host
    async fn fetch(&self, host: &str) -> Result<Value, UpstreamError>;
}

pub struct SimilarWebClient {
    http: reqwest::Client,
    template: String,
    timeout: Duration,
    fetch_duration: Option<HistogramVec>,
}

impl SimilarWebClient {
    pub fn new(template: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            template: template.trim().to_string(),
            timeout,
            fetch_duration: None,
        }
    }

    /// Observe call latency into `sw_fetch_duration_seconds{outcome}`
    pub fn with_histogram(mut self, histogram: HistogramVec) -> Self {
        self.fetch_duration = Some(histogram);
        self
    }

    /// `%s` in the template is the host; without it the host is appended as a path segment
    pub fn url_for(&self, host: &str) -> String {
        if self.template.contains("%s") {
            self.template.replace("%s", host)
        } else {
            format!("{}/{}", self.template.trim_end_matches('/'), host)
        }
    }

    async fn call(&self, host: &str) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(self.url_for(host))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TrafficSource for SimilarWebClient {
    async fn fetch(&self, host: &str) -> Result<Value, UpstreamError> {
        let started = Instant::now();
        let result = self.call(host).await;
        if let Some(histogram) = &self.fetch_duration {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            histogram
                .with_label_values(&[outcome])
                .observe(started.elapsed().as_secs_f64());
        }
        result
    }
}
