// Health fan-out: /readyz first, /health as the fallback

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ServiceTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Ready
    Up,
    /// Alive but not ready
    Degraded,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ok,
    Degraded,
    Down,
}

/// Worst service status wins; no services is ok
pub fn verdict(statuses: impl IntoIterator<Item = ServiceStatus>) -> Verdict {
    match statuses.into_iter().max() {
        None | Some(ServiceStatus::Up) => Verdict::Ok,
        Some(ServiceStatus::Degraded) => Verdict::Degraded,
        Some(ServiceStatus::Down) => Verdict::Down,
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceHealth {
    pub name: String,
    pub status: ServiceStatus,
    /// Last HTTP status seen, 0 when nothing answered
    pub code: u16,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: Verdict,
    pub checked_at: DateTime<Utc>,
    pub services: Vec<ServiceHealth>,
}

pub struct HealthProber {
    http: reqwest::Client,
    services: Vec<ServiceTarget>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(services: Vec<ServiceTarget>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            services,
            timeout,
        }
    }

    async fn get(&self, url: &str) -> Option<u16> {
        match self.http.get(url).timeout(self.timeout).send().await {
            Ok(response) => Some(response.status().as_u16()),
            Err(e) => {
                tracing::debug!(url, error = %e, "Health probe failed");
                None
            }
        }
    }

    async fn probe(&self, target: &ServiceTarget) -> ServiceHealth {
        let started = Instant::now();
        let ready = self.get(&target.url("/readyz")).await;
        let (status, code) = match ready {
            Some(code) if (200..300).contains(&code) => (ServiceStatus::Up, code),
            _ => match self.get(&target.url("/health")).await {
                Some(code) if (200..300).contains(&code) => (ServiceStatus::Degraded, code),
                Some(code) => (ServiceStatus::Down, code),
                None => (ServiceStatus::Down, ready.unwrap_or(0)),
            },
        };
        ServiceHealth {
            name: target.name.clone(),
            status,
            code,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let services = join_all(self.services.iter().map(|target| self.probe(target))).await;
        let status = verdict(services.iter().map(|s| s.status));
        if status != Verdict::Ok {
            tracing::warn!(?status, "Console health fan-out is not ok");
        }
        HealthReport {
            status,
            checked_at: Utc::now(),
            services,
        }
    }
}
