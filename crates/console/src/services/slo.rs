// SLO aggregation from Prometheus text exposition
//
// Histograms are summed across every label except `le` before the P95 is
// interpolated inside the first bucket that reaches 95% of the count.

use std::collections::BTreeMap;
use std::time::Duration;

use autoads_core::UpstreamError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ServiceTarget;

pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const REQUESTS_TOTAL: &str = "http_requests_total";

/// Service-specific histograms reported under `notes`
pub const NOTE_HISTOGRAMS: [&str; 3] = [
    "resolve_nav_duration_seconds",
    "sw_fetch_duration_seconds",
    "ai_score_duration_seconds",
];

const OK_STATUS: &str = "OK";
const QUANTILE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

/// Label block body (between the braces)
fn parse_labels(raw: &str) -> Option<Vec<(String, String)>> {
    let mut labels = Vec::new();
    let mut chars = raw.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            return Some(labels);
        }
        let key: String = std::iter::from_fn(|| chars.next_if(|c| *c != '=')).collect();
        chars.next()?; // '='
        if chars.next()? != '"' {
            return None;
        }
        let mut value = String::new();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break,
                c => value.push(c),
            }
        }
        labels.push((key.trim().to_string(), value));
    }
}

fn parse_line(line: &str) -> Option<Sample> {
    let (name, labels, rest) = match line.find('{') {
        Some(open) => {
            let close = line.rfind('}')?;
            (&line[..open], parse_labels(&line[open + 1..close])?, &line[close + 1..])
        }
        None => {
            let (name, rest) = line.split_once(char::is_whitespace)?;
            (name, Vec::new(), rest)
        }
    };
    // A trailing timestamp may follow the value
    let value = parse_value(rest.split_whitespace().next()?)?;
    Some(Sample {
        name: name.trim().to_string(),
        labels,
        value,
    })
}

/// Every sample of a text exposition; comments and unparsable lines are skipped
pub fn parse_exposition(text: &str) -> Vec<Sample> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_line)
        .collect()
}

/// Cumulative buckets of one histogram, summed across labels, ordered by bound
pub fn histogram_buckets(samples: &[Sample], histogram: &str) -> Vec<(f64, f64)> {
    let bucket_name = format!("{}_bucket", histogram);
    let mut buckets: Vec<(f64, f64)> = Vec::new();
    for sample in samples.iter().filter(|s| s.name == bucket_name) {
        let Some(bound) = sample.label("le").and_then(parse_value) else {
            continue;
        };
        match buckets.iter_mut().find(|(b, _)| *b == bound) {
            Some((_, count)) => *count += sample.value,
            None => buckets.push((bound, sample.value)),
        }
    }
    buckets.sort_by(|a, b| a.0.total_cmp(&b.0));
    buckets
}

/// Quantile interpolated within cumulative buckets; None without observations
pub fn bucket_quantile(quantile: f64, buckets: &[(f64, f64)]) -> Option<f64> {
    let total = buckets.last()?.1;
    if total <= 0.0 {
        return None;
    }
    let rank = quantile * total;
    let (mut lower, mut below) = (0.0, 0.0);
    for &(bound, count) in buckets {
        if count >= rank {
            if bound.is_infinite() {
                return Some(lower);
            }
            if count <= below {
                return Some(bound);
            }
            return Some(lower + (bound - lower) * (rank - below) / (count - below));
        }
        lower = bound;
        below = count;
    }
    Some(lower)
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistogramNote {
    pub p95_seconds: Option<f64>,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSlo {
    pub service: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub p95_seconds: Option<f64>,
    pub requests: f64,
    pub errors: f64,
    /// Share of requests whose status label is not OK
    pub error_rate: Option<f64>,
    pub notes: BTreeMap<String, HistogramNote>,
}

impl ServiceSlo {
    fn unreachable(service: &str, error: String) -> Self {
        Self {
            service: service.to_string(),
            reachable: false,
            error: Some(error),
            p95_seconds: None,
            requests: 0.0,
            errors: 0.0,
            error_rate: None,
            notes: BTreeMap::new(),
        }
    }

    /// Summarize one service's exposition
    pub fn from_exposition(service: &str, text: &str) -> Self {
        let samples = parse_exposition(text);

        let (mut requests, mut errors) = (0.0, 0.0);
        for sample in samples.iter().filter(|s| s.name == REQUESTS_TOTAL) {
            requests += sample.value;
            if sample.label("status").is_some_and(|status| status != OK_STATUS) {
                errors += sample.value;
            }
        }

        let notes = NOTE_HISTOGRAMS
            .iter()
            .filter_map(|name| {
                let buckets = histogram_buckets(&samples, name);
                let count = buckets.last()?.1;
                Some((
                    name.to_string(),
                    HistogramNote {
                        p95_seconds: bucket_quantile(QUANTILE, &buckets),
                        count,
                    },
                ))
            })
            .collect();

        Self {
            service: service.to_string(),
            reachable: true,
            error: None,
            p95_seconds: bucket_quantile(QUANTILE, &histogram_buckets(&samples, REQUEST_DURATION)),
            requests,
            errors,
            error_rate: (requests > 0.0).then(|| errors / requests),
            notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SloReport {
    pub generated_at: DateTime<Utc>,
    pub services: Vec<ServiceSlo>,
}

/// Scrapes `/metrics` of every watched service
pub struct SloCollector {
    http: reqwest::Client,
    services: Vec<ServiceTarget>,
    timeout: Duration,
}

impl SloCollector {
    pub fn new(services: Vec<ServiceTarget>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            services,
            timeout,
        }
    }

    async fn scrape(&self, target: &ServiceTarget) -> Result<String, UpstreamError> {
        let response = self
            .http
            .get(target.url("/metrics"))
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
                message: status.to_string(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Scrapes run concurrently; an unreachable service is reported, not fatal
    pub async fn collect(&self) -> SloReport {
        let services = join_all(self.services.iter().map(|target| async move {
            match self.scrape(target).await {
                Ok(text) => ServiceSlo::from_exposition(&target.name, &text),
                Err(e) => {
                    tracing::warn!(service = %target.name, error = %e, "Metrics scrape failed");
                    ServiceSlo::unreachable(&target.name, e.to_string())
                }
            }
        }))
        .await;
        SloReport {
            generated_at: Utc::now(),
            services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPOSITION: &str = r#"
# HELP http_requests_total HTTP requests by method, route and status
# TYPE http_requests_total counter
http_requests_total{method="GET",route="/a",status="OK"} 90
http_requests_total{method="POST",route="/b",status="UPSTREAM"} 6
http_requests_total{method="POST",route="/b",status="INVALID_ARGUMENT"} 4
# TYPE http_request_duration_seconds histogram
http_request_duration_seconds_bucket{method="GET",route="/a",le="0.1"} 50
http_request_duration_seconds_bucket{method="GET",route="/a",le="0.5"} 80
http_request_duration_seconds_bucket{method="GET",route="/a",le="+Inf"} 90
http_request_duration_seconds_bucket{method="POST",route="/b",le="0.1"} 0
http_request_duration_seconds_bucket{method="POST",route="/b",le="0.5"} 5
http_request_duration_seconds_bucket{method="POST",route="/b",le="+Inf"} 10
http_request_duration_seconds_sum{method="GET",route="/a"} 12.5
resolve_nav_duration_seconds_bucket{le="1"} 3
resolve_nav_duration_seconds_bucket{le="+Inf"} 4 1700000000000
"#;

    #[test]
    fn test_parse_labels_with_escapes() {
        let samples = parse_exposition(r#"m{path="/a\"b",x="1,2"} 3"#);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label("path"), Some("/a\"b"));
        assert_eq!(samples[0].label("x"), Some("1,2"));
        assert_eq!(samples[0].value, 3.0);

        assert!(parse_exposition("garbage{ 1").is_empty());
        assert_eq!(parse_exposition("up 1")[0].name, "up");
    }

    #[test]
    fn test_buckets_are_summed_across_labels() {
        let samples = parse_exposition(EXPOSITION);
        let buckets = histogram_buckets(&samples, REQUEST_DURATION);
        assert_eq!(buckets, vec![(0.1, 50.0), (0.5, 85.0), (f64::INFINITY, 100.0)]);
    }

    #[test]
    fn test_quantile_interpolation() {
        // Rank 95 of 100 lands in the +Inf bucket: report its lower bound
        assert_eq!(
            bucket_quantile(0.95, &[(0.1, 50.0), (0.5, 85.0), (f64::INFINITY, 100.0)]),
            Some(0.5)
        );
        // Rank 9.5 of 10 between 0.25 (5) and 0.5 (10)
        let p = bucket_quantile(0.95, &[(0.25, 5.0), (0.5, 10.0), (f64::INFINITY, 10.0)]).unwrap();
        assert!((p - 0.475).abs() < 1e-9);
        assert_eq!(bucket_quantile(0.95, &[(0.1, 0.0), (f64::INFINITY, 0.0)]), None);
        assert_eq!(bucket_quantile(0.95, &[]), None);
    }

    #[test]
    fn test_service_summary() {
        let slo = ServiceSlo::from_exposition("siterank", EXPOSITION);
        assert!(slo.reachable);
        assert_eq!(slo.requests, 100.0);
        assert_eq!(slo.errors, 10.0);
        assert_eq!(slo.error_rate, Some(0.1));
        assert_eq!(slo.p95_seconds, Some(0.5));

        let note = &slo.notes["resolve_nav_duration_seconds"];
        assert_eq!(note.count, 4.0);
        assert_eq!(note.p95_seconds, Some(1.0));
        assert!(!slo.notes.contains_key("ai_score_duration_seconds"));
    }

    #[test]
    fn test_empty_exposition() {
        let slo = ServiceSlo::from_exposition("idle", "");
        assert_eq!(slo.error_rate, None);
        assert_eq!(slo.p95_seconds, None);
        assert!(slo.notes.is_empty());
    }
}
