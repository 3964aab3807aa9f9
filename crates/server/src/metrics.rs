// Prometheus HTTP metrics
//
// http_requests_total{method,route,status} where status is OK for 2xx/3xx and
// the error code otherwise; http_request_duration_seconds{method,route}.

use std::sync::Arc;
use std::time::Instant;

use autoads_core::ErrorCode;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

pub struct HttpMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
}

impl HttpMetrics {
    pub fn new(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by method, route and status"),
            &["method", "route", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "route"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        Ok(Self {
            registry,
            requests_total,
            request_duration,
        })
    }

    /// Registry for service-specific collectors
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe(&self, method: &str, route: &str, status: &str, seconds: f64) {
        self.requests_total
            .with_label_values(&[method, route, status])
            .inc();
        self.request_duration
            .with_label_values(&[method, route])
            .observe(seconds);
    }

    /// Text exposition of every registered collector
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Register a service-specific latency histogram on the shared registry
pub fn register_histogram(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<HistogramVec, prometheus::Error> {
    let histogram = HistogramVec::new(
        HistogramOpts::new(name, help).buckets(DURATION_BUCKETS.to_vec()),
        labels,
    )?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

fn status_label(response: &Response) -> String {
    if let Some(code) = response.extensions().get::<ErrorCode>() {
        return code.as_str().to_string();
    }
    match ErrorCode::from_http_status(response.status().as_u16()) {
        None => "OK".to_string(),
        Some(code) => code.as_str().to_string(),
    }
}

pub async fn track_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().as_str().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics.observe(
        &method,
        &route,
        &status_label(&response),
        started.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_observations() {
        let metrics = HttpMetrics::new(Registry::new()).unwrap();
        metrics.observe("GET", "/health", "OK", 0.003);
        metrics.observe("POST", "/x", "NOT_FOUND", 0.2);

        let text = metrics.render();
        assert!(text.contains(r#"http_requests_total{method="GET",route="/health",status="OK"} 1"#));
        assert!(text.contains(r#"status="NOT_FOUND""#));
        assert!(text.contains("http_request_duration_seconds_bucket"));
    }

    #[test]
    fn test_service_histogram_is_exposed() {
        let metrics = HttpMetrics::new(Registry::new()).unwrap();
        let fetch = register_histogram(
            metrics.registry(),
            "sw_fetch_duration_seconds",
            "Upstream fetch latency",
            &["outcome"],
        )
        .unwrap();
        fetch.with_label_values(&["ok"]).observe(0.1);
        assert!(metrics.render().contains("sw_fetch_duration_seconds_count"));
        assert!(register_histogram(metrics.registry(), "sw_fetch_duration_seconds", "dup", &["outcome"]).is_err());
    }
}
