//! Process metrics.
//!
//! Counters and histograms are recorded through the `metrics` facade. When
//! the server runs with metrics enabled a Prometheus recorder is installed and
//! `GET /debug/vars` renders its text exposition.
//!
//! # Metrics
//!
//! - `http_requests_received_total`, `http_responses_sent_total`
//! - `http_responses_total{status}`
//! - `http_request_duration_us`
//! - `rate_limit_exceeded_total`, `rate_limit_current_clients`

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record an incoming request.
pub fn request_received() {
    metrics::counter!("http_requests_received_total").increment(1);
}

/// Record a sent response with its status and processing time.
pub fn response_sent(status: u16, duration_us: f64) {
    metrics::counter!("http_responses_sent_total").increment(1);
    metrics::counter!("http_responses_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("http_request_duration_us").record(duration_us);
}

/// Increment the rate limit rejection counter.
pub fn rate_limit_exceeded() {
    metrics::counter!("rate_limit_exceeded_total").increment(1);
}

/// Set the number of clients the rate limiter is tracking.
pub fn rate_limit_clients(count: usize) {
    metrics::gauge!("rate_limit_current_clients").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        request_received();
        response_sent(200, 150.0);
        rate_limit_exceeded();
        rate_limit_clients(3);
    }

    #[test]
    fn test_local_recorder_renders_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            request_received();
            response_sent(404, 10.0);
        });

        let rendered = handle.render();
        assert!(rendered.contains("http_requests_received_total 1"));
        assert!(rendered.contains("http_responses_total{status=\"404\"} 1"));
    }
}
