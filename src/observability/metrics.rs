// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

/// Prometheus metrics definitions for stateish
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, register_histogram_vec, Counter, CounterVec, Gauge, GaugeVec, Histogram,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// HTTP request duration in seconds (long-polls included)
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint", "status"],
        vec![0.001, 0.005, 0.010, 0.050, 0.250, 1.0, 5.0, 30.0, 60.0, 120.0]
    ).unwrap();

    /// HTTP request count
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Concurrent requests gauge
    pub static ref CONCURRENT_REQUESTS: GaugeVec = register_gauge_vec!(
        "concurrent_requests",
        "Number of concurrent requests being processed",
        &["protocol"]
    ).unwrap();

    // ============================================================================
    // State Metrics
    // ============================================================================

    /// Long-poll waits by outcome ("changed" or "timeout")
    pub static ref LONG_POLL_TOTAL: CounterVec = register_counter_vec!(
        "long_poll_total",
        "Total long-poll waits by outcome",
        &["outcome"]
    ).unwrap();

    /// Compare-and-swap writes rejected on a stale etag
    pub static ref CAS_CONFLICTS_TOTAL: Counter = register_counter!(
        "cas_conflicts_total",
        "Total compare-and-swap writes rejected with a stale etag"
    ).unwrap();

    /// States resident in the cache
    pub static ref CACHED_STATES: Gauge = register_gauge!(
        "cached_states",
        "Number of states resident in the cache"
    ).unwrap();

    /// Time spent waiting for the cache lock
    pub static ref CACHE_LOCK_WAIT: Histogram = register_histogram!(
        "cache_lock_wait_duration_seconds",
        "Cache lock wait duration in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0]
    ).unwrap();

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// Storage operation duration in seconds
    pub static ref STORAGE_OP_DURATION: HistogramVec = register_histogram_vec!(
        "storage_operation_duration_seconds",
        "Storage operation duration in seconds",
        &["operation", "backend"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]
    ).unwrap();

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Error count by type and component
    pub static ref ERROR_TOTAL: CounterVec = register_counter_vec!(
        "error_total",
        "Total number of errors",
        &["error_type", "component"]
    ).unwrap();
}

/// Increment HTTP request counter
pub fn increment_http_request(method: &str, endpoint: &str, status: &str) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, status])
        .inc();
}

/// Record HTTP request duration
pub fn record_http_duration(method: &str, endpoint: &str, status: &str, duration: f64) {
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, endpoint, status])
        .observe(duration);
}

pub fn inc_concurrent_requests(protocol: &str) {
    CONCURRENT_REQUESTS.with_label_values(&[protocol]).inc();
}

pub fn dec_concurrent_requests(protocol: &str) {
    CONCURRENT_REQUESTS.with_label_values(&[protocol]).dec();
}

/// Record how a long-poll wait ended
pub fn increment_long_poll(outcome: &str) {
    LONG_POLL_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_cas_conflict() {
    CAS_CONFLICTS_TOTAL.inc();
}

pub fn set_cached_states(count: usize) {
    CACHED_STATES.set(count as f64);
}

pub fn record_lock_wait(duration: f64) {
    CACHE_LOCK_WAIT.observe(duration);
}

/// Record storage operation duration
pub fn record_storage_op(operation: &str, backend: &str, duration: f64) {
    STORAGE_OP_DURATION
        .with_label_values(&[operation, backend])
        .observe(duration);
}

/// Increment error counter
pub fn increment_error(error_type: &str, component: &str) {
    ERROR_TOTAL
        .with_label_values(&[error_type, component])
        .inc();
}

/// Gather all metrics for Prometheus exposition
pub fn gather_metrics() -> Vec<u8> {
    use prometheus::Encoder;
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
    }
    buffer
}
