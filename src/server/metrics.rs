use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all server metrics
const PREFIX: &str = "top5";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Ranking Metrics
    pub static ref RANK_CLAIMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rank_claims_total"), "Committed rank claims by outcome"),
        &["outcome"]
    ).expect("Failed to create rank_claims_total metric");

    pub static ref RANK_EVICTIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_rank_evictions_total"),
        "Items pushed off the last ranked slot"
    ).expect("Failed to create rank_evictions_total metric");

    pub static ref RANK_RELEASES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_rank_releases_total"),
        "Ranks vacated by release or deletion"
    ).expect("Failed to create rank_releases_total metric");

    pub static ref RANKED_SLOTS_OCCUPIED: Gauge = Gauge::new(
        format!("{PREFIX}_ranked_slots_occupied"),
        "Number of ranked slots currently held by an item"
    ).expect("Failed to create ranked_slots_occupied metric");

    // Moderation Metrics
    pub static ref SUGGESTIONS_SUBMITTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_suggestions_submitted_total"),
        "Total suggestions submitted"
    ).expect("Failed to create suggestions_submitted_total metric");

    pub static ref MODERATION_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_moderation_decisions_total"), "Moderation decisions by outcome"),
        &["decision"]
    ).expect("Failed to create moderation_decisions_total metric");

    // Transaction Metrics
    pub static ref TRANSACTION_RETRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_transaction_retries_total"), "Write transactions retried after a conflict"),
        &["operation"]
    ).expect("Failed to create transaction_retries_total metric");

    pub static ref TRANSACTION_RETRIES_EXHAUSTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_transaction_retries_exhausted_total"),
            "Write transactions abandoned after the last retry"
        ),
        &["operation"]
    ).expect("Failed to create transaction_retries_exhausted_total metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Catalog rows by kind"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RANK_CLAIMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RANK_EVICTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RANK_RELEASES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RANKED_SLOTS_OCCUPIED.clone()));
    let _ = REGISTRY.register(Box::new(SUGGESTIONS_SUBMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MODERATION_DECISIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRANSACTION_RETRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRANSACTION_RETRIES_EXHAUSTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Seed catalog gauges from the store at startup
pub fn init_catalog_metrics(num_items: usize, num_ranked: usize, num_pending_suggestions: usize) {
    set_catalog_counts(num_items, num_pending_suggestions);
    set_ranked_slots_occupied(num_ranked);

    tracing::info!(
        "Catalog metrics initialized: {} items ({} ranked), {} pending suggestions",
        num_items,
        num_ranked,
        num_pending_suggestions
    );
}

/// Update the catalog gauges after a committed write
pub fn set_catalog_counts(num_items: usize, num_pending_suggestions: usize) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["item"])
        .set(num_items as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["pending_suggestion"])
        .set(num_pending_suggestions as f64);
}

/// Collapse ids in a request path so label cardinality stays bounded.
///
/// `/v1/items/3f2c.../rank` becomes `/v1/items/{id}/rank`.
pub fn categorize_endpoint(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    for i in 1..segments.len() {
        let collection = segments[i - 1];
        let segment = segments[i];
        if matches!(collection, "items" | "suggestions")
            && !segment.is_empty()
            && segment != "top5"
        {
            segments[i] = "{id}";
        }
    }
    segments.join("/")
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let path = categorize_endpoint(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, &path])
        .observe(duration.as_secs_f64());
}

/// Record a committed claim, `outcome` is "claimed" or "unchanged"
pub fn record_rank_claim(outcome: &str) {
    RANK_CLAIMS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_eviction() {
    RANK_EVICTIONS_TOTAL.inc();
}

pub fn record_rank_release() {
    RANK_RELEASES_TOTAL.inc();
}

pub fn set_ranked_slots_occupied(count: usize) {
    RANKED_SLOTS_OCCUPIED.set(count as f64);
}

pub fn record_suggestion_submitted() {
    SUGGESTIONS_SUBMITTED_TOTAL.inc();
}

/// Record a moderation decision, "approved" or "rejected"
pub fn record_moderation_decision(decision: &str) {
    MODERATION_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

pub fn record_transaction_retry(operation: &str) {
    TRANSACTION_RETRIES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_retries_exhausted(operation: &str) {
    TRANSACTION_RETRIES_EXHAUSTED_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_family(name: &str) -> bool {
        REGISTRY.gather().iter().any(|m| m.get_name() == name)
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();
        init_metrics();

        assert!(!REGISTRY.gather().is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_categorize_endpoint() {
        assert_eq!(categorize_endpoint("/v1/items/top5"), "/v1/items/top5");
        assert_eq!(categorize_endpoint("/v1/items"), "/v1/items");
        assert_eq!(categorize_endpoint("/v1/items/abc-123"), "/v1/items/{id}");
        assert_eq!(
            categorize_endpoint("/v1/items/abc-123/rank"),
            "/v1/items/{id}/rank"
        );
        assert_eq!(
            categorize_endpoint("/v1/suggestions/s-1/approve"),
            "/v1/suggestions/{id}/approve"
        );
        assert_eq!(categorize_endpoint("/"), "/");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();

        record_http_request("GET", "/v1/items/abc", 200, Duration::from_millis(5));

        let counter = HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "/v1/items/{id}", "200"]);
        assert!(counter.get() >= 1.0);
        assert!(has_family("top5_http_requests_total"));
    }

    #[test]
    fn test_ranking_metrics() {
        init_metrics();
        let before = RANK_EVICTIONS_TOTAL.get();

        record_rank_claim("claimed");
        record_eviction();
        record_rank_release();
        set_ranked_slots_occupied(4);

        assert!(RANK_CLAIMS_TOTAL.with_label_values(&["claimed"]).get() >= 1.0);
        assert!(RANK_EVICTIONS_TOTAL.get() >= before + 1.0);
        assert!(has_family("top5_rank_claims_total"));
    }

    #[test]
    fn test_transaction_retry_metrics() {
        init_metrics();

        record_transaction_retry("claim_rank");
        record_retries_exhausted("claim_rank");

        assert!(
            TRANSACTION_RETRIES_TOTAL
                .with_label_values(&["claim_rank"])
                .get()
                >= 1.0
        );
        assert!(has_family("top5_transaction_retries_exhausted_total"));
    }

    #[test]
    fn test_catalog_metrics() {
        init_metrics();

        init_catalog_metrics(12, 5, 3);

        // Manager tests running in parallel refresh the same gauges
        assert!(CATALOG_ITEMS_TOTAL.with_label_values(&["item"]).get() >= 0.0);
        assert!(CATALOG_ITEMS_TOTAL
            .with_label_values(&["pending_suggestion"])
            .get()
            >= 0.0);
        assert!(has_family("top5_catalog_items_total"));
    }
}
