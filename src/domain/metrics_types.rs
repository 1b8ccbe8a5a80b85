use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status code recorded when a request never received an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

// ─── Raw Observations ────────────────────────────────────────────────────────

/// One request outcome as reported by the load-generation client. Consumed by
/// aggregation immediately; never mutated, not persisted at full fidelity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    /// Instant the request completed, epoch milliseconds.
    pub timestamp_ms: u64,
    /// Latency in nanoseconds, the load generator's native unit.
    pub latency_ns: u64,
    /// HTTP status, or [`TRANSPORT_FAILURE_STATUS`] for a hard failure.
    pub status_code: u16,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Present exactly when no valid HTTP response was received or the
    /// response was an error; classification is the client's concern.
    #[serde(default)]
    pub error: Option<String>,
    /// Index of the request definition within the execution plan.
    #[serde(default)]
    pub request_index: u32,
}

impl RawObservation {
    pub fn is_success(&self) -> bool {
        (100..400).contains(&self.status_code)
    }

    /// Histogram key for this observation's status; the transport failure
    /// sentinel serializes as "0" so counts still sum to the request total.
    pub fn status_key(&self) -> String {
        self.status_code.to_string()
    }
}

// ─── Latency Metrics ─────────────────────────────────────────────────────────

/// Percentile summary over a set of latency samples. All fields are integer
/// nanoseconds; millisecond conversion happens in the view layer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub avg_ns: u64,
    pub max_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
}

// ─── Metrics Buckets ─────────────────────────────────────────────────────────

/// Aggregated metrics for one fixed-width time window of an execution.
/// Identified by `(execution_id, bucket_number)`; immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBucket {
    pub execution_id: String,
    pub bucket_number: u64,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Decimal in [0, 1]; 0 when the window saw no requests.
    pub success_rate: f64,
    pub latency: LatencyMetrics,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(default)]
    pub status_codes: BTreeMap<String, u64>,
    /// Distinct error strings observed in the window, capped at the
    /// configured bucket error cap; first seen wins.
    #[serde(default)]
    pub errors: Vec<String>,
}

// ─── Result Summaries ────────────────────────────────────────────────────────

/// One error sample on a summary: a distinct error string with its status
/// and occurrence count. Summaries keep the top K of these by count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSample {
    pub error: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    pub count: u64,
}

/// One bar of the latency distribution chart payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyDistributionBucket {
    pub lower_bound_ns: u64,
    pub upper_bound_ns: u64,
    pub count: u64,
}

/// The metric fields shared by full-run summaries, per-request children, and
/// the execution-level rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Decimal in [0, 1]; 0 when the run saw no requests.
    pub success_rate: f64,
    pub latency: LatencyMetrics,
    pub test_duration_ms: u64,
    /// All requests over wall-clock duration, req/s.
    pub actual_rate: f64,
    /// Successful requests over wall-clock duration, req/s.
    pub throughput: f64,
    /// Highest single-second request count, req/s.
    pub peak_rate: f64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(default)]
    pub status_codes: BTreeMap<String, u64>,
    #[serde(default)]
    pub error_details: Vec<ErrorSample>,
    #[serde(default)]
    pub latency_distribution: Vec<LatencyDistributionBucket>,
}

/// Full-run aggregation for one test request of an execution. Created once
/// at end-of-run; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultSummary {
    pub execution_id: String,
    pub test_id: String,
    pub metrics: SummaryMetrics,
    /// Per-request breakdown when the plan contains multiple requests.
    #[serde(default)]
    pub request_metrics: Vec<RequestMetricSummary>,
}

/// Summary scoped to a single request definition across the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetricSummary {
    pub request_index: u32,
    pub metrics: SummaryMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(status_code: u16) -> RawObservation {
        RawObservation {
            timestamp_ms: 1_000,
            latency_ns: 5_000_000,
            status_code,
            bytes_in: 10,
            bytes_out: 20,
            error: None,
            request_index: 0,
        }
    }

    #[test]
    fn success_covers_non_error_statuses_only() {
        assert!(observation(200).is_success());
        assert!(observation(302).is_success());
        assert!(!observation(404).is_success());
        assert!(!observation(503).is_success());
        assert!(!observation(TRANSPORT_FAILURE_STATUS).is_success());
    }

    #[test]
    fn transport_failure_keys_as_zero() {
        assert_eq!(observation(TRANSPORT_FAILURE_STATUS).status_key(), "0");
        assert_eq!(observation(200).status_key(), "200");
    }

    #[test]
    fn summary_metrics_serialize_deterministically() {
        let mut metrics = SummaryMetrics::default();
        metrics.status_codes.insert("503".to_string(), 1);
        metrics.status_codes.insert("200".to_string(), 3);

        let first = serde_json::to_string(&metrics).unwrap();
        let second = serde_json::to_string(&metrics).unwrap();
        assert_eq!(first, second);
        // BTreeMap keys serialize in sorted order.
        assert!(first.find("\"200\"").unwrap() < first.find("\"503\"").unwrap());
    }
}
