//! Presentation-boundary view models.
//!
//! The core and store keep latencies in nanoseconds and rates as decimals;
//! this module is the one place those become milliseconds and percentages.

use crate::domain::{LatencyMetrics, MetricsBucket, SummaryMetrics};
use serde::Serialize;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

fn round_to_3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyView {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

pub fn latency_ms(latency: &LatencyMetrics) -> LatencyView {
    LatencyView {
        min_ms: round_to_3(latency.min_ns as f64 / NANOS_PER_MILLI),
        avg_ms: round_to_3(latency.avg_ns as f64 / NANOS_PER_MILLI),
        max_ms: round_to_3(latency.max_ns as f64 / NANOS_PER_MILLI),
        p50_ms: round_to_3(latency.p50_ns as f64 / NANOS_PER_MILLI),
        p95_ms: round_to_3(latency.p95_ns as f64 / NANOS_PER_MILLI),
        p99_ms: round_to_3(latency.p99_ns as f64 / NANOS_PER_MILLI),
    }
}

pub fn success_rate_pct(success_rate: f64) -> f64 {
    round_to_3(success_rate * 100.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate_pct: f64,
    pub latency: LatencyView,
    pub test_duration_ms: u64,
    pub actual_rate: f64,
    pub throughput: f64,
    pub peak_rate: f64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

pub fn summary_view(metrics: &SummaryMetrics) -> SummaryView {
    SummaryView {
        total_requests: metrics.total_requests,
        success_count: metrics.success_count,
        failure_count: metrics.failure_count,
        success_rate_pct: success_rate_pct(metrics.success_rate),
        latency: latency_ms(&metrics.latency),
        test_duration_ms: metrics.test_duration_ms,
        actual_rate: round_to_3(metrics.actual_rate),
        throughput: round_to_3(metrics.throughput),
        peak_rate: round_to_3(metrics.peak_rate),
        bytes_in: metrics.bytes_in,
        bytes_out: metrics.bytes_out,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketView {
    pub bucket_number: u64,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub total_requests: u64,
    pub success_rate_pct: f64,
    pub latency: LatencyView,
}

pub fn bucket_view(bucket: &MetricsBucket) -> BucketView {
    BucketView {
        bucket_number: bucket.bucket_number,
        start_time_ms: bucket.start_time_ms,
        end_time_ms: bucket.end_time_ms,
        total_requests: bucket.total_requests,
        success_rate_pct: success_rate_pct(bucket.success_rate),
        latency: latency_ms(&bucket.latency),
    }
}

/// Chart axis choice for a bucket series: logarithmic once the worst
/// latency dwarfs the typical window median.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartScale {
    Linear,
    Log,
}

impl ChartScale {
    pub fn for_buckets(buckets: &[MetricsBucket]) -> ChartScale {
        let mut p50s: Vec<u64> = buckets
            .iter()
            .filter(|bucket| bucket.total_requests > 0)
            .map(|bucket| bucket.latency.p50_ns)
            .collect();
        if p50s.is_empty() {
            return ChartScale::Linear;
        }
        p50s.sort_unstable();
        let median_p50 = p50s[p50s.len() / 2];

        let max_latency = buckets
            .iter()
            .map(|bucket| bucket.latency.max_ns)
            .max()
            .unwrap_or(0);

        if max_latency > median_p50.saturating_mul(10) {
            ChartScale::Log
        } else {
            ChartScale::Linear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn bucket(total: u64, p50_ns: u64, max_ns: u64) -> MetricsBucket {
        MetricsBucket {
            execution_id: "exec-1".to_string(),
            bucket_number: 0,
            start_time_ms: 0,
            end_time_ms: 5_000,
            total_requests: total,
            success_count: total,
            failure_count: 0,
            success_rate: if total > 0 { 1.0 } else { 0.0 },
            latency: LatencyMetrics {
                min_ns: p50_ns,
                avg_ns: p50_ns,
                max_ns,
                p50_ns,
                p95_ns: max_ns,
                p99_ns: max_ns,
            },
            bytes_in: 0,
            bytes_out: 0,
            status_codes: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn nanoseconds_convert_to_milliseconds_once() {
        let latency = LatencyMetrics {
            min_ns: 10_000_000,
            avg_ns: 20_000_000,
            max_ns: 30_000_000,
            p50_ns: 20_000_000,
            p95_ns: 30_000_000,
            p99_ns: 30_000_000,
        };

        let view = latency_ms(&latency);
        assert_eq!(view.min_ms, 10.0);
        assert_eq!(view.avg_ms, 20.0);
        assert_eq!(view.max_ms, 30.0);
    }

    #[test]
    fn conversion_rounds_to_three_decimals() {
        let latency = LatencyMetrics {
            min_ns: 1_234_567,
            ..LatencyMetrics::default()
        };
        assert_eq!(latency_ms(&latency).min_ms, 1.235);
    }

    #[test]
    fn success_rate_becomes_percentage() {
        assert_eq!(success_rate_pct(0.5), 50.0);
        assert_eq!(success_rate_pct(1.0), 100.0);
        assert_eq!(success_rate_pct(0.0), 0.0);
        assert_eq!(success_rate_pct(0.33333), 33.333);
    }

    #[test]
    fn steady_series_charts_linearly() {
        let buckets = vec![
            bucket(10, 20_000_000, 35_000_000),
            bucket(12, 22_000_000, 40_000_000),
        ];
        assert_eq!(ChartScale::for_buckets(&buckets), ChartScale::Linear);
    }

    #[test]
    fn outlier_heavy_series_charts_logarithmically() {
        let buckets = vec![
            bucket(10, 20_000_000, 35_000_000),
            bucket(12, 22_000_000, 900_000_000),
        ];
        assert_eq!(ChartScale::for_buckets(&buckets), ChartScale::Log);
    }

    #[test]
    fn empty_windows_do_not_skew_the_median() {
        let buckets = vec![
            bucket(0, 0, 0),
            bucket(0, 0, 0),
            bucket(10, 20_000_000, 50_000_000),
        ];
        assert_eq!(ChartScale::for_buckets(&buckets), ChartScale::Linear);
    }

    #[test]
    fn empty_series_defaults_to_linear() {
        assert_eq!(ChartScale::for_buckets(&[]), ChartScale::Linear);
    }
}
