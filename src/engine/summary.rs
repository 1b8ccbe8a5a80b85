use crate::domain::{
    ErrorSample, LatencyDistributionBucket, LatencyMetrics, MetricsBucket, RawObservation,
    RequestMetricSummary, SummaryMetrics, TestResultSummary, TRANSPORT_FAILURE_STATUS,
};
use crate::engine::percentile;
use crate::error::{Error, Result};
use hdrhistogram::Histogram;
use std::collections::BTreeMap;

/// Highest latency tracked by the distribution histogram, in microseconds.
const MAX_TRACKED_MICROS: u64 = 60_000_000;

/// Edge boundaries of the latency distribution chart payload, milliseconds.
const DISTRIBUTION_EDGES_MS: [u64; 18] = [
    0, 1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 20_000, 30_000, 45_000,
    60_000,
];

/// Identity and wall-clock context for one summarization. Summarization is a
/// pure function of this and the observation set; the instant it runs at
/// never affects the output.
#[derive(Debug, Clone)]
pub struct SummaryMeta {
    pub execution_id: String,
    pub test_id: String,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub error_sample_top_k: usize,
}

/// Canonical full-run summarizer over raw observations.
pub fn summarize(observations: &[RawObservation], meta: &SummaryMeta) -> Result<TestResultSummary> {
    for observation in observations {
        if observation.timestamp_ms < meta.started_at_ms {
            return Err(Error::ObservationBeforeStart {
                timestamp_ms: observation.timestamp_ms,
                start_ms: meta.started_at_ms,
            });
        }
    }

    let metrics = build_metrics(observations, meta)?;
    let request_metrics = per_request_metrics(observations, meta)?;

    Ok(TestResultSummary {
        execution_id: meta.execution_id.clone(),
        test_id: meta.test_id.clone(),
        metrics,
        request_metrics,
    })
}

/// Derived convenience: fold an execution's bucket series into a summary.
///
/// Counters, byte totals, and status histograms merge exactly. Latency
/// percentiles are the request-weighted combination of per-bucket values and
/// error counts are per-bucket sightings, so both are approximations; the
/// raw-observation path is authoritative. No distribution payload is
/// derivable from buckets.
pub fn merge_buckets(buckets: &[MetricsBucket], meta: &SummaryMeta) -> TestResultSummary {
    let mut metrics = SummaryMetrics::default();
    let mut error_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut min_ns = u64::MAX;
    let mut weighted_avg = 0u128;
    let mut weighted_p50 = 0u128;
    let mut weighted_p95 = 0u128;
    let mut weighted_p99 = 0u128;

    for bucket in buckets {
        metrics.total_requests += bucket.total_requests;
        metrics.success_count += bucket.success_count;
        metrics.failure_count += bucket.failure_count;
        metrics.bytes_in += bucket.bytes_in;
        metrics.bytes_out += bucket.bytes_out;
        for (code, count) in &bucket.status_codes {
            *metrics.status_codes.entry(code.clone()).or_insert(0) += count;
        }
        for error in &bucket.errors {
            *error_counts.entry(error.clone()).or_insert(0) += 1;
        }

        if bucket.total_requests > 0 {
            min_ns = min_ns.min(bucket.latency.min_ns);
            metrics.latency.max_ns = metrics.latency.max_ns.max(bucket.latency.max_ns);
            let weight = bucket.total_requests as u128;
            weighted_avg += bucket.latency.avg_ns as u128 * weight;
            weighted_p50 += bucket.latency.p50_ns as u128 * weight;
            weighted_p95 += bucket.latency.p95_ns as u128 * weight;
            weighted_p99 += bucket.latency.p99_ns as u128 * weight;

            let window_secs =
                (bucket.end_time_ms.saturating_sub(bucket.start_time_ms) as f64 / 1_000.0)
                    .max(0.001);
            metrics.peak_rate = metrics
                .peak_rate
                .max(bucket.total_requests as f64 / window_secs);
        }
    }

    metrics.test_duration_ms = meta.finished_at_ms.saturating_sub(meta.started_at_ms);
    if metrics.total_requests > 0 {
        let total = metrics.total_requests as u128;
        metrics.success_rate = metrics.success_count as f64 / metrics.total_requests as f64;
        metrics.latency = LatencyMetrics {
            min_ns,
            avg_ns: (weighted_avg / total) as u64,
            max_ns: metrics.latency.max_ns,
            p50_ns: (weighted_p50 / total) as u64,
            p95_ns: (weighted_p95 / total) as u64,
            p99_ns: (weighted_p99 / total) as u64,
        };
        let secs = (metrics.test_duration_ms as f64 / 1_000.0).max(0.001);
        metrics.actual_rate = metrics.total_requests as f64 / secs;
        metrics.throughput = metrics.success_count as f64 / secs;
    }

    metrics.error_details = ranked_error_samples(
        error_counts
            .into_iter()
            .map(|(error, count)| ErrorSample {
                error,
                status_code: None,
                count,
            })
            .collect(),
        meta.error_sample_top_k,
    );

    TestResultSummary {
        execution_id: meta.execution_id.clone(),
        test_id: meta.test_id.clone(),
        metrics,
        request_metrics: Vec::new(),
    }
}

fn build_metrics(observations: &[RawObservation], meta: &SummaryMeta) -> Result<SummaryMetrics> {
    let mut metrics = SummaryMetrics::default();
    let mut latencies = Vec::with_capacity(observations.len());
    let mut histogram = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_MICROS, 3)
        .map_err(|err| Error::Histogram(err.to_string()))?;
    let mut error_map: BTreeMap<(String, u16), u64> = BTreeMap::new();
    let mut per_second: BTreeMap<u64, u64> = BTreeMap::new();

    for observation in observations {
        metrics.total_requests += 1;
        metrics.bytes_in += observation.bytes_in;
        metrics.bytes_out += observation.bytes_out;
        if observation.is_success() {
            metrics.success_count += 1;
        } else {
            metrics.failure_count += 1;
        }
        *metrics
            .status_codes
            .entry(observation.status_key())
            .or_insert(0) += 1;

        if let Some(error) = &observation.error {
            *error_map
                .entry((error.clone(), observation.status_code))
                .or_insert(0) += 1;
        }

        latencies.push(observation.latency_ns);
        let micros = (observation.latency_ns / 1_000).clamp(1, MAX_TRACKED_MICROS);
        let _ = histogram.record(micros);
        *per_second
            .entry(observation.timestamp_ms / 1_000)
            .or_insert(0) += 1;
    }

    metrics.test_duration_ms = meta.finished_at_ms.saturating_sub(meta.started_at_ms);
    if metrics.total_requests > 0 {
        metrics.success_rate = metrics.success_count as f64 / metrics.total_requests as f64;
        let secs = (metrics.test_duration_ms as f64 / 1_000.0).max(0.001);
        metrics.actual_rate = metrics.total_requests as f64 / secs;
        metrics.throughput = metrics.success_count as f64 / secs;
        metrics.peak_rate = per_second.values().copied().max().unwrap_or(0) as f64;
        metrics.latency = percentile::estimate(&mut latencies);
        metrics.latency_distribution = distribution(&histogram);
    }

    metrics.error_details = ranked_error_samples(
        error_map
            .into_iter()
            .map(|((error, status_code), count)| ErrorSample {
                error,
                status_code: if status_code == TRANSPORT_FAILURE_STATUS {
                    None
                } else {
                    Some(status_code)
                },
                count,
            })
            .collect(),
        meta.error_sample_top_k,
    );

    Ok(metrics)
}

fn per_request_metrics(
    observations: &[RawObservation],
    meta: &SummaryMeta,
) -> Result<Vec<RequestMetricSummary>> {
    let mut grouped: BTreeMap<u32, Vec<RawObservation>> = BTreeMap::new();
    for observation in observations {
        grouped
            .entry(observation.request_index)
            .or_default()
            .push(observation.clone());
    }
    if grouped.len() < 2 {
        return Ok(Vec::new());
    }

    let mut children = Vec::with_capacity(grouped.len());
    for (request_index, group) in grouped {
        children.push(RequestMetricSummary {
            request_index,
            metrics: build_metrics(&group, meta)?,
        });
    }
    Ok(children)
}

fn ranked_error_samples(mut samples: Vec<ErrorSample>, top_k: usize) -> Vec<ErrorSample> {
    samples.sort_by(|left, right| {
        right
            .count
            .cmp(&left.count)
            .then_with(|| left.error.cmp(&right.error))
            .then_with(|| left.status_code.cmp(&right.status_code))
    });
    samples.truncate(top_k.max(1));
    samples
}

fn distribution(histogram: &Histogram<u64>) -> Vec<LatencyDistributionBucket> {
    let mut counts = [0u64; DISTRIBUTION_EDGES_MS.len() - 1];
    for value in histogram.iter_recorded() {
        counts[edge_index(value.value_iterated_to())] += value.count_at_value();
    }

    let mut buckets = Vec::new();
    for (index, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        buckets.push(LatencyDistributionBucket {
            lower_bound_ns: DISTRIBUTION_EDGES_MS[index] * 1_000_000,
            upper_bound_ns: DISTRIBUTION_EDGES_MS[index + 1] * 1_000_000,
            count,
        });
    }
    buckets
}

fn edge_index(micros: u64) -> usize {
    for index in 0..DISTRIBUTION_EDGES_MS.len() - 1 {
        if micros < DISTRIBUTION_EDGES_MS[index + 1] * 1_000 {
            return index;
        }
    }
    DISTRIBUTION_EDGES_MS.len() - 2
}
