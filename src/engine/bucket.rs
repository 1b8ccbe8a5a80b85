use crate::domain::{AggregationConfig, MetricsBucket, RawObservation};
use crate::engine::percentile;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Windows one execution's observation stream into fixed-width
/// [`MetricsBucket`]s. Owned by a single run for its lifetime; created at run
/// start and consumed by `finish` or `abort`.
///
/// Assignment is a pure function of the observation timestamp, so arrival
/// order never changes which bucket an observation lands in. Buckets are
/// emitted in strictly increasing number order, exactly once, and windows
/// that elapse with no observations still produce an all-zero bucket so the
/// series partitions the run's timeline.
pub struct BucketAggregator {
    execution_id: String,
    test_start_ms: u64,
    window_ms: u64,
    error_cap: usize,
    pending: BTreeMap<u64, WindowAccum>,
    next_emit: u64,
}

#[derive(Default)]
struct WindowAccum {
    latencies: Vec<u64>,
    success_count: u64,
    failure_count: u64,
    bytes_in: u64,
    bytes_out: u64,
    status_codes: BTreeMap<String, u64>,
    errors: Vec<String>,
}

impl BucketAggregator {
    pub fn new(
        execution_id: impl Into<String>,
        test_start_ms: u64,
        config: &AggregationConfig,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            test_start_ms,
            window_ms: config.window_ms.max(1),
            error_cap: config.bucket_error_cap,
            pending: BTreeMap::new(),
            next_emit: 0,
        }
    }

    /// Route an observation to the window its timestamp falls in.
    ///
    /// Rejects observations that predate the test start and observations for
    /// windows that have already been finalized; emitted buckets are
    /// immutable.
    pub fn record(&mut self, observation: &RawObservation) -> Result<()> {
        if observation.timestamp_ms < self.test_start_ms {
            return Err(Error::ObservationBeforeStart {
                timestamp_ms: observation.timestamp_ms,
                start_ms: self.test_start_ms,
            });
        }

        let number = (observation.timestamp_ms - self.test_start_ms) / self.window_ms;
        if number < self.next_emit {
            return Err(Error::ObservationTooLate {
                timestamp_ms: observation.timestamp_ms,
                bucket_number: number,
            });
        }

        let accum = self.pending.entry(number).or_default();
        accum.latencies.push(observation.latency_ns);
        if observation.is_success() {
            accum.success_count += 1;
        } else {
            accum.failure_count += 1;
        }
        accum.bytes_in += observation.bytes_in;
        accum.bytes_out += observation.bytes_out;
        *accum
            .status_codes
            .entry(observation.status_key())
            .or_insert(0) += 1;

        if let Some(error) = &observation.error {
            if accum.errors.len() < self.error_cap && !accum.errors.iter().any(|e| e == error) {
                accum.errors.push(error.clone());
            }
        }

        Ok(())
    }

    /// Finalize every window whose end has fully elapsed as of `now_ms`,
    /// including empty ones. Draining twice at the same instant emits
    /// nothing new.
    pub fn drain_elapsed(&mut self, now_ms: u64) -> Vec<MetricsBucket> {
        let elapsed_windows = now_ms.saturating_sub(self.test_start_ms) / self.window_ms;
        let mut buckets = Vec::new();
        for number in self.next_emit..elapsed_windows {
            let end_time_ms = self.window_end(number);
            buckets.push(self.finalize(number, end_time_ms));
        }
        buckets
    }

    /// End-of-run flush: emits all remaining windows, with the trailing
    /// partial window (if any) ending at `run_end_ms` instead of the grid
    /// boundary.
    pub fn finish(mut self, run_end_ms: u64) -> Vec<MetricsBucket> {
        let elapsed = run_end_ms.saturating_sub(self.test_start_ms);
        let full_windows = elapsed / self.window_ms;
        let partial = elapsed % self.window_ms > 0;
        let mut end_window = full_windows + u64::from(partial);
        // An observation time-stamped past run_end keeps its window; emit it
        // rather than drop it.
        if let Some(&last) = self.pending.keys().next_back() {
            end_window = end_window.max(last + 1);
        }

        let mut buckets = Vec::with_capacity(end_window.saturating_sub(self.next_emit) as usize);
        for number in self.next_emit..end_window {
            let end_time_ms = if number + 1 == end_window && partial && number == full_windows {
                run_end_ms
            } else {
                self.window_end(number)
            };
            buckets.push(self.finalize(number, end_time_ms));
        }
        buckets
    }

    /// Cancellation: only fully-elapsed windows are emitted; the partially
    /// filled current window is discarded.
    pub fn abort(mut self, now_ms: u64) -> Vec<MetricsBucket> {
        self.drain_elapsed(now_ms)
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    fn window_end(&self, number: u64) -> u64 {
        self.test_start_ms + (number + 1) * self.window_ms
    }

    fn finalize(&mut self, number: u64, end_time_ms: u64) -> MetricsBucket {
        let mut accum = self.pending.remove(&number).unwrap_or_default();
        self.next_emit = number + 1;

        let total_requests = accum.success_count + accum.failure_count;
        let success_rate = if total_requests > 0 {
            accum.success_count as f64 / total_requests as f64
        } else {
            0.0
        };

        MetricsBucket {
            execution_id: self.execution_id.clone(),
            bucket_number: number,
            start_time_ms: self.test_start_ms + number * self.window_ms,
            end_time_ms,
            total_requests,
            success_count: accum.success_count,
            failure_count: accum.failure_count,
            success_rate,
            latency: percentile::estimate(&mut accum.latencies),
            bytes_in: accum.bytes_in,
            bytes_out: accum.bytes_out,
            status_codes: accum.status_codes,
            errors: accum.errors,
        }
    }
}
