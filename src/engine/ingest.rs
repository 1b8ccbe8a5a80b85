use crate::abstractions::sink::MetricsSink;
use crate::abstractions::tenant::TenantContext;
use crate::domain::{
    AggregationConfig, Execution, ExecutionStatus, MetricsBucket, RawObservation,
    TestResultSummary,
};
use crate::engine::bucket::BucketAggregator;
use crate::engine::rollup;
use crate::engine::summary::{self, SummaryMeta};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// What one ingestion run produced.
#[derive(Debug)]
pub struct IngestOutcome {
    /// End-of-run summary; `None` when the run was cancelled.
    pub summary: Option<TestResultSummary>,
    pub cancelled: bool,
    pub buckets_published: u64,
    pub observations_dropped: u64,
}

/// Drive one execution's observation stream through aggregation and out to
/// the sink.
///
/// Window finalization follows observation time, not the wall clock: a
/// window is flushed once a later-stamped observation proves it has elapsed,
/// so the same stream always yields the same buckets and summary no matter
/// when or how fast it is replayed. The interval tick only paces sink
/// deliveries for the live view.
///
/// Bucket delivery is best effort; the sink owns retries and a redelivered
/// bucket is byte-identical by construction. Failure to deliver the final
/// summary marks the execution failed.
pub async fn run_ingestion(
    execution: &mut Execution,
    test_id: &str,
    config: &AggregationConfig,
    tenant: &TenantContext,
    mut observations: mpsc::UnboundedReceiver<RawObservation>,
    sink: &dyn MetricsSink,
    cancel_rx: &mut broadcast::Receiver<()>,
) -> Result<IngestOutcome> {
    if execution.status != ExecutionStatus::Running {
        return Err(Error::ExecutionNotRunning(execution.execution_id.clone()));
    }
    let started_at_ms = execution
        .started_at
        .ok_or_else(|| Error::ExecutionNotRunning(execution.execution_id.clone()))?;

    let mut aggregator = BucketAggregator::new(&execution.execution_id, started_at_ms, config);
    let mut retained: Vec<RawObservation> = Vec::new();
    let mut latest_ms = started_at_ms;
    let mut outcome = IngestOutcome {
        summary: None,
        cancelled: false,
        buckets_published: 0,
        observations_dropped: 0,
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(config.window_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_observation = observations.recv() => match maybe_observation {
                Some(observation) => match aggregator.record(&observation) {
                    Ok(()) => {
                        latest_ms = latest_ms.max(observation.timestamp_ms);
                        retained.push(observation);
                    }
                    Err(err) => {
                        outcome.observations_dropped += 1;
                        warn!(
                            execution_id = %execution.execution_id,
                            %err,
                            "dropping observation"
                        );
                    }
                },
                None => break,
            },
            _ = ticker.tick() => {
                for bucket in aggregator.drain_elapsed(latest_ms) {
                    deliver_bucket(sink, tenant, &bucket, &mut outcome).await;
                }
            },
            _ = cancel_rx.recv() => {
                for bucket in aggregator.abort(latest_ms) {
                    deliver_bucket(sink, tenant, &bucket, &mut outcome).await;
                }
                rollup::mark_cancelled(execution)?;
                outcome.cancelled = true;
                debug!(execution_id = %execution.execution_id, "execution cancelled mid-run");
                return Ok(outcome);
            }
        }
    }

    for bucket in aggregator.finish(latest_ms) {
        deliver_bucket(sink, tenant, &bucket, &mut outcome).await;
    }

    let meta = SummaryMeta {
        execution_id: execution.execution_id.clone(),
        test_id: test_id.to_string(),
        started_at_ms,
        finished_at_ms: latest_ms,
        error_sample_top_k: config.error_sample_top_k,
    };
    let summary = match summary::summarize(&retained, &meta) {
        Ok(summary) => summary,
        Err(err) => {
            rollup::mark_failed(execution)?;
            return Err(err);
        }
    };
    if let Err(err) = sink.publish_summary(tenant, &summary).await {
        rollup::mark_failed(execution)?;
        return Err(err);
    }
    rollup::apply(execution, &summary, latest_ms)?;

    debug!(
        execution_id = %execution.execution_id,
        buckets = outcome.buckets_published,
        requests = summary.metrics.total_requests,
        "execution result ingested"
    );
    outcome.summary = Some(summary);
    Ok(outcome)
}

async fn deliver_bucket(
    sink: &dyn MetricsSink,
    tenant: &TenantContext,
    bucket: &MetricsBucket,
    outcome: &mut IngestOutcome,
) {
    match sink.publish_bucket(tenant, bucket).await {
        Ok(()) => outcome.buckets_published += 1,
        Err(err) => warn!(
            execution_id = %bucket.execution_id,
            bucket_number = bucket.bucket_number,
            %err,
            "bucket delivery failed"
        ),
    }
}
