pub mod metrics_types;
pub mod types;

pub use metrics_types::{
    ErrorSample, LatencyDistributionBucket, LatencyMetrics, MetricsBucket, RawObservation,
    RequestMetricSummary, SummaryMetrics, TestResultSummary, TRANSPORT_FAILURE_STATUS,
};
pub use types::{
    AggregationConfig, Execution, ExecutionPlanSnapshot, ExecutionStatus, TestRequestSnapshot,
};
