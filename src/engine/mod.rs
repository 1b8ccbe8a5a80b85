pub mod bucket;
pub mod cancel;
pub mod ingest;
pub mod percentile;
pub mod rollup;
pub mod summary;

pub use bucket::BucketAggregator;
pub use cancel::ExecutionRegistry;
pub use ingest::{run_ingestion, IngestOutcome};
pub use summary::{merge_buckets, summarize, SummaryMeta};
