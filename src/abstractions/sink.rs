use super::tenant::TenantContext;
use crate::domain::{MetricsBucket, TestResultSummary};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

/// Delivery boundary between the aggregation core and its collaborators.
///
/// The core hands over fully computed, immutable values; anything a sink does
/// with them (persist, forward, retry) happens on its side of the seam.
/// Redelivery of a bucket with the same `(execution_id, bucket_number)` and
/// content must land as a no-op overwrite, never a duplicate.
///
/// All operations are scoped to a tenant context for isolation.
pub trait MetricsSink: Send + Sync {
    /// Deliver one finalized bucket.
    fn publish_bucket(
        &self,
        tenant: &TenantContext,
        bucket: &MetricsBucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Deliver one end-of-run summary.
    fn publish_summary(
        &self,
        tenant: &TenantContext,
        summary: &TestResultSummary,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Load an execution's bucket series, ordered by bucket number.
    fn load_buckets(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MetricsBucket>>> + Send + '_>>;

    /// Load an execution's summaries, ordered by test id.
    fn load_summaries(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TestResultSummary>>> + Send + '_>>;
}

/// In-memory sink for tests and embedded use.
pub struct InMemorySink {
    buckets: tokio::sync::RwLock<HashMap<String, BTreeMap<u64, MetricsBucket>>>,
    summaries: tokio::sync::RwLock<HashMap<String, BTreeMap<String, TestResultSummary>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            buckets: tokio::sync::RwLock::new(HashMap::new()),
            summaries: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    fn execution_key(tenant: &TenantContext, execution_id: &str) -> String {
        tenant.scoped_key(execution_id)
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for InMemorySink {
    fn publish_bucket(
        &self,
        tenant: &TenantContext,
        bucket: &MetricsBucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = Self::execution_key(tenant, &bucket.execution_id);
        let bucket = bucket.clone();
        Box::pin(async move {
            let mut store = self.buckets.write().await;
            store
                .entry(key)
                .or_default()
                .insert(bucket.bucket_number, bucket);
            Ok(())
        })
    }

    fn publish_summary(
        &self,
        tenant: &TenantContext,
        summary: &TestResultSummary,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = Self::execution_key(tenant, &summary.execution_id);
        let summary = summary.clone();
        Box::pin(async move {
            let mut store = self.summaries.write().await;
            store
                .entry(key)
                .or_default()
                .insert(summary.test_id.clone(), summary);
            Ok(())
        })
    }

    fn load_buckets(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MetricsBucket>>> + Send + '_>> {
        let key = Self::execution_key(tenant, execution_id);
        Box::pin(async move {
            let store = self.buckets.read().await;
            Ok(store
                .get(&key)
                .map(|series| series.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn load_summaries(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TestResultSummary>>> + Send + '_>> {
        let key = Self::execution_key(tenant, execution_id);
        Box::pin(async move {
            let store = self.summaries.read().await;
            Ok(store
                .get(&key)
                .map(|by_test| by_test.values().cloned().collect())
                .unwrap_or_default())
        })
    }
}
