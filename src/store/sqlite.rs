use crate::abstractions::sink::MetricsSink;
use crate::abstractions::tenant::TenantContext;
use crate::domain::{
    Execution, ExecutionStatus, LatencyMetrics, MetricsBucket, RequestMetricSummary,
    SummaryMetrics, TestResultSummary,
};
use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;

/// Durable collaborator for executions, bucket series, and summaries.
///
/// Latency fields are persisted in nanoseconds exactly as computed; map- and
/// list-shaped fields are serialized as JSON text blobs at this boundary.
/// Bucket writes are keyed by `(execution_id, bucket_number)` and upsert, so
/// a retried delivery of an identical bucket lands as a no-op overwrite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_execution(&self, tenant: &TenantContext, execution: &Execution) -> Result<()> {
        let metrics_json = metrics_to_json(execution.metrics.as_ref())?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO executions (
               execution_id, tenant_id, plan_id, plan_hash, status,
               created_at, started_at, result_timestamp, metrics_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                execution.execution_id,
                tenant.tenant_id.as_str(),
                execution.plan_id,
                execution.plan_hash,
                execution.status.as_str(),
                execution.created_at,
                execution.started_at,
                execution.result_timestamp,
                metrics_json,
            ],
        )?;
        Ok(())
    }

    /// Persist the mutable tail of an execution: status, timestamps, and the
    /// rollup fields.
    pub fn update_execution(&self, tenant: &TenantContext, execution: &Execution) -> Result<()> {
        let metrics_json = metrics_to_json(execution.metrics.as_ref())?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE executions
             SET status = ?1, started_at = ?2, result_timestamp = ?3, metrics_json = ?4
             WHERE execution_id = ?5 AND tenant_id = ?6;",
            params![
                execution.status.as_str(),
                execution.started_at,
                execution.result_timestamp,
                metrics_json,
                execution.execution_id,
                tenant.tenant_id.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(Error::ExecutionNotFound(execution.execution_id.clone()));
        }
        Ok(())
    }

    pub fn load_execution(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Result<Option<Execution>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT execution_id, plan_id, plan_hash, status, created_at,
                        started_at, result_timestamp, metrics_json
                 FROM executions
                 WHERE execution_id = ?1 AND tenant_id = ?2;",
                params![execution_id, tenant.tenant_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u64>(4)?,
                        row.get::<_, Option<u64>>(5)?,
                        row.get::<_, Option<u64>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            execution_id,
            plan_id,
            plan_hash,
            status,
            created_at,
            started_at,
            result_timestamp,
            metrics_json,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(Execution {
            execution_id,
            tenant_id: tenant.tenant_id.clone(),
            plan_id,
            plan_hash,
            status: ExecutionStatus::from_str(&status),
            created_at,
            started_at,
            result_timestamp,
            metrics: metrics_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?,
        }))
    }

    pub fn upsert_bucket(&self, tenant: &TenantContext, bucket: &MetricsBucket) -> Result<()> {
        let latency_json = serde_json::to_string(&bucket.latency)?;
        let status_codes_json = serde_json::to_string(&bucket.status_codes)?;
        let errors_json = serde_json::to_string(&bucket.errors)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO metric_buckets (
               execution_id, bucket_number, tenant_id, start_time, end_time,
               total_requests, success_count, failure_count, success_rate,
               bytes_in, bytes_out, latency_json, status_codes_json, errors_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(execution_id, bucket_number)
             DO UPDATE SET
               start_time = excluded.start_time,
               end_time = excluded.end_time,
               total_requests = excluded.total_requests,
               success_count = excluded.success_count,
               failure_count = excluded.failure_count,
               success_rate = excluded.success_rate,
               bytes_in = excluded.bytes_in,
               bytes_out = excluded.bytes_out,
               latency_json = excluded.latency_json,
               status_codes_json = excluded.status_codes_json,
               errors_json = excluded.errors_json;",
            params![
                bucket.execution_id,
                bucket.bucket_number,
                tenant.tenant_id.as_str(),
                bucket.start_time_ms,
                bucket.end_time_ms,
                bucket.total_requests,
                bucket.success_count,
                bucket.failure_count,
                bucket.success_rate,
                bucket.bytes_in,
                bucket.bytes_out,
                latency_json,
                status_codes_json,
                errors_json,
            ],
        )?;
        Ok(())
    }

    pub fn load_bucket_series(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Result<Vec<MetricsBucket>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT execution_id, bucket_number, start_time, end_time,
                    total_requests, success_count, failure_count, success_rate,
                    bytes_in, bytes_out, latency_json, status_codes_json, errors_json
             FROM metric_buckets
             WHERE execution_id = ?1 AND tenant_id = ?2
             ORDER BY bucket_number ASC;",
        )?;

        let rows = stmt.query_map(params![execution_id, tenant.tenant_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, u64>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, u64>(8)?,
                row.get::<_, u64>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
            ))
        })?;

        let mut buckets = Vec::new();
        for row in rows {
            let (
                execution_id,
                bucket_number,
                start_time_ms,
                end_time_ms,
                total_requests,
                success_count,
                failure_count,
                success_rate,
                bytes_in,
                bytes_out,
                latency_json,
                status_codes_json,
                errors_json,
            ) = row?;

            let latency: LatencyMetrics = serde_json::from_str(&latency_json)?;
            buckets.push(MetricsBucket {
                execution_id,
                bucket_number,
                start_time_ms,
                end_time_ms,
                total_requests,
                success_count,
                failure_count,
                success_rate,
                latency,
                bytes_in,
                bytes_out,
                status_codes: serde_json::from_str(&status_codes_json)?,
                errors: serde_json::from_str(&errors_json)?,
            });
        }
        Ok(buckets)
    }

    pub fn upsert_summary(&self, tenant: &TenantContext, summary: &TestResultSummary) -> Result<()> {
        let metrics_json = serde_json::to_string(&summary.metrics)?;
        let request_metrics_json = serde_json::to_string(&summary.request_metrics)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO test_result_summaries (
               execution_id, test_id, tenant_id, metrics_json, request_metrics_json
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(execution_id, test_id)
             DO UPDATE SET
               metrics_json = excluded.metrics_json,
               request_metrics_json = excluded.request_metrics_json;",
            params![
                summary.execution_id,
                summary.test_id,
                tenant.tenant_id.as_str(),
                metrics_json,
                request_metrics_json,
            ],
        )?;
        Ok(())
    }

    pub fn load_summary_rows(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Result<Vec<TestResultSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT execution_id, test_id, metrics_json, request_metrics_json
             FROM test_result_summaries
             WHERE execution_id = ?1 AND tenant_id = ?2
             ORDER BY test_id ASC;",
        )?;

        let rows = stmt.query_map(params![execution_id, tenant.tenant_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (execution_id, test_id, metrics_json, request_metrics_json) = row?;
            let metrics: SummaryMetrics = serde_json::from_str(&metrics_json)?;
            let request_metrics: Vec<RequestMetricSummary> =
                serde_json::from_str(&request_metrics_json)?;
            summaries.push(TestResultSummary {
                execution_id,
                test_id,
                metrics,
                request_metrics,
            });
        }
        Ok(summaries)
    }

    /// Delete an execution and everything it owns. Returns whether a row
    /// existed.
    pub fn delete_execution(&self, tenant: &TenantContext, execution_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN;")?;
        let cascade = (|| -> Result<bool> {
            conn.execute(
                "DELETE FROM metric_buckets WHERE execution_id = ?1 AND tenant_id = ?2;",
                params![execution_id, tenant.tenant_id.as_str()],
            )?;
            conn.execute(
                "DELETE FROM test_result_summaries WHERE execution_id = ?1 AND tenant_id = ?2;",
                params![execution_id, tenant.tenant_id.as_str()],
            )?;
            let deleted = conn.execute(
                "DELETE FROM executions WHERE execution_id = ?1 AND tenant_id = ?2;",
                params![execution_id, tenant.tenant_id.as_str()],
            )?;
            Ok(deleted > 0)
        })();

        match cascade {
            Ok(deleted) => {
                conn.execute_batch("COMMIT;")?;
                Ok(deleted)
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS executions (
           execution_id TEXT PRIMARY KEY,
           tenant_id TEXT NOT NULL,
           plan_id TEXT NOT NULL,
           plan_hash TEXT NOT NULL,
           status TEXT NOT NULL,
           created_at INTEGER NOT NULL,
           started_at INTEGER,
           result_timestamp INTEGER,
           metrics_json TEXT
         );
         CREATE TABLE IF NOT EXISTS metric_buckets (
           execution_id TEXT NOT NULL,
           bucket_number INTEGER NOT NULL,
           tenant_id TEXT NOT NULL,
           start_time INTEGER NOT NULL,
           end_time INTEGER NOT NULL,
           total_requests INTEGER NOT NULL,
           success_count INTEGER NOT NULL,
           failure_count INTEGER NOT NULL,
           success_rate REAL NOT NULL,
           bytes_in INTEGER NOT NULL,
           bytes_out INTEGER NOT NULL,
           latency_json TEXT NOT NULL,
           status_codes_json TEXT NOT NULL,
           errors_json TEXT NOT NULL,
           PRIMARY KEY (execution_id, bucket_number)
         );
         CREATE TABLE IF NOT EXISTS test_result_summaries (
           execution_id TEXT NOT NULL,
           test_id TEXT NOT NULL,
           tenant_id TEXT NOT NULL,
           metrics_json TEXT NOT NULL,
           request_metrics_json TEXT NOT NULL,
           PRIMARY KEY (execution_id, test_id)
         );",
    )?;
    Ok(())
}

fn metrics_to_json(metrics: Option<&SummaryMetrics>) -> Result<Option<String>> {
    metrics
        .map(|metrics| serde_json::to_string(metrics).map_err(Error::from))
        .transpose()
}

impl MetricsSink for SqliteStore {
    fn publish_bucket(
        &self,
        tenant: &TenantContext,
        bucket: &MetricsBucket,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tenant = tenant.clone();
        let bucket = bucket.clone();
        Box::pin(async move { self.upsert_bucket(&tenant, &bucket) })
    }

    fn publish_summary(
        &self,
        tenant: &TenantContext,
        summary: &TestResultSummary,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tenant = tenant.clone();
        let summary = summary.clone();
        Box::pin(async move { self.upsert_summary(&tenant, &summary) })
    }

    fn load_buckets(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MetricsBucket>>> + Send + '_>> {
        let tenant = tenant.clone();
        let execution_id = execution_id.to_string();
        Box::pin(async move { self.load_bucket_series(&tenant, &execution_id) })
    }

    fn load_summaries(
        &self,
        tenant: &TenantContext,
        execution_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TestResultSummary>>> + Send + '_>> {
        let tenant = tenant.clone();
        let execution_id = execution_id.to_string();
        Box::pin(async move { self.load_summary_rows(&tenant, &execution_id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstractions::tenant::TenantId;
    use crate::engine::rollup;
    use std::collections::BTreeMap;

    fn tenant() -> TenantContext {
        TenantContext::new("tenant-1", "Tenant One")
    }

    fn execution() -> Execution {
        let mut execution = Execution::new(
            "exec-1",
            TenantId::new("tenant-1"),
            "plan-1",
            "abc123",
            1_700_000_000_000,
        );
        execution.started_at = Some(1_700_000_000_000);
        execution
    }

    fn bucket(number: u64) -> MetricsBucket {
        let mut status_codes = BTreeMap::new();
        status_codes.insert("200".to_string(), 3);
        status_codes.insert("503".to_string(), 1);
        MetricsBucket {
            execution_id: "exec-1".to_string(),
            bucket_number: number,
            start_time_ms: 1_700_000_000_000 + number * 5_000,
            end_time_ms: 1_700_000_000_000 + (number + 1) * 5_000,
            total_requests: 4,
            success_count: 3,
            failure_count: 1,
            success_rate: 0.75,
            latency: LatencyMetrics {
                min_ns: 1_000_000,
                avg_ns: 12_500_000,
                max_ns: 40_000_000,
                p50_ns: 10_000_000,
                p95_ns: 40_000_000,
                p99_ns: 40_000_000,
            },
            bytes_in: 400,
            bytes_out: 200,
            status_codes,
            errors: vec!["HTTP 503".to_string()],
        }
    }

    fn summary() -> TestResultSummary {
        TestResultSummary {
            execution_id: "exec-1".to_string(),
            test_id: "test-1".to_string(),
            metrics: SummaryMetrics {
                total_requests: 4,
                success_count: 3,
                failure_count: 1,
                success_rate: 0.75,
                ..SummaryMetrics::default()
            },
            request_metrics: vec![RequestMetricSummary {
                request_index: 0,
                metrics: SummaryMetrics::default(),
            }],
        }
    }

    #[test]
    fn execution_round_trips_with_rollup_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tenant = tenant();
        let mut execution = execution();
        store.insert_execution(&tenant, &execution).unwrap();

        rollup::apply(&mut execution, &summary(), 1_700_000_060_000).unwrap();
        store.update_execution(&tenant, &execution).unwrap();

        let loaded = store.load_execution(&tenant, "exec-1").unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.result_timestamp, Some(1_700_000_060_000));
        assert_eq!(loaded.metrics.as_ref().unwrap().total_requests, 4);
        assert_eq!(loaded.plan_hash, "abc123");
    }

    #[test]
    fn redelivered_bucket_is_a_no_op_overwrite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tenant = tenant();
        store.insert_execution(&tenant, &execution()).unwrap();

        let delivered = bucket(0);
        store.upsert_bucket(&tenant, &delivered).unwrap();
        store.upsert_bucket(&tenant, &delivered).unwrap();

        let series = store.load_bucket_series(&tenant, "exec-1").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0], delivered);
    }

    #[test]
    fn bucket_series_loads_in_number_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tenant = tenant();
        store.insert_execution(&tenant, &execution()).unwrap();

        store.upsert_bucket(&tenant, &bucket(2)).unwrap();
        store.upsert_bucket(&tenant, &bucket(0)).unwrap();
        store.upsert_bucket(&tenant, &bucket(1)).unwrap();

        let series = store.load_bucket_series(&tenant, "exec-1").unwrap();
        assert_eq!(
            series.iter().map(|b| b.bucket_number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn summaries_round_trip_with_children() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tenant = tenant();
        store.insert_execution(&tenant, &execution()).unwrap();

        let stored = summary();
        store.upsert_summary(&tenant, &stored).unwrap();

        let loaded = store.load_summary_rows(&tenant, "exec-1").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], stored);
    }

    #[test]
    fn rows_are_scoped_to_their_tenant() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = tenant();
        let other = TenantContext::new("tenant-2", "Tenant Two");
        store.insert_execution(&owner, &execution()).unwrap();
        store.upsert_bucket(&owner, &bucket(0)).unwrap();

        assert!(store.load_execution(&other, "exec-1").unwrap().is_none());
        assert!(store.load_bucket_series(&other, "exec-1").unwrap().is_empty());
        assert!(matches!(
            store.update_execution(&other, &execution()),
            Err(Error::ExecutionNotFound(_))
        ));
    }

    #[test]
    fn delete_cascades_to_buckets_and_summaries() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tenant = tenant();
        store.insert_execution(&tenant, &execution()).unwrap();
        store.upsert_bucket(&tenant, &bucket(0)).unwrap();
        store.upsert_summary(&tenant, &summary()).unwrap();

        assert!(store.delete_execution(&tenant, "exec-1").unwrap());
        assert!(store.load_execution(&tenant, "exec-1").unwrap().is_none());
        assert!(store.load_bucket_series(&tenant, "exec-1").unwrap().is_empty());
        assert!(store.load_summary_rows(&tenant, "exec-1").unwrap().is_empty());
        assert!(!store.delete_execution(&tenant, "exec-1").unwrap());
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadman.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let tenant = tenant();
            store.insert_execution(&tenant, &execution()).unwrap();
            store.upsert_bucket(&tenant, &bucket(0)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let series = store.load_bucket_series(&tenant(), "exec-1").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0], bucket(0));
    }

    #[tokio::test]
    async fn sink_trait_delegates_to_the_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tenant = tenant();
        store.insert_execution(&tenant, &execution()).unwrap();

        let sink: &dyn MetricsSink = &store;
        sink.publish_bucket(&tenant, &bucket(0)).await.unwrap();
        sink.publish_summary(&tenant, &summary()).await.unwrap();

        assert_eq!(sink.load_buckets(&tenant, "exec-1").await.unwrap().len(), 1);
        assert_eq!(
            sink.load_summaries(&tenant, "exec-1").await.unwrap().len(),
            1
        );
    }
}
