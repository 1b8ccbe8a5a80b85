use crate::abstractions::tenant::TenantId;
use crate::domain::metrics_types::SummaryMetrics;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Execution Plan Types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequestSnapshot {
    pub test_id: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlanSnapshot {
    pub plan_id: String,
    pub name: String,
    pub requests: Vec<TestRequestSnapshot>,
}

impl ExecutionPlanSnapshot {
    /// Fingerprint of the serialized plan, stored with the execution so a
    /// re-uploaded result can be matched to the exact plan it ran against.
    pub fn fingerprint(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{:x}", md5::compute(json.as_bytes())))
    }
}

// ─── Aggregation Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    /// Width of one metrics bucket window in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Maximum distinct error strings retained per bucket; first seen wins.
    #[serde(default = "default_bucket_error_cap")]
    pub bucket_error_cap: usize,
    /// Maximum error samples retained on a summary, ranked by count.
    #[serde(default = "default_error_sample_top_k")]
    pub error_sample_top_k: usize,
}

fn default_window_ms() -> u64 {
    5_000
}

fn default_bucket_error_cap() -> usize {
    16
}

fn default_error_sample_top_k() -> usize {
    10
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            bucket_error_cap: default_bucket_error_cap(),
            error_sample_top_k: default_error_sample_top_k(),
        }
    }
}

// ─── Execution ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> ExecutionStatus {
        match value {
            "running" => ExecutionStatus::Running,
            "completed" => ExecutionStatus::Completed,
            "cancelled" => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One run of a load test against an execution plan. Owns the buckets and
/// summaries produced for it; owned by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,
    pub tenant_id: TenantId,
    pub plan_id: String,
    pub plan_hash: String,
    pub status: ExecutionStatus,
    pub created_at: u64,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub result_timestamp: Option<u64>,
    /// Execution-level rollup; mirrors the most recently applied summary.
    #[serde(default)]
    pub metrics: Option<SummaryMetrics>,
}

impl Execution {
    pub fn new(
        execution_id: impl Into<String>,
        tenant_id: TenantId,
        plan_id: impl Into<String>,
        plan_hash: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            tenant_id,
            plan_id: plan_id.into(),
            plan_hash: plan_hash.into(),
            status: ExecutionStatus::Running,
            created_at,
            started_at: None,
            result_timestamp: None,
            metrics: None,
        }
    }
}
