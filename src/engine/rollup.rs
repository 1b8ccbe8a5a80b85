use crate::domain::{Execution, ExecutionStatus, TestResultSummary};
use crate::error::{Error, Result};

/// Copy a summary's metric fields onto the execution and complete it.
///
/// Repeated application is last-write-wins: the execution's own fields mirror
/// the most recently applied summary, while per-request truth stays on the
/// child summaries. Only `running` and `completed` executions accept results.
pub fn apply(
    execution: &mut Execution,
    summary: &TestResultSummary,
    result_timestamp_ms: u64,
) -> Result<()> {
    match execution.status {
        ExecutionStatus::Running | ExecutionStatus::Completed => {
            execution.metrics = Some(summary.metrics.clone());
            execution.status = ExecutionStatus::Completed;
            execution.result_timestamp = Some(result_timestamp_ms);
            Ok(())
        }
        from => Err(Error::InvalidTransition {
            from,
            to: ExecutionStatus::Completed,
        }),
    }
}

/// Mark a running execution failed; used when result ingestion cannot
/// complete. Terminal states never transition again.
pub fn mark_failed(execution: &mut Execution) -> Result<()> {
    transition(execution, ExecutionStatus::Failed)
}

/// Mark a running execution cancelled after a mid-run abort.
pub fn mark_cancelled(execution: &mut Execution) -> Result<()> {
    transition(execution, ExecutionStatus::Cancelled)
}

fn transition(execution: &mut Execution, to: ExecutionStatus) -> Result<()> {
    if execution.status != ExecutionStatus::Running {
        return Err(Error::InvalidTransition {
            from: execution.status,
            to,
        });
    }
    execution.status = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstractions::tenant::TenantId;
    use crate::domain::SummaryMetrics;

    fn execution() -> Execution {
        Execution::new(
            "exec-1",
            TenantId::new("tenant-1"),
            "plan-1",
            "abc123",
            1_700_000_000_000,
        )
    }

    fn summary(total_requests: u64) -> TestResultSummary {
        TestResultSummary {
            execution_id: "exec-1".to_string(),
            test_id: "test-1".to_string(),
            metrics: SummaryMetrics {
                total_requests,
                ..SummaryMetrics::default()
            },
            request_metrics: Vec::new(),
        }
    }

    #[test]
    fn first_result_completes_the_execution() {
        let mut execution = execution();
        apply(&mut execution, &summary(10), 1_700_000_100_000).unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.result_timestamp, Some(1_700_000_100_000));
        assert_eq!(execution.metrics.as_ref().unwrap().total_requests, 10);
    }

    #[test]
    fn reapplied_result_is_last_write_wins() {
        let mut execution = execution();
        apply(&mut execution, &summary(10), 1_700_000_100_000).unwrap();
        apply(&mut execution, &summary(25), 1_700_000_200_000).unwrap();

        assert_eq!(execution.metrics.as_ref().unwrap().total_requests, 25);
        assert_eq!(execution.result_timestamp, Some(1_700_000_200_000));
    }

    #[test]
    fn failed_execution_rejects_results() {
        let mut execution = execution();
        mark_failed(&mut execution).unwrap();

        let result = apply(&mut execution, &summary(10), 1_700_000_100_000);
        assert!(matches!(
            result,
            Err(Error::InvalidTransition {
                from: ExecutionStatus::Failed,
                to: ExecutionStatus::Completed,
            })
        ));
        assert!(execution.metrics.is_none());
    }

    #[test]
    fn terminal_states_never_transition_again() {
        let mut execution = execution();
        mark_cancelled(&mut execution).unwrap();
        assert!(mark_failed(&mut execution).is_err());
        assert!(mark_cancelled(&mut execution).is_err());
        assert_eq!(execution.status, ExecutionStatus::Cancelled);

        let mut execution = self::execution();
        apply(&mut execution, &summary(1), 1).unwrap();
        assert!(mark_failed(&mut execution).is_err());
        assert!(mark_cancelled(&mut execution).is_err());
    }
}
