//! One-shot reconciliation run on process start, before the coordinator's
//! loops spin up. Treats every `running` task and every `processing` queue
//! item as orphaned by the previous process and walks them back to a state
//! a fresh coordinator can safely pick up from.

use anyhow::Result;
use chrono::{DateTime, Utc};

use orc_db::models::CheckpointType;
use orc_db::pool::OrcPool;
use orc_db::queries::{active_tasks, deployment_queue, task_checkpoints};

use crate::error::OrchestratorError;

const INTERRUPTED_MESSAGE: &str = "Deployment interrupted by system restart";
const STALE_HEARTBEAT_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct RecoveredTask {
    pub task_id: String,
    pub was_stale: bool,
    pub checkpoint_count: i64,
}

#[derive(Debug, Clone)]
pub struct RecoveredDeployment {
    pub queue_id: i64,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub paused_tasks: Vec<RecoveredTask>,
    pub failed_deployments: Vec<RecoveredDeployment>,
}

impl RecoveryReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("paused tasks: {}\n", self.paused_tasks.len()));
        for task in &self.paused_tasks {
            out.push_str(&format!(
                "  {} (stale={}, checkpoints={})\n",
                task.task_id, task.was_stale, task.checkpoint_count
            ));
        }
        out.push_str(&format!("failed deployments: {}\n", self.failed_deployments.len()));
        for dep in &self.failed_deployments {
            out.push_str(&format!("  #{} (retryable={})\n", dep.queue_id, dep.retryable));
        }
        out
    }
}

pub struct StartupRecovery {
    pool: OrcPool,
}

impl StartupRecovery {
    pub fn new(pool: OrcPool) -> Self {
        Self { pool }
    }

    /// Mutating pass: pauses every running task (with a `recovery`
    /// checkpoint when it has state to preserve) and fails every
    /// in-flight deployment. Idempotent -- a database with nothing running
    /// or processing is left untouched.
    pub async fn recover_interrupted_tasks(&self, now: DateTime<Utc>) -> Result<RecoveryReport, OrchestratorError> {
        let running = active_tasks::list_running_tasks(&self.pool)
            .await
            .map_err(OrchestratorError::Database)?;

        let stale_cutoff = now - chrono::Duration::seconds(STALE_HEARTBEAT_SECS);

        for task in &running {
            if let Some(state) = &task.current_state {
                task_checkpoints::insert_checkpoint(
                    &self.pool,
                    &task.task_id,
                    state,
                    CheckpointType::Recovery,
                    None,
                    now,
                )
                .await
                .map_err(OrchestratorError::Database)?;
            }

            let was_stale = task.last_heartbeat < stale_cutoff;
            tracing::warn!(task_id = %task.task_id, was_stale, "pausing task orphaned by restart");

            active_tasks::force_pause(&self.pool, &task.task_id)
                .await
                .map_err(OrchestratorError::Database)?;
        }

        let failed_count = deployment_queue::fail_all_processing(&self.pool, now, INTERRUPTED_MESSAGE)
            .await
            .map_err(OrchestratorError::Database)?;
        tracing::warn!(failed_count, "failed deployments interrupted by restart");

        self.get_recovery_report().await
    }

    /// Read-only snapshot of current paused-task and failed-deployment
    /// state. Re-runnable at any time; does not mutate anything.
    pub async fn get_recovery_report(&self) -> Result<RecoveryReport, OrchestratorError> {
        let paused = active_tasks::list_paused_tasks(&self.pool)
            .await
            .map_err(OrchestratorError::Database)?;

        let mut paused_tasks = Vec::with_capacity(paused.len());
        let stale_cutoff = Utc::now() - chrono::Duration::seconds(STALE_HEARTBEAT_SECS);
        for task in paused {
            let checkpoints = task_checkpoints::list_active_checkpoints(&self.pool, &task.task_id, i64::MAX)
                .await
                .map_err(OrchestratorError::Database)?;
            paused_tasks.push(RecoveredTask {
                task_id: task.task_id.clone(),
                was_stale: task.last_heartbeat < stale_cutoff,
                checkpoint_count: checkpoints.len() as i64,
            });
        }

        let failed = deployment_queue::list_all(&self.pool)
            .await
            .map_err(OrchestratorError::Database)?
            .into_iter()
            .filter(|item| item.status == orc_db::models::QueueStatus::Failed)
            .map(|item| RecoveredDeployment {
                queue_id: item.id,
                retryable: item.retry_count < item.max_retries,
            })
            .collect();

        Ok(RecoveryReport {
            paused_tasks,
            failed_deployments: failed,
        })
    }

    /// Purges inactive checkpoints older than `retention_days`.
    pub async fn cleanup_old_checkpoints(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, OrchestratorError> {
        let cutoff = now - chrono::Duration::days(retention_days);
        task_checkpoints::cleanup_old_checkpoints(&self.pool, cutoff)
            .await
            .map_err(OrchestratorError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_renders_counts() {
        let report = RecoveryReport {
            paused_tasks: vec![RecoveredTask {
                task_id: "t1".into(),
                was_stale: true,
                checkpoint_count: 2,
            }],
            failed_deployments: vec![RecoveredDeployment {
                queue_id: 7,
                retryable: true,
            }],
        };
        let rendered = report.render();
        assert!(rendered.contains("paused tasks: 1"));
        assert!(rendered.contains("failed deployments: 1"));
    }
}
