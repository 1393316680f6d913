//! Durable registry of active work: heartbeats, progress, checkpoints,
//! pause/resume. Every public operation runs as one or more statements
//! against the pool directly; there is no client-side locking beyond what
//! each query's `WHERE` clause enforces optimistically.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use orc_db::models::{ActiveTask, CheckpointType, TaskCheckpoint, TaskStatus};
use orc_db::pool::OrcPool;
use orc_db::queries::{active_tasks, task_checkpoints};

use crate::callbacks::WorkerCountCallback;
use crate::error::OrchestratorError;

pub struct TaskTracker {
    pool: OrcPool,
}

impl TaskTracker {
    pub fn new(pool: OrcPool) -> Self {
        Self { pool }
    }

    pub async fn check_task_exists(&self, task_id: &str) -> Result<bool, OrchestratorError> {
        active_tasks::check_task_exists(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn register_task(
        &self,
        task_id: &str,
        task_type: &str,
        subagent_name: &str,
        project_id: Option<&str>,
        description: Option<&str>,
        initial_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ActiveTask, OrchestratorError> {
        if self.check_task_exists(task_id).await? {
            return Err(OrchestratorError::DuplicateTask(task_id.to_string()));
        }

        active_tasks::insert_active_task(
            &self.pool,
            task_id,
            task_type,
            subagent_name,
            now,
            project_id,
            description,
            initial_state,
        )
        .await
        .map_err(OrchestratorError::Database)
    }

    pub async fn unregister_task(
        &self,
        task_id: &str,
        final_state: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let ok = active_tasks::unregister_task(&self.pool, task_id, final_state)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    pub async fn update_heartbeat(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let ok = active_tasks::update_heartbeat(&self.pool, task_id, now)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    pub async fn update_progress(
        &self,
        task_id: &str,
        progress: i32,
    ) -> Result<(), OrchestratorError> {
        let ok = active_tasks::update_progress(&self.pool, task_id, progress)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    pub async fn update_state(&self, task_id: &str, state: &str) -> Result<(), OrchestratorError> {
        let ok = active_tasks::update_state(&self.pool, task_id, state)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    pub async fn get_task_state(&self, task_id: &str) -> Result<Option<String>, OrchestratorError> {
        let task = active_tasks::get_active_task(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        Ok(task.current_state)
    }

    pub async fn create_checkpoint(
        &self,
        task_id: &str,
        state: &str,
        checkpoint_type: CheckpointType,
        now: DateTime<Utc>,
    ) -> Result<TaskCheckpoint, OrchestratorError> {
        task_checkpoints::insert_checkpoint(&self.pool, task_id, state, checkpoint_type, None, now)
            .await
            .map_err(OrchestratorError::Database)
    }

    pub async fn get_latest_checkpoint(
        &self,
        task_id: &str,
    ) -> Result<Option<TaskCheckpoint>, OrchestratorError> {
        task_checkpoints::get_latest_active_checkpoint(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)
    }

    /// Valid only when the task is `running`. Writes a `pre_deploy`
    /// checkpoint iff `current_state` is set, then flips the row to
    /// `paused`. Returns `false` (without error) if the task was not
    /// running -- this is a normal, expected outcome for callers racing the
    /// coordinator.
    pub async fn pause_task(
        &self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, OrchestratorError> {
        let task = active_tasks::get_active_task(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;

        if task.status != TaskStatus::Running {
            return Ok(false);
        }

        if let Some(state) = &task.current_state {
            task_checkpoints::insert_checkpoint(
                &self.pool,
                task_id,
                state,
                CheckpointType::PreDeploy,
                None,
                now,
            )
            .await
            .map_err(OrchestratorError::Database)?;
        }

        active_tasks::set_paused(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)
    }

    /// Valid only when the task is `paused`. Restores `current_state` from
    /// the latest active checkpoint (if any) and deactivates it, then flips
    /// the row back to `running`.
    pub async fn resume_task(&self, task_id: &str) -> Result<bool, OrchestratorError> {
        let task = active_tasks::get_active_task(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;

        if task.status != TaskStatus::Paused {
            return Ok(false);
        }

        let checkpoint = task_checkpoints::get_latest_active_checkpoint(&self.pool, task_id)
            .await
            .map_err(OrchestratorError::Database)?;

        let restored = checkpoint.as_ref().map(|c| c.serialized_state.as_str());
        let ok = active_tasks::set_resumed(&self.pool, task_id, restored)
            .await
            .map_err(OrchestratorError::Database)?;

        if ok {
            if let Some(c) = checkpoint {
                task_checkpoints::deactivate_checkpoint(&self.pool, c.id)
                    .await
                    .map_err(OrchestratorError::Database)?;
            }
        }

        Ok(ok)
    }

    /// Bulk variant of [`pause_task`](Self::pause_task) over every running
    /// task. One transaction per task, matching `pause_task`'s own
    /// granularity (see §5) -- a partial failure leaves some tasks paused
    /// with a checkpoint and others untouched rather than rolling back the
    /// whole batch.
    pub async fn pause_all_active(&self, now: DateTime<Utc>) -> Result<i64, OrchestratorError> {
        let running = active_tasks::list_running_tasks(&self.pool)
            .await
            .map_err(OrchestratorError::Database)?;

        let mut paused = 0i64;
        for task in running {
            if self.pause_task(&task.task_id, now).await? {
                paused += 1;
            }
        }
        Ok(paused)
    }

    /// Bulk variant of [`resume_task`](Self::resume_task) over every paused
    /// task. Used by the coordinator to bring tasks back after a deployment
    /// finishes, win or lose.
    pub async fn resume_all_paused(&self) -> Result<i64, OrchestratorError> {
        let paused = active_tasks::list_paused_tasks(&self.pool)
            .await
            .map_err(OrchestratorError::Database)?;

        let mut resumed = 0i64;
        for task in paused {
            if self.resume_task(&task.task_id).await? {
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    pub async fn get_active_tasks(
        &self,
        project_id: Option<&str>,
        subagent_name: Option<&str>,
    ) -> Result<Vec<ActiveTask>, OrchestratorError> {
        active_tasks::list_active_tasks(&self.pool, project_id, subagent_name)
            .await
            .map_err(OrchestratorError::Database)
    }

    pub async fn get_active_count(&self) -> Result<i64, OrchestratorError> {
        active_tasks::get_active_count(&self.pool)
            .await
            .map_err(OrchestratorError::Database)
    }

    /// Transitions running tasks whose heartbeat predates `now - max_age` to
    /// `failed`. A heartbeat exactly at the boundary is considered fresh.
    pub async fn cleanup_stale_tasks(
        &self,
        max_heartbeat_age: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, OrchestratorError> {
        let cutoff = now - max_heartbeat_age;
        active_tasks::fail_stale_tasks(&self.pool, cutoff)
            .await
            .map_err(OrchestratorError::Database)
    }
}

#[async_trait]
impl WorkerCountCallback for TaskTracker {
    async fn active_worker_count(&self) -> Result<i64> {
        self.get_active_count().await.map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a real backend in orc-core's integration tests;
    // see `tests/task_tracker_test.rs`.
}
