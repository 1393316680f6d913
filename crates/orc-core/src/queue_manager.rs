//! Priority queue of requested deployments, gated on live worker count.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use orc_db::models::{DeploymentQueue, DeploymentType, QueuePriority, QueueStatus};
use orc_db::pool::OrcPool;
use orc_db::queries::{deployment_queue, notification_log};

use crate::callbacks::{NotificationHandler, WorkerCountCallback};
use crate::error::OrchestratorError;

/// Deployment types that invalidate in-process state and require tasks to
/// checkpoint and pause before the executor runs.
pub const DESTRUCTIVE_ACTIONS: [DeploymentType; 2] =
    [DeploymentType::Redeploy, DeploymentType::Restart];

/// Outcome of [`QueueManager::check_can_proceed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProceedCheck {
    Proceed,
    Missing,
    NotPending,
    WaitingForWorkers,
}

pub struct QueueManager {
    pool: OrcPool,
    max_retries: i32,
    worker_count: Option<Arc<dyn WorkerCountCallback>>,
    notifier: Option<Arc<dyn NotificationHandler>>,
}

impl QueueManager {
    pub fn new(pool: OrcPool, max_retries: i32) -> Self {
        Self {
            pool,
            max_retries,
            worker_count: None,
            notifier: None,
        }
    }

    /// Wire in a callback for the live worker count. Without one,
    /// `check_can_proceed` falls back to a direct `active_tasks` count query.
    pub fn with_worker_count_callback(mut self, callback: Arc<dyn WorkerCountCallback>) -> Self {
        self.worker_count = Some(callback);
        self
    }

    /// Wire in a notification callback. Without one, `add_to_queue` neither
    /// logs nor sends the `queue_added` notification.
    pub fn with_notification_handler(mut self, notifier: Arc<dyn NotificationHandler>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    async fn active_worker_count(&self) -> Result<i64, OrchestratorError> {
        match &self.worker_count {
            Some(cb) => cb.active_worker_count().await.map_err(OrchestratorError::Database),
            None => orc_db::queries::active_tasks::get_active_count(&self.pool)
                .await
                .map_err(OrchestratorError::Database),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_to_queue(
        &self,
        deployment_type: DeploymentType,
        target_service: &str,
        requested_by: Option<&str>,
        reason: Option<&str>,
        priority: Option<QueuePriority>,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DeploymentQueue, OrchestratorError> {
        let is_destructive = deployment_type.is_destructive();
        let priority = priority.unwrap_or(if is_destructive {
            QueuePriority::High
        } else {
            QueuePriority::Normal
        });

        let item = deployment_queue::insert_queue_item(
            &self.pool,
            deployment_type,
            target_service,
            priority,
            requested_by,
            reason,
            scheduled_at,
            now,
            self.max_retries,
        )
        .await
        .map_err(OrchestratorError::Database)?;

        if is_destructive {
            if let Some(notifier) = &self.notifier {
                let user = requested_by.unwrap_or("system");
                let message = format!(
                    "Deployment queued: {deployment_type} on {target_service} (priority {priority})"
                );
                notification_log::insert_notification(&self.pool, user, None, "queue_added", &message, now)
                    .await
                    .map_err(OrchestratorError::Database)?;
                notifier.notify(user, &message).await;
            }
        }

        Ok(item)
    }

    /// Selects the next candidate: status=pending, `scheduled_at` arrived.
    /// Ordering (priority DESC, created_at DESC) happens in memory so the
    /// tie-break stays stable across SQL dialects.
    pub async fn get_next_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DeploymentQueue>, OrchestratorError> {
        let mut candidates = deployment_queue::list_pending_candidates(&self.pool, now)
            .await
            .map_err(OrchestratorError::Database)?;

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(candidates.into_iter().next())
    }

    pub async fn get_queue_status(&self) -> Result<Vec<DeploymentQueue>, OrchestratorError> {
        let mut items = deployment_queue::list_all(&self.pool)
            .await
            .map_err(OrchestratorError::Database)?;

        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(items)
    }

    pub async fn mark_processing(
        &self,
        queue_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let ok = deployment_queue::set_processing(&self.pool, queue_id, now)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::QueueItemNotFound(queue_id));
        }
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        queue_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let ok = deployment_queue::set_completed(&self.pool, queue_id, now)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::QueueItemNotFound(queue_id));
        }
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        queue_id: i64,
        now: DateTime<Utc>,
        error_message: &str,
    ) -> Result<(), OrchestratorError> {
        let ok = deployment_queue::set_failed(&self.pool, queue_id, now, error_message)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::QueueItemNotFound(queue_id));
        }
        Ok(())
    }

    /// Honored only while the item is not already `processing`.
    pub async fn cancel_queue_item(
        &self,
        queue_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let item = deployment_queue::get_queue_item(&self.pool, queue_id)
            .await
            .map_err(OrchestratorError::Database)?
            .ok_or(OrchestratorError::QueueItemNotFound(queue_id))?;

        if item.status == QueueStatus::Processing {
            return Err(OrchestratorError::Database(anyhow::anyhow!(
                "queue item {queue_id} is already processing and cannot be cancelled"
            )));
        }

        let ok = deployment_queue::set_cancelled(&self.pool, queue_id, now)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::QueueItemNotFound(queue_id));
        }
        Ok(())
    }

    /// Returns whether `queue_id` may proceed to `processing`. When it is
    /// destructive and workers are active, the item is moved to
    /// `waiting_for_workers` as a side effect.
    pub async fn check_can_proceed(&self, queue_id: i64) -> Result<ProceedCheck, OrchestratorError> {
        let item = match deployment_queue::get_queue_item(&self.pool, queue_id)
            .await
            .map_err(OrchestratorError::Database)?
        {
            Some(item) => item,
            None => return Ok(ProceedCheck::Missing),
        };

        if item.status != QueueStatus::Pending && item.status != QueueStatus::WaitingForWorkers {
            return Ok(ProceedCheck::NotPending);
        }

        if item.requires_state_pause {
            let workers = self.active_worker_count().await?;
            if workers > 0 {
                deployment_queue::set_waiting_for_workers(&self.pool, queue_id)
                    .await
                    .map_err(OrchestratorError::Database)?;
                return Ok(ProceedCheck::WaitingForWorkers);
            }
        }

        if item.status == QueueStatus::WaitingForWorkers {
            deployment_queue::set_pending(&self.pool, queue_id)
                .await
                .map_err(OrchestratorError::Database)?;
        }

        Ok(ProceedCheck::Proceed)
    }

    /// Resets every failed, retry-eligible row to pending in one statement.
    /// Purely operator-triggered, never called by a background loop.
    pub async fn retry_failed_items(&self) -> Result<u64, OrchestratorError> {
        deployment_queue::retry_all_failed(&self.pool)
            .await
            .map_err(OrchestratorError::Database)
    }

    /// Single-item variant of [`retry_failed_items`](Self::retry_failed_items).
    pub async fn retry_deployment(&self, queue_id: i64) -> Result<(), OrchestratorError> {
        let ok = deployment_queue::retry_queue_item(&self.pool, queue_id)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::QueueItemNotFound(queue_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a real backend in orc-core's integration tests;
    // see `tests/queue_manager_test.rs`.
}
