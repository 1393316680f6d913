//! Runs the two background loops that drain the deployment queue and fire
//! due scheduled jobs. Modeled on a spawn-plus-cancellation-token loop: each
//! loop catches every error at its top level, logs, and continues after its
//! poll interval -- nothing is allowed to unwind out of a `tokio::spawn`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use orc_db::models::JobStatus;
use orc_db::pool::OrcPool;
use orc_db::queries::scheduled_jobs;

use crate::callbacks::{DeploymentExecutor, JobExecutor, NotificationHandler};
use crate::config::OrcConfig;
use crate::error::OrchestratorError;
use crate::queue_manager::{ProceedCheck, QueueManager};
use crate::task_tracker::TaskTracker;

/// Parses a cron expression, accepting the standard five-field form by
/// prepending a `0` seconds field before handing it to the `cron` crate.
fn parse_cron(expression: &str) -> Result<Schedule, OrchestratorError> {
    let normalized = format!("0 {expression}");
    normalized
        .parse::<Schedule>()
        .map_err(|e| OrchestratorError::InvalidCronExpression(expression.to_string(), e.to_string()))
}

/// Smallest fire time strictly greater than `anchor`, or `None` if the
/// expression has no future occurrence (never happens in practice for a
/// valid standard cron expression, but the contract allows it).
fn next_fire_after(expression: &str, anchor: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, OrchestratorError> {
    let schedule = parse_cron(expression)?;
    Ok(schedule.after(&anchor).next())
}

pub struct Coordinator {
    pool: OrcPool,
    config: OrcConfig,
    queue: Arc<QueueManager>,
    tasks: Arc<TaskTracker>,
    deployment_executor: Option<Arc<dyn DeploymentExecutor>>,
    job_executor: Option<Arc<dyn JobExecutor>>,
    notifier: Option<Arc<dyn NotificationHandler>>,
    cancel: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        pool: OrcPool,
        config: OrcConfig,
        queue: Arc<QueueManager>,
        tasks: Arc<TaskTracker>,
    ) -> Self {
        Self {
            pool,
            config,
            queue,
            tasks,
            deployment_executor: None,
            job_executor: None,
            notifier: None,
            cancel: CancellationToken::new(),
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_deployment_executor(mut self, executor: Arc<dyn DeploymentExecutor>) -> Self {
        self.deployment_executor = Some(executor);
        self
    }

    pub fn with_job_executor(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.job_executor = Some(executor);
        self
    }

    pub fn with_notification_handler(mut self, notifier: Arc<dyn NotificationHandler>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    async fn notify(&self, user_id: &str, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(user_id, message).await;
        }
    }

    /// Validates `cron_expression`, then registers the job disabled-to-run
    /// until its first `next_run` is computed from `now`.
    pub async fn register_job(
        &self,
        job_id: &str,
        job_name: &str,
        cron_expression: &str,
        auto_resume: bool,
        now: DateTime<Utc>,
    ) -> Result<orc_db::models::ScheduledJob, OrchestratorError> {
        let next_run = next_fire_after(cron_expression, now)?;
        scheduled_jobs::insert_job(
            &self.pool,
            job_id,
            job_name,
            cron_expression,
            next_run,
            auto_resume,
            now,
        )
        .await
        .map_err(OrchestratorError::Database)
    }

    /// Idempotent: calling `start` while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().expect("coordinator handle lock poisoned");
        if !handles.is_empty() {
            return;
        }

        let queue_loop = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_queue_loop().await })
        };
        let scheduler_loop = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_scheduler_loop().await })
        };

        handles.push(queue_loop);
        handles.push(scheduler_loop);
    }

    /// Idempotent: calling `stop` when not running is a no-op. Joins both
    /// loops with a bounded timeout; in-flight executor calls are allowed to
    /// finish but are not preempted.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("coordinator handle lock poisoned");
            std::mem::take(&mut *guard)
        };

        for handle in handles {
            if tokio::time::timeout(Duration::from_secs(15), handle).await.is_err() {
                tracing::warn!("coordinator loop did not exit within the shutdown deadline");
            }
        }
    }

    async fn run_queue_loop(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            if let Err(e) = self.queue_tick().await {
                tracing::error!(error = %e, "queue loop iteration failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.queue_poll_interval) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Runs one iteration of the queue loop's body outside of the spawned
    /// loop, for callers (tests, `orc queue drain`-style tooling) that need
    /// deterministic single-step control instead of waiting on the poll
    /// interval.
    pub async fn run_one_queue_tick(&self) -> Result<(), OrchestratorError> {
        self.queue_tick().await
    }

    async fn queue_tick(&self) -> Result<(), OrchestratorError> {
        let now = Utc::now();

        let Some(item) = self.queue.get_next_pending(now).await? else {
            return Ok(());
        };

        match self.queue.check_can_proceed(item.id).await? {
            ProceedCheck::Proceed => {}
            ProceedCheck::WaitingForWorkers | ProceedCheck::NotPending | ProceedCheck::Missing => {
                return Ok(());
            }
        }

        self.queue.mark_processing(item.id, now).await?;
        if let Some(user) = &item.requested_by {
            self.notify(
                user,
                &format!("Deployment started: {} on {}", item.deployment_type, item.target_service),
            )
            .await;
        }

        if item.requires_state_pause {
            let paused = self.tasks.pause_all_active(now).await?;
            tracing::info!(queue_id = item.id, paused, "paused active tasks before destructive deployment");
        }

        let result = match &self.deployment_executor {
            Some(executor) => executor.execute(&item).await,
            None => Err(anyhow::Error::from(OrchestratorError::ExecutorNotConfigured)),
        };

        let finish_now = Utc::now();
        match result {
            Ok(()) => {
                self.queue.mark_completed(item.id, finish_now).await?;
                if let Some(user) = &item.requested_by {
                    self.notify(
                        user,
                        &format!("Deployment completed: {} on {}", item.deployment_type, item.target_service),
                    )
                    .await;
                }
            }
            Err(e) => {
                tracing::error!(queue_id = item.id, error = %e, "deployment executor failed");
                self.queue.mark_failed(item.id, finish_now, &e.to_string()).await?;
                if let Some(user) = &item.requested_by {
                    self.notify(
                        user,
                        &format!("Deployment failed: {} on {}: {e}", item.deployment_type, item.target_service),
                    )
                    .await;
                }
            }
        }

        if item.requires_state_pause {
            let resumed = self.tasks.resume_all_paused().await?;
            tracing::info!(queue_id = item.id, resumed, "resumed active tasks after deployment");
        }

        Ok(())
    }

    async fn run_scheduler_loop(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            if let Err(e) = self.scheduler_tick().await {
                tracing::error!(error = %e, "scheduler loop iteration failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.scheduler_poll_interval) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Runs one iteration of the scheduler loop's body. See
    /// [`run_one_queue_tick`](Self::run_one_queue_tick) for why this is
    /// exposed alongside the spawned loop.
    pub async fn run_one_scheduler_tick(&self) -> Result<(), OrchestratorError> {
        self.scheduler_tick().await
    }

    async fn scheduler_tick(&self) -> Result<(), OrchestratorError> {
        let now = Utc::now();
        let due = scheduled_jobs::list_due_jobs(&self.pool, now)
            .await
            .map_err(OrchestratorError::Database)?;

        for job in due {
            if !scheduled_jobs::claim_for_run(&self.pool, &job.job_id, now)
                .await
                .map_err(OrchestratorError::Database)?
            {
                continue;
            }

            let restored_state = if job.auto_resume {
                match job.last_checkpoint_id {
                    Some(checkpoint_id) => {
                        orc_db::queries::task_checkpoints::get_checkpoint(&self.pool, checkpoint_id)
                            .await
                            .map_err(OrchestratorError::Database)?
                            .map(|c| c.serialized_state)
                    }
                    None => None,
                }
            } else {
                None
            };

            let result = match &self.job_executor {
                Some(executor) => executor.execute(&job, restored_state.as_deref()).await,
                None => Err(anyhow::anyhow!("no job executor configured")),
            };

            let status = match &result {
                Ok(()) => JobStatus::Success,
                Err(e) => {
                    tracing::error!(job_id = %job.job_id, error = %e, "scheduled job failed");
                    JobStatus::Failed
                }
            };

            let next_run = match next_fire_after(&job.cron_expression, now) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, error = %e, "invalid cron at schedule time, suspending job");
                    None
                }
            };

            scheduled_jobs::finish_run(&self.pool, &job.job_id, status, next_run, job.last_checkpoint_id, Utc::now())
                .await
                .map_err(OrchestratorError::Database)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_expression_normalizes_and_parses() {
        let anchor: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let next = next_fire_after("0 2 * * *", anchor).unwrap();
        assert_eq!(next.unwrap().to_rfc3339(), "2026-01-01T02:00:00+00:00");
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let anchor: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        assert!(next_fire_after("not a cron expr", anchor).is_err());
    }

    #[test]
    fn next_fire_is_strictly_after_anchor() {
        let anchor: DateTime<Utc> = "2026-01-01T02:00:00Z".parse().unwrap();
        let next = next_fire_after("0 2 * * *", anchor).unwrap().unwrap();
        assert_eq!(next.to_rfc3339(), "2026-01-02T02:00:00+00:00");
    }
}
