//! Singleton entry point wiring the Task Tracker, Queue Manager, Coordinator
//! and Startup Recovery together behind one surface. A caller is expected to
//! construct one `Orchestrator` per process and hold it for the process
//! lifetime; nothing here enforces that as a true global.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use orc_db::models::{ActiveTask, CheckpointType, DeploymentQueue, DeploymentType, QueuePriority, ScheduledJob, TaskCheckpoint};
use orc_db::pool::OrcPool;

use crate::callbacks::{DeploymentExecutor, JobExecutor, NotificationHandler};
use crate::config::OrcConfig;
use crate::coordinator::Coordinator;
use crate::error::OrchestratorError;
use crate::queue_manager::{ProceedCheck, QueueManager};
use crate::startup_recovery::{RecoveryReport, StartupRecovery};
use crate::task_tracker::TaskTracker;

pub struct Orchestrator {
    pool: OrcPool,
    tasks: Arc<TaskTracker>,
    queue: Arc<QueueManager>,
    recovery: Arc<StartupRecovery>,
    coordinator: Arc<Coordinator>,
    config: OrcConfig,
}

/// Collects injection points before the Coordinator (and the loops it owns)
/// come into existence. Keeping the builder separate from `Orchestrator`
/// means `with_*` never has to reach inside an already-shared `Arc`.
pub struct OrchestratorBuilder {
    pool: OrcPool,
    config: OrcConfig,
    deployment_executor: Option<Arc<dyn DeploymentExecutor>>,
    job_executor: Option<Arc<dyn JobExecutor>>,
    notification_handler: Option<Arc<dyn NotificationHandler>>,
}

impl OrchestratorBuilder {
    pub fn new(pool: OrcPool, config: OrcConfig) -> Self {
        Self {
            pool,
            config,
            deployment_executor: None,
            job_executor: None,
            notification_handler: None,
        }
    }

    /// Required before [`Orchestrator::start`]: without an executor the
    /// queue loop cannot advance any item past `processing`.
    pub fn with_deployment_executor(mut self, executor: Arc<dyn DeploymentExecutor>) -> Self {
        self.deployment_executor = Some(executor);
        self
    }

    pub fn with_job_executor(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.job_executor = Some(executor);
        self
    }

    pub fn with_notification_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.notification_handler = Some(handler);
        self
    }

    /// Wires the Task Tracker in as the Queue Manager's worker-count
    /// callback, matching §9's "concrete wiring happens in the Facade" note.
    pub fn build(self) -> Orchestrator {
        let tasks = Arc::new(TaskTracker::new(self.pool.clone()));
        let mut queue_builder =
            QueueManager::new(self.pool.clone(), self.config.max_retries).with_worker_count_callback(tasks.clone());
        if let Some(handler) = &self.notification_handler {
            queue_builder = queue_builder.with_notification_handler(handler.clone());
        }
        let queue = Arc::new(queue_builder);
        let recovery = Arc::new(StartupRecovery::new(self.pool.clone()));
        let pool = self.pool.clone();

        let mut coordinator = Coordinator::new(self.pool, self.config, queue.clone(), tasks.clone());
        if let Some(executor) = self.deployment_executor {
            coordinator = coordinator.with_deployment_executor(executor);
        }
        if let Some(executor) = self.job_executor {
            coordinator = coordinator.with_job_executor(executor);
        }
        if let Some(handler) = self.notification_handler {
            coordinator = coordinator.with_notification_handler(handler);
        }

        Orchestrator {
            pool,
            tasks,
            queue,
            recovery,
            coordinator: Arc::new(coordinator),
            config: self.config,
        }
    }
}

impl Orchestrator {
    pub fn builder(pool: OrcPool, config: OrcConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(pool, config)
    }

    pub fn config(&self) -> &OrcConfig {
        &self.config
    }

    // -- Task Tracker surface ------------------------------------------

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
        self.tasks
            .register_task(task_id, task_type, subagent_name, project_id, description, initial_state, now)
            .await
    }

    pub async fn unregister_task(&self, task_id: &str, final_state: Option<&str>) -> Result<(), OrchestratorError> {
        self.tasks.unregister_task(task_id, final_state).await
    }

    pub async fn update_heartbeat(&self, task_id: &str, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        self.tasks.update_heartbeat(task_id, now).await
    }

    pub async fn update_progress(&self, task_id: &str, progress: i32) -> Result<(), OrchestratorError> {
        self.tasks.update_progress(task_id, progress).await
    }

    pub async fn update_state(&self, task_id: &str, state: &str) -> Result<(), OrchestratorError> {
        self.tasks.update_state(task_id, state).await
    }

    pub async fn get_task_state(&self, task_id: &str) -> Result<Option<String>, OrchestratorError> {
        self.tasks.get_task_state(task_id).await
    }

    pub async fn get_active_tasks(
        &self,
        project_id: Option<&str>,
        subagent_name: Option<&str>,
    ) -> Result<Vec<ActiveTask>, OrchestratorError> {
        self.tasks.get_active_tasks(project_id, subagent_name).await
    }

    pub async fn create_checkpoint(
        &self,
        task_id: &str,
        state: &str,
        checkpoint_type: CheckpointType,
        now: DateTime<Utc>,
    ) -> Result<TaskCheckpoint, OrchestratorError> {
        self.tasks.create_checkpoint(task_id, state, checkpoint_type, now).await
    }

    /// Returns `false` (no error) if the task was not running at the time of
    /// the call -- an expected outcome for an operator racing the coordinator.
    pub async fn pause_task(&self, task_id: &str, now: DateTime<Utc>) -> Result<bool, OrchestratorError> {
        self.tasks.pause_task(task_id, now).await
    }

    /// Returns `false` (no error) if the task was not paused at the time of
    /// the call.
    pub async fn resume_task(&self, task_id: &str) -> Result<bool, OrchestratorError> {
        self.tasks.resume_task(task_id).await
    }

    // -- Queue Manager surface -------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn queue_deployment(
        &self,
        deployment_type: DeploymentType,
        target_service: &str,
        requested_by: Option<&str>,
        reason: Option<&str>,
        priority: Option<QueuePriority>,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DeploymentQueue, OrchestratorError> {
        self.queue
            .add_to_queue(deployment_type, target_service, requested_by, reason, priority, scheduled_at, now)
            .await
    }

    pub async fn get_queue_status(&self) -> Result<Vec<DeploymentQueue>, OrchestratorError> {
        self.queue.get_queue_status().await
    }

    pub async fn cancel_queue_item(&self, queue_id: i64, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        self.queue.cancel_queue_item(queue_id, now).await
    }

    pub async fn retry_failed_items(&self) -> Result<u64, OrchestratorError> {
        self.queue.retry_failed_items().await
    }

    pub async fn retry_deployment(&self, queue_id: i64) -> Result<(), OrchestratorError> {
        self.queue.retry_deployment(queue_id).await
    }

    pub async fn check_can_proceed(&self, queue_id: i64) -> Result<ProceedCheck, OrchestratorError> {
        self.queue.check_can_proceed(queue_id).await
    }

    // -- Scheduled Job Engine surface ------------------------------------

    pub async fn register_scheduled_job(
        &self,
        job_id: &str,
        job_name: &str,
        cron_expression: &str,
        auto_resume: bool,
        now: DateTime<Utc>,
    ) -> Result<ScheduledJob, OrchestratorError> {
        self.coordinator.register_job(job_id, job_name, cron_expression, auto_resume, now).await
    }

    pub async fn list_scheduled_jobs(&self) -> Result<Vec<ScheduledJob>, OrchestratorError> {
        orc_db::queries::scheduled_jobs::list_jobs(&self.pool)
            .await
            .map_err(OrchestratorError::Database)
    }

    pub async fn toggle_scheduled_job(&self, job_id: &str, enabled: bool, now: DateTime<Utc>) -> Result<(), OrchestratorError> {
        let ok = orc_db::queries::scheduled_jobs::set_enabled(&self.pool, job_id, enabled, now)
            .await
            .map_err(OrchestratorError::Database)?;
        if !ok {
            return Err(OrchestratorError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    // -- Startup Recovery surface -----------------------------------------

    pub async fn recover_interrupted_tasks(&self, now: DateTime<Utc>) -> Result<RecoveryReport, OrchestratorError> {
        self.recovery.recover_interrupted_tasks(now).await
    }

    pub async fn get_recovery_report(&self) -> Result<RecoveryReport, OrchestratorError> {
        self.recovery.get_recovery_report().await
    }

    pub async fn cleanup_old_checkpoints(&self, retention_days: i64, now: DateTime<Utc>) -> Result<u64, OrchestratorError> {
        self.recovery.cleanup_old_checkpoints(retention_days, now).await
    }

    // -- Coordinator lifecycle -------------------------------------------

    pub fn start(&self) {
        self.coordinator.start();
    }

    pub async fn stop(&self) {
        self.coordinator.stop().await;
    }

    /// Deterministic single-step variant of the queue loop body, for tests
    /// and tooling that can't wait on the poll interval.
    pub async fn run_one_queue_tick(&self) -> Result<(), OrchestratorError> {
        self.coordinator.run_one_queue_tick().await
    }

    /// Deterministic single-step variant of the scheduler loop body.
    pub async fn run_one_scheduler_tick(&self) -> Result<(), OrchestratorError> {
        self.coordinator.run_one_scheduler_tick().await
    }
}
