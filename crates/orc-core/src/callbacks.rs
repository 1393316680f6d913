//! Injection points the core is wired up with: it has no wire protocol of
//! its own, only these process-local callbacks.

use anyhow::Result;
use async_trait::async_trait;

use orc_db::models::{DeploymentQueue, ScheduledJob};

/// Runs a queued deployment. Implementations return `Err` on failure; the
/// coordinator captures the message and writes it to `error_message`.
#[async_trait]
pub trait DeploymentExecutor: Send + Sync {
    async fn execute(&self, item: &DeploymentQueue) -> Result<()>;
}

/// Runs a due scheduled job. `restored_state` carries the checkpoint payload
/// when the job has `auto_resume` set and a prior checkpoint exists.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &ScheduledJob, restored_state: Option<&str>) -> Result<()>;
}

/// Fire-and-forget delivery to an external chat/alerting channel.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn notify(&self, user_id: &str, message: &str);
}

/// Returns the number of currently-running `ActiveTask` rows.
///
/// Decouples the Queue Manager from the Task Tracker; the Facade wires the
/// concrete Task Tracker instance in as this callback. Nullable in the
/// Queue Manager -- falls back to a direct `active_tasks` count query.
#[async_trait]
pub trait WorkerCountCallback: Send + Sync {
    async fn active_worker_count(&self) -> Result<i64>;
}
