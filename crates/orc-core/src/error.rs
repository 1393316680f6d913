//! Typed errors callers branch on, distinct from the `anyhow::Result` used
//! internally for plumbing database failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task {0:?} is already registered")]
    DuplicateTask(String),

    #[error("task {0:?} not found")]
    TaskNotFound(String),

    #[error("queue item {0} not found")]
    QueueItemNotFound(i64),

    #[error("scheduled job {0:?} not found")]
    JobNotFound(String),

    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCronExpression(String, String),

    #[error("deployment executor not configured")]
    ExecutorNotConfigured,

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}
