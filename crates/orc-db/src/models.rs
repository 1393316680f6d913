use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{ColumnIndex, Row};

// ---------------------------------------------------------------------------
// Enums
//
// These are persisted as plain TEXT columns and read/written through
// Display/FromStr, not `#[derive(sqlx::Type)]`: the crate supports both
// Postgres and Sqlite through one `OrcPool` enum (see `pool.rs`), and a
// type-level enum mapping tied to one backend's native type system would not
// carry over to the other.
// ---------------------------------------------------------------------------

/// Kind of deployment action requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    Deploy,
    Redeploy,
    Restart,
    Scale,
    Rollback,
}

impl DeploymentType {
    /// Destructive actions invalidate in-process state and require tasks to
    /// checkpoint and pause before the deployment executor runs.
    pub fn is_destructive(self) -> bool {
        matches!(self, Self::Redeploy | Self::Restart)
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deploy => "deploy",
            Self::Redeploy => "redeploy",
            Self::Restart => "restart",
            Self::Scale => "scale",
            Self::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

impl FromStr for DeploymentType {
    type Err = DeploymentTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(Self::Deploy),
            "redeploy" => Ok(Self::Redeploy),
            "restart" => Ok(Self::Restart),
            "scale" => Ok(Self::Scale),
            "rollback" => Ok(Self::Rollback),
            other => Err(DeploymentTypeParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentTypeParseError(pub String);

impl fmt::Display for DeploymentTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid deployment type: {:?}", self.0)
    }
}

impl std::error::Error for DeploymentTypeParseError {}

// ---------------------------------------------------------------------------

/// Priority of a queued deployment. Numeric value drives the in-memory sort
/// in the Queue Manager (`get_next_pending`, `get_queue_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl QueuePriority {
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for QueuePriority {
    type Err = QueuePriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(QueuePriorityParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePriorityParseError(pub String);

impl fmt::Display for QueuePriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid queue priority: {:?}", self.0)
    }
}

impl std::error::Error for QueuePriorityParseError {}

// ---------------------------------------------------------------------------

/// Status of a queued deployment. See the state machine in `orc_core::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    WaitingForWorkers,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::WaitingForWorkers => "waiting_for_workers",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for QueueStatus {
    type Err = QueueStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "waiting_for_workers" => Ok(Self::WaitingForWorkers),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(QueueStatusParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueStatusParseError(pub String);

impl fmt::Display for QueueStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid queue status: {:?}", self.0)
    }
}

impl std::error::Error for QueueStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of an active task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Kind of task checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Manual,
    Auto,
    PreDeploy,
    Recovery,
}

impl fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::PreDeploy => "pre_deploy",
            Self::Recovery => "recovery",
        };
        f.write_str(s)
    }
}

impl FromStr for CheckpointType {
    type Err = CheckpointTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "pre_deploy" => Ok(Self::PreDeploy),
            "recovery" => Ok(Self::Recovery),
            other => Err(CheckpointTypeParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointTypeParseError(pub String);

impl fmt::Display for CheckpointTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid checkpoint type: {:?}", self.0)
    }
}

impl std::error::Error for CheckpointTypeParseError {}

// ---------------------------------------------------------------------------

/// Outcome of the most recent run of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Running,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "running" => Ok(Self::Running),
            other => Err(JobStatusParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStatusParseError(pub String);

impl fmt::Display for JobStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {:?}", self.0)
    }
}

impl std::error::Error for JobStatusParseError {}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Decode a TEXT column into a `FromStr` type, turning a parse failure into
/// a `sqlx::Error::Decode` so callers can `?` it alongside real decode errors.
fn parse_col<T>(column: &str, raw: String) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

// `sqlx`'s own `FromRow` derive expands to an impl generic over any `R: Row`
// with per-field `Decode`/`Type` bounds against `R::Database`; the impls
// below follow that same shape by hand so one definition works against both
// `PgRow` and `SqliteRow` without duplicating each query's row mapping.

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// One requested deployment, queued for the coordinator's queue loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentQueue {
    pub id: i64,
    pub deployment_type: DeploymentType,
    pub target_service: String,
    pub priority: QueuePriority,
    pub status: QueueStatus,
    pub requested_by: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub requires_state_pause: bool,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
}

impl<'r, R> sqlx::FromRow<'r, R> for DeploymentQueue
where
    R: Row,
    &'r str: ColumnIndex<R>,
    i32: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    bool: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    DateTime<Utc>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<DateTime<Utc>>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let deployment_type: String = row.try_get("deployment_type")?;
        let priority: String = row.try_get("priority")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            deployment_type: parse_col("deployment_type", deployment_type)?,
            target_service: row.try_get("target_service")?,
            priority: parse_col("priority", priority)?,
            status: parse_col("status", status)?,
            requested_by: row.try_get("requested_by")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            requires_state_pause: row.try_get("requires_state_pause")?,
            error_message: row.try_get("error_message")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
        })
    }
}

/// One live unit of agent work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub id: i64,
    pub task_id: String,
    pub task_type: String,
    pub subagent_name: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_state: Option<String>,
    pub progress_percentage: i32,
    pub project_id: Option<String>,
    pub description: Option<String>,
}

impl<'r, R> sqlx::FromRow<'r, R> for ActiveTask
where
    R: Row,
    &'r str: ColumnIndex<R>,
    i32: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    DateTime<Utc>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            task_type: row.try_get("task_type")?,
            subagent_name: row.try_get("subagent_name")?,
            status: parse_col("status", status)?,
            started_at: row.try_get("started_at")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            current_state: row.try_get("current_state")?,
            progress_percentage: row.try_get("progress_percentage")?,
            project_id: row.try_get("project_id")?,
            description: row.try_get("description")?,
        })
    }
}

/// An immutable snapshot of a task's serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCheckpoint {
    pub id: i64,
    pub task_id: String,
    pub deployment_queue_id: Option<i64>,
    pub serialized_state: String,
    pub checkpoint_type: CheckpointType,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl<'r, R> sqlx::FromRow<'r, R> for TaskCheckpoint
where
    R: Row,
    &'r str: ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    bool: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<i64>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    DateTime<Utc>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let checkpoint_type: String = row.try_get("checkpoint_type")?;
        Ok(Self {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            deployment_queue_id: row.try_get("deployment_queue_id")?,
            serialized_state: row.try_get("serialized_state")?,
            checkpoint_type: parse_col("checkpoint_type", checkpoint_type)?,
            created_at: row.try_get("created_at")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

/// A recurring, cron-triggered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: i64,
    pub job_id: String,
    pub job_name: String,
    pub cron_expression: String,
    pub is_enabled: bool,
    pub is_running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_status: Option<JobStatus>,
    pub last_checkpoint_id: Option<i64>,
    pub auto_resume: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for ScheduledJob
where
    R: Row,
    &'r str: ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    bool: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<i64>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    DateTime<Utc>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<DateTime<Utc>>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        let last_status: Option<String> = row.try_get("last_status")?;
        let last_status = last_status
            .map(|s| parse_col("last_status", s))
            .transpose()?;
        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            job_name: row.try_get("job_name")?,
            cron_expression: row.try_get("cron_expression")?,
            is_enabled: row.try_get("is_enabled")?,
            is_running: row.try_get("is_running")?,
            last_run: row.try_get("last_run")?,
            next_run: row.try_get("next_run")?,
            last_status,
            last_checkpoint_id: row.try_get("last_checkpoint_id")?,
            auto_resume: row.try_get("auto_resume")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Append-only audit row of a notification sent (or attempted) to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: i64,
    pub user_id: String,
    pub chat_id: Option<String>,
    pub message_type: String,
    pub message: String,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for NotificationLog
where
    R: Row,
    &'r str: ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    bool: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    DateTime<Utc>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<DateTime<Utc>>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            chat_id: row.try_get("chat_id")?,
            message_type: row.try_get("message_type")?,
            message: row.try_get("message")?,
            is_sent: row.try_get("is_sent")?,
            sent_at: row.try_get("sent_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A named project directory tracked for completeness; not read by any
/// coordinator or tracker logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    pub id: i64,
    pub name: String,
    pub absolute_path: String,
    pub git_remote: Option<String>,
    pub is_active: bool,
    pub metadata_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for ProjectContext
where
    R: Row,
    &'r str: ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    bool: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    DateTime<Utc>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            absolute_path: row.try_get("absolute_path")?,
            git_remote: row.try_get("git_remote")?,
            is_active: row.try_get("is_active")?,
            metadata_json: row.try_get("metadata_json")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
