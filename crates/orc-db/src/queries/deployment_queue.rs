//! Database query functions for the `deployment_queue` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::{DeploymentQueue, DeploymentType, QueuePriority, QueueStatus};
use crate::pool::OrcPool;

#[allow(clippy::too_many_arguments)]
pub async fn insert_queue_item(
    pool: &OrcPool,
    deployment_type: DeploymentType,
    target_service: &str,
    priority: QueuePriority,
    requested_by: Option<&str>,
    reason: Option<&str>,
    scheduled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_retries: i32,
) -> Result<DeploymentQueue> {
    let requires_state_pause = deployment_type.is_destructive();
    let (dt, pr, st) = (
        deployment_type.to_string(),
        priority.to_string(),
        QueueStatus::Pending.to_string(),
    );

    let item = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, DeploymentQueue>(
            "INSERT INTO deployment_queue \
                (deployment_type, target_service, priority, status, requested_by, reason, \
                 created_at, scheduled_at, requires_state_pause, retry_count, max_retries) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10) \
             RETURNING *",
        )
        .bind(dt)
        .bind(target_service)
        .bind(pr)
        .bind(st)
        .bind(requested_by)
        .bind(reason)
        .bind(now)
        .bind(scheduled_at)
        .bind(requires_state_pause)
        .bind(max_retries)
        .fetch_one(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, DeploymentQueue>(
            "INSERT INTO deployment_queue \
                (deployment_type, target_service, priority, status, requested_by, reason, \
                 created_at, scheduled_at, requires_state_pause, retry_count, max_retries) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?) \
             RETURNING *",
        )
        .bind(dt)
        .bind(target_service)
        .bind(pr)
        .bind(st)
        .bind(requested_by)
        .bind(reason)
        .bind(now)
        .bind(scheduled_at)
        .bind(requires_state_pause)
        .bind(max_retries)
        .fetch_one(p)
        .await,
    }
    .context("failed to insert queue item")?;

    Ok(item)
}

pub async fn get_queue_item(pool: &OrcPool, id: i64) -> Result<Option<DeploymentQueue>> {
    let item = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, DeploymentQueue>("SELECT * FROM deployment_queue WHERE id = $1")
                .bind(id)
                .fetch_optional(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, DeploymentQueue>("SELECT * FROM deployment_queue WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await
        }
    }
    .context("failed to fetch queue item")?;

    Ok(item)
}

/// Candidates for `get_next_pending`: pending items whose `scheduled_at` has
/// arrived. Final priority/created_at ordering happens in memory (§9 design
/// note: dodges engine-specific enum ordering).
pub async fn list_pending_candidates(
    pool: &OrcPool,
    now: DateTime<Utc>,
) -> Result<Vec<DeploymentQueue>> {
    let status = QueueStatus::Pending.to_string();
    let items = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, DeploymentQueue>(
            "SELECT * FROM deployment_queue \
             WHERE status = $1 AND (scheduled_at IS NULL OR scheduled_at <= $2)",
        )
        .bind(status)
        .bind(now)
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, DeploymentQueue>(
            "SELECT * FROM deployment_queue \
             WHERE status = ? AND (scheduled_at IS NULL OR scheduled_at <= ?)",
        )
        .bind(status)
        .bind(now)
        .fetch_all(p)
        .await,
    }
    .context("failed to list pending queue candidates")?;

    Ok(items)
}

pub async fn list_all(pool: &OrcPool) -> Result<Vec<DeploymentQueue>> {
    let items = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, DeploymentQueue>("SELECT * FROM deployment_queue")
                .fetch_all(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, DeploymentQueue>("SELECT * FROM deployment_queue")
                .fetch_all(p)
                .await
        }
    }
    .context("failed to list queue items")?;

    Ok(items)
}

pub async fn list_processing(pool: &OrcPool) -> Result<Vec<DeploymentQueue>> {
    let status = QueueStatus::Processing.to_string();
    let items = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, DeploymentQueue>("SELECT * FROM deployment_queue WHERE status = $1")
                .bind(status)
                .fetch_all(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, DeploymentQueue>("SELECT * FROM deployment_queue WHERE status = ?")
                .bind(status)
                .fetch_all(p)
                .await
        }
    }
    .context("failed to list processing queue items")?;

    Ok(items)
}

pub async fn list_failed_retryable(pool: &OrcPool) -> Result<Vec<DeploymentQueue>> {
    let status = QueueStatus::Failed.to_string();
    let items = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, DeploymentQueue>(
            "SELECT * FROM deployment_queue WHERE status = $1 AND retry_count < max_retries",
        )
        .bind(status)
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, DeploymentQueue>(
            "SELECT * FROM deployment_queue WHERE status = ? AND retry_count < max_retries",
        )
        .bind(status)
        .fetch_all(p)
        .await,
    }
    .context("failed to list retryable queue items")?;

    Ok(items)
}

/// Transition to `waiting_for_workers`, used only as the side effect of a
/// failed `check_can_proceed`.
pub async fn set_waiting_for_workers(pool: &OrcPool, id: i64) -> Result<bool> {
    set_simple_status(pool, id, QueueStatus::WaitingForWorkers).await
}

/// Transition a `waiting_for_workers` item back to `pending` once workers
/// clear, so it re-enters `list_pending_candidates`.
pub async fn set_pending(pool: &OrcPool, id: i64) -> Result<bool> {
    set_simple_status(pool, id, QueueStatus::Pending).await
}

async fn set_simple_status(pool: &OrcPool, id: i64, status: QueueStatus) -> Result<bool> {
    let s = status.to_string();
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query("UPDATE deployment_queue SET status = $1 WHERE id = $2")
            .bind(s)
            .bind(id)
            .execute(p)
            .await,
        OrcPool::Sqlite(p) => sqlx::query("UPDATE deployment_queue SET status = ? WHERE id = ?")
            .bind(s)
            .bind(id)
            .execute(p)
            .await,
    }
    .context("failed to update queue item status")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn set_processing(pool: &OrcPool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    let status = QueueStatus::Processing.to_string();
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE deployment_queue SET status = $1, started_at = $2 WHERE id = $3",
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE deployment_queue SET status = ?, started_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(p)
        .await,
    }
    .context("failed to mark queue item processing")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn set_completed(pool: &OrcPool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    finish(pool, id, QueueStatus::Completed, now, None).await
}

pub async fn set_failed(
    pool: &OrcPool,
    id: i64,
    now: DateTime<Utc>,
    error_message: &str,
) -> Result<bool> {
    finish(pool, id, QueueStatus::Failed, now, Some(error_message)).await
}

pub async fn set_cancelled(pool: &OrcPool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    finish(pool, id, QueueStatus::Cancelled, now, None).await
}

/// Transition a processing (or pending, for cancel) item to a terminal
/// status, stamping `completed_at`.
async fn finish(
    pool: &OrcPool,
    id: i64,
    status: QueueStatus,
    now: DateTime<Utc>,
    error_message: Option<&str>,
) -> Result<bool> {
    let s = status.to_string();
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = $1, completed_at = $2, error_message = COALESCE($3, error_message) \
             WHERE id = $4",
        )
        .bind(s)
        .bind(now)
        .bind(error_message)
        .bind(id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = ?, completed_at = ?, error_message = COALESCE(?, error_message) \
             WHERE id = ?",
        )
        .bind(s)
        .bind(now)
        .bind(error_message)
        .bind(id)
        .execute(p)
        .await,
    }
    .context("failed to finish queue item")?
    .rows_affected();

    Ok(rows > 0)
}

/// Startup recovery: every `processing` row becomes `failed` with a fixed
/// message, regardless of count. Returns the number of rows affected.
pub async fn fail_all_processing(
    pool: &OrcPool,
    now: DateTime<Utc>,
    error_message: &str,
) -> Result<u64> {
    let (failed, processing) = (
        QueueStatus::Failed.to_string(),
        QueueStatus::Processing.to_string(),
    );
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = $1, completed_at = $2, error_message = $3 \
             WHERE status = $4",
        )
        .bind(failed)
        .bind(now)
        .bind(error_message)
        .bind(processing)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = ?, completed_at = ?, error_message = ? \
             WHERE status = ?",
        )
        .bind(failed)
        .bind(now)
        .bind(error_message)
        .bind(processing)
        .execute(p)
        .await,
    }
    .context("failed to fail processing queue items on recovery")?
    .rows_affected();

    Ok(rows)
}

pub async fn retry_queue_item(pool: &OrcPool, id: i64) -> Result<bool> {
    let (pending, failed) = (QueueStatus::Pending.to_string(), QueueStatus::Failed.to_string());
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = $1, retry_count = retry_count + 1, error_message = NULL, \
                 started_at = NULL, completed_at = NULL \
             WHERE id = $2 AND status = $3 AND retry_count < max_retries",
        )
        .bind(pending)
        .bind(id)
        .bind(failed)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = ?, retry_count = retry_count + 1, error_message = NULL, \
                 started_at = NULL, completed_at = NULL \
             WHERE id = ? AND status = ? AND retry_count < max_retries",
        )
        .bind(pending)
        .bind(id)
        .bind(failed)
        .execute(p)
        .await,
    }
    .context("failed to retry queue item")?
    .rows_affected();

    Ok(rows > 0)
}

/// Bulk variant: retries every failed, retry-eligible row in one statement.
/// Returns the number of rows retried.
pub async fn retry_all_failed(pool: &OrcPool) -> Result<u64> {
    let (pending, failed) = (QueueStatus::Pending.to_string(), QueueStatus::Failed.to_string());
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = $1, retry_count = retry_count + 1, error_message = NULL \
             WHERE status = $2 AND retry_count < max_retries",
        )
        .bind(pending)
        .bind(failed)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE deployment_queue \
             SET status = ?, retry_count = retry_count + 1, error_message = NULL \
             WHERE status = ? AND retry_count < max_retries",
        )
        .bind(pending)
        .bind(failed)
        .execute(p)
        .await,
    }
    .context("failed to retry failed queue items")?
    .rows_affected();

    Ok(rows)
}
