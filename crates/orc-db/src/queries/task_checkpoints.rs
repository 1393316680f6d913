//! Database query functions for the `task_checkpoints` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::{CheckpointType, TaskCheckpoint};
use crate::pool::OrcPool;

pub async fn insert_checkpoint(
    pool: &OrcPool,
    task_id: &str,
    serialized_state: &str,
    checkpoint_type: CheckpointType,
    deployment_queue_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<TaskCheckpoint> {
    let kind = checkpoint_type.to_string();
    let checkpoint = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "INSERT INTO task_checkpoints \
                (task_id, deployment_queue_id, serialized_state, checkpoint_type, created_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, TRUE) \
             RETURNING *",
        )
        .bind(task_id)
        .bind(deployment_queue_id)
        .bind(serialized_state)
        .bind(kind)
        .bind(now)
        .fetch_one(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "INSERT INTO task_checkpoints \
                (task_id, deployment_queue_id, serialized_state, checkpoint_type, created_at, is_active) \
             VALUES (?, ?, ?, ?, ?, 1) \
             RETURNING *",
        )
        .bind(task_id)
        .bind(deployment_queue_id)
        .bind(serialized_state)
        .bind(kind)
        .bind(now)
        .fetch_one(p)
        .await,
    }
    .context("failed to insert checkpoint")?;

    Ok(checkpoint)
}

pub async fn get_checkpoint(pool: &OrcPool, id: i64) -> Result<Option<TaskCheckpoint>> {
    let checkpoint = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, TaskCheckpoint>("SELECT * FROM task_checkpoints WHERE id = $1")
                .bind(id)
                .fetch_optional(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, TaskCheckpoint>("SELECT * FROM task_checkpoints WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await
        }
    }
    .context("failed to fetch checkpoint")?;

    Ok(checkpoint)
}

pub async fn get_latest_active_checkpoint(
    pool: &OrcPool,
    task_id: &str,
) -> Result<Option<TaskCheckpoint>> {
    let checkpoint = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "SELECT * FROM task_checkpoints \
             WHERE task_id = $1 AND is_active = TRUE \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "SELECT * FROM task_checkpoints \
             WHERE task_id = ? AND is_active = 1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(p)
        .await,
    }
    .context("failed to fetch latest checkpoint")?;

    Ok(checkpoint)
}

pub async fn list_active_checkpoints(
    pool: &OrcPool,
    task_id: &str,
    limit: i64,
) -> Result<Vec<TaskCheckpoint>> {
    let checkpoints = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "SELECT * FROM task_checkpoints \
             WHERE task_id = $1 AND is_active = TRUE \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "SELECT * FROM task_checkpoints \
             WHERE task_id = ? AND is_active = 1 \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(p)
        .await,
    }
    .context("failed to list active checkpoints")?;

    Ok(checkpoints)
}

pub async fn list_all_active_checkpoints(pool: &OrcPool) -> Result<Vec<TaskCheckpoint>> {
    let checkpoints = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "SELECT * FROM task_checkpoints WHERE is_active = TRUE ORDER BY created_at DESC",
        )
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, TaskCheckpoint>(
            "SELECT * FROM task_checkpoints WHERE is_active = 1 ORDER BY created_at DESC",
        )
        .fetch_all(p)
        .await,
    }
    .context("failed to list active checkpoints")?;

    Ok(checkpoints)
}

pub async fn deactivate_checkpoint(pool: &OrcPool, id: i64) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query("UPDATE task_checkpoints SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(p)
            .await,
        OrcPool::Sqlite(p) => sqlx::query("UPDATE task_checkpoints SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(p)
            .await,
    }
    .context("failed to deactivate checkpoint")?
    .rows_affected();

    Ok(rows > 0)
}

/// Delete inactive checkpoints older than `cutoff`. Returns the number deleted.
pub async fn cleanup_old_checkpoints(pool: &OrcPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "DELETE FROM task_checkpoints WHERE is_active = FALSE AND created_at < $1",
        )
        .bind(cutoff)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "DELETE FROM task_checkpoints WHERE is_active = 0 AND created_at < ?",
        )
        .bind(cutoff)
        .execute(p)
        .await,
    }
    .context("failed to clean up old checkpoints")?
    .rows_affected();

    Ok(rows)
}
