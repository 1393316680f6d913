//! Database query functions for the `active_tasks` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::{ActiveTask, TaskStatus};
use crate::pool::OrcPool;

#[allow(clippy::too_many_arguments)]
pub async fn insert_active_task(
    pool: &OrcPool,
    task_id: &str,
    task_type: &str,
    subagent_name: &str,
    now: DateTime<Utc>,
    project_id: Option<&str>,
    description: Option<&str>,
    initial_state: Option<&str>,
) -> Result<ActiveTask> {
    let status = TaskStatus::Running.to_string();
    let task = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, ActiveTask>(
            "INSERT INTO active_tasks \
                (task_id, task_type, subagent_name, status, started_at, last_heartbeat, \
                 current_state, progress_percentage, project_id, description) \
             VALUES ($1, $2, $3, $4, $5, $5, $6, 0, $7, $8) \
             RETURNING *",
        )
        .bind(task_id)
        .bind(task_type)
        .bind(subagent_name)
        .bind(status)
        .bind(now)
        .bind(initial_state)
        .bind(project_id)
        .bind(description)
        .fetch_one(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, ActiveTask>(
            "INSERT INTO active_tasks \
                (task_id, task_type, subagent_name, status, started_at, last_heartbeat, \
                 current_state, progress_percentage, project_id, description) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?) \
             RETURNING *",
        )
        .bind(task_id)
        .bind(task_type)
        .bind(subagent_name)
        .bind(status)
        .bind(now)
        .bind(now)
        .bind(initial_state)
        .bind(project_id)
        .bind(description)
        .fetch_one(p)
        .await,
    }
    .context("failed to insert active task")?;

    Ok(task)
}

pub async fn check_task_exists(pool: &OrcPool, task_id: &str) -> Result<bool> {
    let exists: bool = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM active_tasks WHERE task_id = $1)")
                .bind(task_id)
                .fetch_one(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM active_tasks WHERE task_id = ?)")
                .bind(task_id)
                .fetch_one(p)
                .await
        }
    }
    .context("failed to check task existence")?;

    Ok(exists)
}

pub async fn get_active_task(pool: &OrcPool, task_id: &str) -> Result<Option<ActiveTask>> {
    let task = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, ActiveTask>("SELECT * FROM active_tasks WHERE task_id = $1")
                .bind(task_id)
                .fetch_optional(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, ActiveTask>("SELECT * FROM active_tasks WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(p)
                .await
        }
    }
    .context("failed to fetch active task")?;

    Ok(task)
}

pub async fn list_active_tasks(
    pool: &OrcPool,
    project_id: Option<&str>,
    subagent_name: Option<&str>,
) -> Result<Vec<ActiveTask>> {
    let tasks = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, ActiveTask>(
                "SELECT * FROM active_tasks \
                 WHERE ($1::text IS NULL OR project_id = $1) \
                   AND ($2::text IS NULL OR subagent_name = $2) \
                 ORDER BY started_at DESC",
            )
            .bind(project_id)
            .bind(subagent_name)
            .fetch_all(p)
            .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, ActiveTask>(
                "SELECT * FROM active_tasks \
                 WHERE (? IS NULL OR project_id = ?) \
                   AND (? IS NULL OR subagent_name = ?) \
                 ORDER BY started_at DESC",
            )
            .bind(project_id)
            .bind(project_id)
            .bind(subagent_name)
            .bind(subagent_name)
            .fetch_all(p)
            .await
        }
    }
    .context("failed to list active tasks")?;

    Ok(tasks)
}

pub async fn list_running_tasks(pool: &OrcPool) -> Result<Vec<ActiveTask>> {
    let status = TaskStatus::Running.to_string();
    let tasks = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, ActiveTask>("SELECT * FROM active_tasks WHERE status = $1")
                .bind(status)
                .fetch_all(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, ActiveTask>("SELECT * FROM active_tasks WHERE status = ?")
                .bind(status)
                .fetch_all(p)
                .await
        }
    }
    .context("failed to list running tasks")?;

    Ok(tasks)
}

pub async fn list_paused_tasks(pool: &OrcPool) -> Result<Vec<ActiveTask>> {
    let status = TaskStatus::Paused.to_string();
    let tasks = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, ActiveTask>("SELECT * FROM active_tasks WHERE status = $1")
                .bind(status)
                .fetch_all(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, ActiveTask>("SELECT * FROM active_tasks WHERE status = ?")
                .bind(status)
                .fetch_all(p)
                .await
        }
    }
    .context("failed to list paused tasks")?;

    Ok(tasks)
}

pub async fn get_active_count(pool: &OrcPool) -> Result<i64> {
    let status = TaskStatus::Running.to_string();
    let count: i64 = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM active_tasks WHERE status = $1")
                .bind(status)
                .fetch_one(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM active_tasks WHERE status = ?")
                .bind(status)
                .fetch_one(p)
                .await
        }
    }
    .context("failed to count active tasks")?;

    Ok(count)
}

pub async fn update_heartbeat(pool: &OrcPool, task_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query("UPDATE active_tasks SET last_heartbeat = $1 WHERE task_id = $2")
                .bind(now)
                .bind(task_id)
                .execute(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query("UPDATE active_tasks SET last_heartbeat = ? WHERE task_id = ?")
                .bind(now)
                .bind(task_id)
                .execute(p)
                .await
        }
    }
    .context("failed to update heartbeat")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn update_progress(pool: &OrcPool, task_id: &str, progress: i32) -> Result<bool> {
    let clamped = progress.clamp(0, 100);
    let rows = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query("UPDATE active_tasks SET progress_percentage = $1 WHERE task_id = $2")
                .bind(clamped)
                .bind(task_id)
                .execute(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query("UPDATE active_tasks SET progress_percentage = ? WHERE task_id = ?")
                .bind(clamped)
                .bind(task_id)
                .execute(p)
                .await
        }
    }
    .context("failed to update progress")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn update_state(pool: &OrcPool, task_id: &str, state: &str) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query("UPDATE active_tasks SET current_state = $1 WHERE task_id = $2")
                .bind(state)
                .bind(task_id)
                .execute(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query("UPDATE active_tasks SET current_state = ? WHERE task_id = ?")
                .bind(state)
                .bind(task_id)
                .execute(p)
                .await
        }
    }
    .context("failed to update task state")?
    .rows_affected();

    Ok(rows > 0)
}

/// Flip a task from `running` to `paused`. Returns `false` if the task is
/// missing or not currently running (optimistic concurrency guard).
pub async fn set_paused(pool: &OrcPool, task_id: &str) -> Result<bool> {
    let (paused, running) = (TaskStatus::Paused.to_string(), TaskStatus::Running.to_string());
    let rows = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query("UPDATE active_tasks SET status = $1 WHERE task_id = $2 AND status = $3")
                .bind(paused)
                .bind(task_id)
                .bind(running)
                .execute(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query("UPDATE active_tasks SET status = ? WHERE task_id = ? AND status = ?")
                .bind(paused)
                .bind(task_id)
                .bind(running)
                .execute(p)
                .await
        }
    }
    .context("failed to pause task")?
    .rows_affected();

    Ok(rows > 0)
}

/// Flip a task from `paused` to `running`, restoring `current_state` from a
/// checkpoint's serialized state when one is supplied (leaves the existing
/// value untouched when `restored_state` is `None`). Returns `false` if the
/// task is missing or not currently paused.
pub async fn set_resumed(
    pool: &OrcPool,
    task_id: &str,
    restored_state: Option<&str>,
) -> Result<bool> {
    let (running, paused) = (TaskStatus::Running.to_string(), TaskStatus::Paused.to_string());
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE active_tasks SET status = $1, current_state = COALESCE($2, current_state) \
             WHERE task_id = $3 AND status = $4",
        )
        .bind(running)
        .bind(restored_state)
        .bind(task_id)
        .bind(paused)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE active_tasks SET status = ?, current_state = COALESCE(?, current_state) \
             WHERE task_id = ? AND status = ?",
        )
        .bind(running)
        .bind(restored_state)
        .bind(task_id)
        .bind(paused)
        .execute(p)
        .await,
    }
    .context("failed to resume task")?
    .rows_affected();

    Ok(rows > 0)
}

/// Used only by startup recovery, which pauses every `running` row
/// unconditionally regardless of heartbeat freshness.
pub async fn force_pause(pool: &OrcPool, task_id: &str) -> Result<bool> {
    let paused = TaskStatus::Paused.to_string();
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query("UPDATE active_tasks SET status = $1 WHERE task_id = $2")
            .bind(paused)
            .bind(task_id)
            .execute(p)
            .await,
        OrcPool::Sqlite(p) => sqlx::query("UPDATE active_tasks SET status = ? WHERE task_id = ?")
            .bind(paused)
            .bind(task_id)
            .execute(p)
            .await,
    }
    .context("failed to force-pause task")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn unregister_task(
    pool: &OrcPool,
    task_id: &str,
    final_state: Option<&str>,
) -> Result<bool> {
    let completed = TaskStatus::Completed.to_string();
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE active_tasks \
             SET status = $1, current_state = COALESCE($2, current_state) \
             WHERE task_id = $3",
        )
        .bind(completed)
        .bind(final_state)
        .bind(task_id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE active_tasks \
             SET status = ?, current_state = COALESCE(?, current_state) \
             WHERE task_id = ?",
        )
        .bind(completed)
        .bind(final_state)
        .bind(task_id)
        .execute(p)
        .await,
    }
    .context("failed to unregister task")?
    .rows_affected();

    Ok(rows > 0)
}

/// Transition every `running` task whose heartbeat is older than `cutoff` to
/// `failed`. Returns the number of tasks swept.
pub async fn fail_stale_tasks(pool: &OrcPool, cutoff: DateTime<Utc>) -> Result<u64> {
    let (failed, running) = (TaskStatus::Failed.to_string(), TaskStatus::Running.to_string());
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE active_tasks SET status = $1 \
             WHERE status = $2 AND last_heartbeat < $3",
        )
        .bind(failed)
        .bind(running)
        .bind(cutoff)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE active_tasks SET status = ? \
             WHERE status = ? AND last_heartbeat < ?",
        )
        .bind(failed)
        .bind(running)
        .bind(cutoff)
        .execute(p)
        .await,
    }
    .context("failed to sweep stale tasks")?
    .rows_affected();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    // Exercised against a real backend in orc-core's integration tests;
    // see `tests/task_tracker_test.rs`.
}
