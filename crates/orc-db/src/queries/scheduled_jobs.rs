//! Database query functions for the `scheduled_jobs` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::{JobStatus, ScheduledJob};
use crate::pool::OrcPool;

pub async fn insert_job(
    pool: &OrcPool,
    job_id: &str,
    job_name: &str,
    cron_expression: &str,
    next_run: Option<DateTime<Utc>>,
    auto_resume: bool,
    now: DateTime<Utc>,
) -> Result<ScheduledJob> {
    let job = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, ScheduledJob>(
            "INSERT INTO scheduled_jobs \
                (job_id, job_name, cron_expression, is_enabled, is_running, next_run, \
                 auto_resume, created_at, updated_at) \
             VALUES ($1, $2, $3, TRUE, FALSE, $4, $5, $6, $6) \
             RETURNING *",
        )
        .bind(job_id)
        .bind(job_name)
        .bind(cron_expression)
        .bind(next_run)
        .bind(auto_resume)
        .bind(now)
        .fetch_one(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, ScheduledJob>(
            "INSERT INTO scheduled_jobs \
                (job_id, job_name, cron_expression, is_enabled, is_running, next_run, \
                 auto_resume, created_at, updated_at) \
             VALUES (?, ?, ?, 1, 0, ?, ?, ?, ?) \
             RETURNING *",
        )
        .bind(job_id)
        .bind(job_name)
        .bind(cron_expression)
        .bind(next_run)
        .bind(auto_resume)
        .bind(now)
        .bind(now)
        .fetch_one(p)
        .await,
    }
    .context("failed to insert scheduled job")?;

    Ok(job)
}

pub async fn get_job(pool: &OrcPool, job_id: &str) -> Result<Option<ScheduledJob>> {
    let job = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, ScheduledJob>("SELECT * FROM scheduled_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, ScheduledJob>("SELECT * FROM scheduled_jobs WHERE job_id = ?")
                .bind(job_id)
                .fetch_optional(p)
                .await
        }
    }
    .context("failed to fetch scheduled job")?;

    Ok(job)
}

pub async fn list_jobs(pool: &OrcPool) -> Result<Vec<ScheduledJob>> {
    let jobs = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, ScheduledJob>(
            "SELECT * FROM scheduled_jobs ORDER BY job_name",
        )
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, ScheduledJob>(
            "SELECT * FROM scheduled_jobs ORDER BY job_name",
        )
        .fetch_all(p)
        .await,
    }
    .context("failed to list scheduled jobs")?;

    Ok(jobs)
}

/// Enabled, not currently running jobs whose `next_run` is due.
pub async fn list_due_jobs(pool: &OrcPool, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
    let jobs = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, ScheduledJob>(
            "SELECT * FROM scheduled_jobs \
             WHERE is_enabled = TRUE AND is_running = FALSE \
               AND next_run IS NOT NULL AND next_run <= $1",
        )
        .bind(now)
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, ScheduledJob>(
            "SELECT * FROM scheduled_jobs \
             WHERE is_enabled = 1 AND is_running = 0 \
               AND next_run IS NOT NULL AND next_run <= ?",
        )
        .bind(now)
        .fetch_all(p)
        .await,
    }
    .context("failed to list due jobs")?;

    Ok(jobs)
}

pub async fn set_enabled(pool: &OrcPool, job_id: &str, is_enabled: bool, now: DateTime<Utc>) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE scheduled_jobs SET is_enabled = $1, updated_at = $2 WHERE job_id = $3",
        )
        .bind(is_enabled)
        .bind(now)
        .bind(job_id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE scheduled_jobs SET is_enabled = ?, updated_at = ? WHERE job_id = ?",
        )
        .bind(is_enabled)
        .bind(now)
        .bind(job_id)
        .execute(p)
        .await,
    }
    .context("failed to toggle scheduled job")?
    .rows_affected();

    Ok(rows > 0)
}

/// Optimistic claim: only succeeds if the job is still enabled and not
/// already running. Stamps `last_run` at claim time, matching the scheduler
/// loop's "mark is_running=true, stamp last_run=now" step -- `last_run`
/// always reflects when a run started, not when it finished. Prevents the
/// scheduler loop from double-firing a job.
pub async fn claim_for_run(pool: &OrcPool, job_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE scheduled_jobs SET is_running = TRUE, last_run = $1 \
             WHERE job_id = $2 AND is_enabled = TRUE AND is_running = FALSE",
        )
        .bind(now)
        .bind(job_id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE scheduled_jobs SET is_running = 1, last_run = ? \
             WHERE job_id = ? AND is_enabled = 1 AND is_running = 0",
        )
        .bind(now)
        .bind(job_id)
        .execute(p)
        .await,
    }
    .context("failed to claim scheduled job")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn finish_run(
    pool: &OrcPool,
    job_id: &str,
    status: JobStatus,
    next_run: Option<DateTime<Utc>>,
    last_checkpoint_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let s = status.to_string();
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE scheduled_jobs \
             SET is_running = FALSE, next_run = $1, last_status = $2, \
                 last_checkpoint_id = $3, updated_at = $4 \
             WHERE job_id = $5",
        )
        .bind(next_run)
        .bind(s)
        .bind(last_checkpoint_id)
        .bind(now)
        .bind(job_id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE scheduled_jobs \
             SET is_running = 0, next_run = ?, last_status = ?, \
                 last_checkpoint_id = ?, updated_at = ? \
             WHERE job_id = ?",
        )
        .bind(next_run)
        .bind(s)
        .bind(last_checkpoint_id)
        .bind(now)
        .bind(job_id)
        .execute(p)
        .await,
    }
    .context("failed to finish scheduled job run")?
    .rows_affected();

    Ok(rows > 0)
}
