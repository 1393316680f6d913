//! Database query functions for the `notification_log` table.
//!
//! A row is always persisted before the notification callback is invoked
//! (`is_sent` starts `FALSE`), so a crash between insert and delivery leaves
//! an auditable, retryable record rather than a silently dropped message.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::NotificationLog;
use crate::pool::OrcPool;

pub async fn insert_notification(
    pool: &OrcPool,
    user_id: &str,
    chat_id: Option<&str>,
    message_type: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<NotificationLog> {
    let entry = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, NotificationLog>(
            "INSERT INTO notification_log \
                (user_id, chat_id, message_type, message, is_sent, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5) \
             RETURNING *",
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(message_type)
        .bind(message)
        .bind(now)
        .fetch_one(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, NotificationLog>(
            "INSERT INTO notification_log \
                (user_id, chat_id, message_type, message, is_sent, created_at) \
             VALUES (?, ?, ?, ?, 0, ?) \
             RETURNING *",
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(message_type)
        .bind(message)
        .bind(now)
        .fetch_one(p)
        .await,
    }
    .context("failed to insert notification log entry")?;

    Ok(entry)
}

pub async fn mark_sent(pool: &OrcPool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE notification_log SET is_sent = TRUE, sent_at = $1 WHERE id = $2",
        )
        .bind(now)
        .bind(id)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE notification_log SET is_sent = 1, sent_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(p)
        .await,
    }
    .context("failed to mark notification sent")?
    .rows_affected();

    Ok(rows > 0)
}

pub async fn list_unsent(pool: &OrcPool) -> Result<Vec<NotificationLog>> {
    let entries = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, NotificationLog>(
            "SELECT * FROM notification_log WHERE is_sent = FALSE ORDER BY created_at",
        )
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, NotificationLog>(
            "SELECT * FROM notification_log WHERE is_sent = 0 ORDER BY created_at",
        )
        .fetch_all(p)
        .await,
    }
    .context("failed to list unsent notifications")?;

    Ok(entries)
}

pub async fn list_recent(pool: &OrcPool, limit: i64) -> Result<Vec<NotificationLog>> {
    let entries = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, NotificationLog>(
            "SELECT * FROM notification_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, NotificationLog>(
            "SELECT * FROM notification_log ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(p)
        .await,
    }
    .context("failed to list recent notifications")?;

    Ok(entries)
}
