//! Database query functions for the `project_contexts` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::ProjectContext;
use crate::pool::OrcPool;

pub async fn insert_project(
    pool: &OrcPool,
    name: &str,
    absolute_path: &str,
    git_remote: Option<&str>,
    metadata_json: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ProjectContext> {
    let project = match pool {
        OrcPool::Postgres(p) => sqlx::query_as::<_, ProjectContext>(
            "INSERT INTO project_contexts \
                (name, absolute_path, git_remote, is_active, metadata_json, created_at, updated_at) \
             VALUES ($1, $2, $3, TRUE, $4, $5, $5) \
             RETURNING *",
        )
        .bind(name)
        .bind(absolute_path)
        .bind(git_remote)
        .bind(metadata_json)
        .bind(now)
        .fetch_one(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query_as::<_, ProjectContext>(
            "INSERT INTO project_contexts \
                (name, absolute_path, git_remote, is_active, metadata_json, created_at, updated_at) \
             VALUES (?, ?, ?, 1, ?, ?, ?) \
             RETURNING *",
        )
        .bind(name)
        .bind(absolute_path)
        .bind(git_remote)
        .bind(metadata_json)
        .bind(now)
        .bind(now)
        .fetch_one(p)
        .await,
    }
    .context("failed to insert project context")?;

    Ok(project)
}

pub async fn get_project_by_name(pool: &OrcPool, name: &str) -> Result<Option<ProjectContext>> {
    let project = match pool {
        OrcPool::Postgres(p) => {
            sqlx::query_as::<_, ProjectContext>("SELECT * FROM project_contexts WHERE name = $1")
                .bind(name)
                .fetch_optional(p)
                .await
        }
        OrcPool::Sqlite(p) => {
            sqlx::query_as::<_, ProjectContext>("SELECT * FROM project_contexts WHERE name = ?")
                .bind(name)
                .fetch_optional(p)
                .await
        }
    }
    .context("failed to fetch project context")?;

    Ok(project)
}

pub async fn list_projects(pool: &OrcPool, active_only: bool) -> Result<Vec<ProjectContext>> {
    let projects = match pool {
        OrcPool::Postgres(p) => {
            if active_only {
                sqlx::query_as::<_, ProjectContext>(
                    "SELECT * FROM project_contexts WHERE is_active = TRUE ORDER BY name",
                )
                .fetch_all(p)
                .await
            } else {
                sqlx::query_as::<_, ProjectContext>("SELECT * FROM project_contexts ORDER BY name")
                    .fetch_all(p)
                    .await
            }
        }
        OrcPool::Sqlite(p) => {
            if active_only {
                sqlx::query_as::<_, ProjectContext>(
                    "SELECT * FROM project_contexts WHERE is_active = 1 ORDER BY name",
                )
                .fetch_all(p)
                .await
            } else {
                sqlx::query_as::<_, ProjectContext>("SELECT * FROM project_contexts ORDER BY name")
                    .fetch_all(p)
                    .await
            }
        }
    }
    .context("failed to list project contexts")?;

    Ok(projects)
}

pub async fn set_active(pool: &OrcPool, name: &str, is_active: bool, now: DateTime<Utc>) -> Result<bool> {
    let rows = match pool {
        OrcPool::Postgres(p) => sqlx::query(
            "UPDATE project_contexts SET is_active = $1, updated_at = $2 WHERE name = $3",
        )
        .bind(is_active)
        .bind(now)
        .bind(name)
        .execute(p)
        .await,
        OrcPool::Sqlite(p) => sqlx::query(
            "UPDATE project_contexts SET is_active = ?, updated_at = ? WHERE name = ?",
        )
        .bind(is_active)
        .bind(now)
        .bind(name)
        .execute(p)
        .await,
    }
    .context("failed to set project context active state")?
    .rows_affected();

    Ok(rows > 0)
}
