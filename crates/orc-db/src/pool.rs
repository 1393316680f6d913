use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, PgPool, Row, SqlitePool};
use tracing::info;

use crate::config::{DbBackend, DbConfig};

/// A connection pool to either supported backend.
///
/// Query modules take `&OrcPool` and match on the variant, issuing the same
/// SQL text against whichever concrete pool is active -- the schema is kept
/// dialect-neutral (TEXT status columns, no backend-specific functions) so
/// the query string itself rarely differs.
#[derive(Clone)]
pub enum OrcPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl OrcPool {
    pub fn backend(&self) -> DbBackend {
        match self {
            Self::Postgres(_) => DbBackend::Postgres,
            Self::Sqlite(_) => DbBackend::Sqlite,
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Create a connection pool with sensible defaults, choosing the backend
/// from the URL scheme.
pub async fn create_pool(config: &DbConfig) -> Result<OrcPool> {
    match config.backend() {
        DbBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&config.database_url)
                .await
                .with_context(|| {
                    format!("failed to connect to database at {}", config.database_url)
                })?;
            Ok(OrcPool::Postgres(pool))
        }
        DbBackend::Sqlite => {
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&config.database_url)
                .await
                .with_context(|| {
                    format!("failed to connect to database at {}", config.database_url)
                })?;
            Ok(OrcPool::Sqlite(pool))
        }
    }
}

/// Run all pending migrations from the migrations directory matching this
/// pool's backend against the pool.
///
/// Uses a runtime `Migrator` so that no running database is required at
/// compile time (unlike the `sqlx::migrate!()` macro).
pub async fn run_migrations(pool: &OrcPool) -> Result<()> {
    let migrations_dir = default_migrations_path(pool.backend());
    let migrator = sqlx::migrate::Migrator::new(migrations_dir.as_path())
        .await
        .with_context(|| {
            format!(
                "failed to load migrations from {}",
                migrations_dir.display()
            )
        })?;

    match pool {
        OrcPool::Postgres(p) => migrator.run(p).await,
        OrcPool::Sqlite(p) => migrator.run(p).await,
    }
    .context("failed to run database migrations")?;

    info!("migrations applied successfully");
    Ok(())
}

/// Ensure the target database exists, creating it if necessary.
///
/// Only meaningful for postgres: connects to the `postgres` maintenance
/// database and issues `CREATE DATABASE <name>` when the target database is
/// absent. For sqlite the file is created implicitly on first connection, so
/// this is a no-op.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    if config.backend() == DbBackend::Sqlite {
        return Ok(());
    }

    let db_name = config
        .database_name()
        .context("could not determine database name from URL")?;

    let maintenance_url = config.maintenance_url();

    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&maintenance_url)
        .await
        .with_context(|| {
            format!(
                "failed to connect to maintenance database at {}",
                maintenance_url
            )
        })?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&maint_pool)
            .await
            .context("failed to query pg_database")?;

    if exists {
        info!(db = db_name, "database already exists");
    } else {
        // Database names cannot be parameterised in CREATE DATABASE, so we
        // validate the name to avoid SQL injection, then use string formatting.
        if !db_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!("database name {:?} contains invalid characters", db_name);
        }
        let stmt = format!("CREATE DATABASE {db_name}");
        maint_pool
            .execute(stmt.as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "database created");
    }

    maint_pool.close().await;
    Ok(())
}

/// Return the row count for every user-defined table.
///
/// Useful for the `orc db-init` success message.
pub async fn table_counts(pool: &OrcPool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<String> = match pool {
        OrcPool::Postgres(p) => {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT tablename::text FROM pg_tables \
                 WHERE schemaname = 'public' ORDER BY tablename",
            )
            .fetch_all(p)
            .await
            .context("failed to list tables")?;
            rows.into_iter().map(|(n,)| n).collect()
        }
        OrcPool::Sqlite(p) => {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .fetch_all(p)
            .await
            .context("failed to list tables")?;
            rows.into_iter().map(|(n,)| n).collect()
        }
    };

    let mut counts = Vec::with_capacity(tables.len());
    for table_name in &tables {
        if table_name.starts_with("_sqlx") {
            continue;
        }
        // Table names come straight from the catalog, so they are safe identifiers.
        let query = format!("SELECT COUNT(*) AS cnt FROM {table_name}");
        let count: i64 = match pool {
            OrcPool::Postgres(p) => sqlx::query(&query)
                .fetch_one(p)
                .await
                .with_context(|| format!("failed to count rows in {table_name}"))?
                .get("cnt"),
            OrcPool::Sqlite(p) => sqlx::query(&query)
                .fetch_one(p)
                .await
                .with_context(|| format!("failed to count rows in {table_name}"))?
                .get("cnt"),
        };
        counts.push((table_name.clone(), count));
    }
    Ok(counts)
}

/// Return the default path to the migrations directory for a given backend,
/// shipped with `orc-db`.
///
/// At runtime this resolves relative to the `orc-db` crate's source tree via
/// the `CARGO_MANIFEST_DIR` compile-time env. For installed binaries (where
/// the source tree is absent) the migrations should be embedded at compile
/// time by the caller instead.
pub fn default_migrations_path(backend: DbBackend) -> std::path::PathBuf {
    let sub = match backend {
        DbBackend::Postgres => "postgres",
        DbBackend::Sqlite => "sqlite",
    };
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations")).join(sub)
}
