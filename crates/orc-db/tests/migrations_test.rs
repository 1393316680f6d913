//! Integration tests for database migrations and connection pooling.
//!
//! Each test creates a unique temporary database inside a shared containerized
//! PostgreSQL instance (via testcontainers), runs migrations, and drops it on
//! completion so tests are fully isolated and idempotent.

use orc_db::config::DbConfig;
use orc_db::pool::{self, OrcPool};

use orc_test_utils::{create_test_db, drop_test_db, pg_url};

/// Expected tables created by the initial migration.
const EXPECTED_TABLES: &[&str] = &[
    "active_tasks",
    "deployment_queue",
    "notification_log",
    "project_contexts",
    "scheduled_jobs",
    "task_checkpoints",
];

async fn query_one_i32(pool: &OrcPool, sql: &str) -> i32 {
    match pool {
        OrcPool::Postgres(p) => {
            let (v,): (i32,) = sqlx::query_as(sql).fetch_one(p).await.unwrap();
            v
        }
        OrcPool::Sqlite(p) => {
            let (v,): (i32,) = sqlx::query_as(sql).fetch_one(p).await.unwrap();
            v
        }
    }
}

#[tokio::test]
async fn migrations_create_all_tables() {
    let (temp_pool, db_name) = create_test_db().await;

    // create_test_db already ran migrations; re-running here exercises
    // idempotence within the same test.
    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    let rows: Vec<(String,)> = match &temp_pool {
        OrcPool::Postgres(p) => sqlx::query_as(
            "SELECT tablename::text FROM pg_tables \
             WHERE schemaname = 'public' \
             ORDER BY tablename",
        )
        .fetch_all(p)
        .await
        .expect("should list tables"),
        OrcPool::Sqlite(p) => sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(p)
        .await
        .expect("should list tables"),
    };

    let user_tables: Vec<&str> = rows
        .iter()
        .map(|(name,)| name.as_str())
        .filter(|t| !t.starts_with("_sqlx"))
        .collect();

    assert_eq!(
        user_tables, EXPECTED_TABLES,
        "migration should create exactly the expected tables"
    );

    temp_pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (temp_pool, db_name) = create_test_db().await;

    pool::run_migrations(&temp_pool)
        .await
        .expect("second migration run should succeed (idempotent)");

    for table in EXPECTED_TABLES {
        let count = query_one_i32(&temp_pool, &format!("SELECT COUNT(*) AS cnt FROM {table}")).await;
        assert_eq!(count, 0, "table {table} should be empty after migrations");
    }

    temp_pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn pool_creates_and_destroys_cleanly() {
    let (temp_pool, db_name) = create_test_db().await;

    let one = query_one_i32(&temp_pool, "SELECT 1").await;
    assert_eq!(one, 1);

    temp_pool.close().await;

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn table_counts_returns_expected_tables() {
    let (temp_pool, db_name) = create_test_db().await;

    let counts = pool::table_counts(&temp_pool)
        .await
        .expect("table_counts should succeed");

    let user_counts: Vec<(&str, i64)> = counts
        .iter()
        .filter(|(name, _)| !name.starts_with("_sqlx"))
        .map(|(name, count)| (name.as_str(), *count))
        .collect();

    assert_eq!(user_counts.len(), EXPECTED_TABLES.len());
    for (name, count) in &user_counts {
        assert_eq!(*count, 0, "table {name} should be empty");
    }

    temp_pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_database_exists_is_idempotent() {
    let base_url = pg_url().await;
    let suffix: u64 = rand::random();
    let db_name = format!("orc_test_{suffix:016x}");
    let url = format!("{base_url}/{db_name}");
    let config = DbConfig::new(&url);

    pool::ensure_database_exists(&config)
        .await
        .expect("first ensure should succeed");

    pool::ensure_database_exists(&config)
        .await
        .expect("second ensure should succeed (idempotent)");

    drop_test_db(&db_name).await;
}
