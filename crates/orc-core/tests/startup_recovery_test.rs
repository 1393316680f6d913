//! Integration tests for Startup Recovery: walking back `running` tasks and
//! `processing` queue items left behind by a crashed process.

use chrono::Utc;

use orc_core::{StartupRecovery, TaskTracker};
use orc_db::models::{CheckpointType, DeploymentType, QueueStatus, TaskStatus};
use orc_db::pool::OrcPool;
use orc_db::queries::{active_tasks, deployment_queue};
use orc_test_utils::{create_test_db, drop_test_db};

struct TestDb {
    pool: OrcPool,
    recovery: StartupRecovery,
    db_name: String,
}

impl TestDb {
    async fn new() -> Self {
        let (pool, db_name) = create_test_db().await;
        Self {
            recovery: StartupRecovery::new(pool.clone()),
            pool,
            db_name,
        }
    }

    async fn teardown(self) {
        drop_test_db(&self.db_name).await;
    }
}

#[tokio::test]
async fn recovery_pauses_running_tasks_with_state_and_checkpoints_them() {
    let db = TestDb::new().await;
    let now = Utc::now();

    let tracker = TaskTracker::new(db.pool.clone());
    tracker
        .register_task("orphan-1", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();
    tracker.update_state("orphan-1", "mid-flight").await.unwrap();

    let report = db.recovery.recover_interrupted_tasks(now).await.unwrap();
    assert_eq!(report.paused_tasks.len(), 1);
    assert_eq!(report.paused_tasks[0].task_id, "orphan-1");
    assert_eq!(report.paused_tasks[0].checkpoint_count, 1);

    let task = active_tasks::get_active_task(&db.pool, "orphan-1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Paused);

    let checkpoint = orc_db::queries::task_checkpoints::get_latest_active_checkpoint(&db.pool, "orphan-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.checkpoint_type, CheckpointType::Recovery);
    assert_eq!(checkpoint.serialized_state, "mid-flight");

    db.teardown().await;
}

#[tokio::test]
async fn recovery_fails_in_flight_deployments() {
    let db = TestDb::new().await;
    let now = Utc::now();

    let item = deployment_queue::insert_queue_item(
        &db.pool,
        DeploymentType::Deploy,
        "svc-a",
        orc_db::models::QueuePriority::Normal,
        None,
        None,
        None,
        now,
        3,
    )
    .await
    .unwrap();
    deployment_queue::set_processing(&db.pool, item.id, now).await.unwrap();

    let report = db.recovery.recover_interrupted_tasks(now).await.unwrap();
    assert_eq!(report.failed_deployments.len(), 1);
    assert_eq!(report.failed_deployments[0].queue_id, item.id);
    assert!(report.failed_deployments[0].retryable);

    let refreshed = deployment_queue::get_queue_item(&db.pool, item.id).await.unwrap().unwrap();
    assert_eq!(refreshed.status, QueueStatus::Failed);
    assert_eq!(refreshed.error_message.as_deref(), Some("Deployment interrupted by system restart"));

    db.teardown().await;
}

#[tokio::test]
async fn recovery_is_idempotent_on_an_already_clean_database() {
    let db = TestDb::new().await;
    let now = Utc::now();

    let first = db.recovery.recover_interrupted_tasks(now).await.unwrap();
    assert!(first.paused_tasks.is_empty());
    assert!(first.failed_deployments.is_empty());

    let second = db.recovery.recover_interrupted_tasks(now).await.unwrap();
    assert!(second.paused_tasks.is_empty());
    assert!(second.failed_deployments.is_empty());

    db.teardown().await;
}

#[tokio::test]
async fn get_recovery_report_does_not_mutate_state() {
    let db = TestDb::new().await;
    let now = Utc::now();

    let tracker = TaskTracker::new(db.pool.clone());
    tracker
        .register_task("orphan-2", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();
    db.recovery.recover_interrupted_tasks(now).await.unwrap();

    let report_a = db.recovery.get_recovery_report().await.unwrap();
    let report_b = db.recovery.get_recovery_report().await.unwrap();
    assert_eq!(report_a.paused_tasks.len(), report_b.paused_tasks.len());
    assert_eq!(report_a.paused_tasks.len(), 1);

    db.teardown().await;
}

#[tokio::test]
async fn cleanup_old_checkpoints_purges_only_inactive_rows_past_retention() {
    let db = TestDb::new().await;
    let now = Utc::now();

    let tracker = TaskTracker::new(db.pool.clone());
    tracker
        .register_task("t-checkpoints", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();

    let old_cutoff = now - chrono::Duration::days(10);
    let old = orc_db::queries::task_checkpoints::insert_checkpoint(
        &db.pool,
        "t-checkpoints",
        "old-state",
        CheckpointType::Manual,
        None,
        old_cutoff,
    )
    .await
    .unwrap();
    // Only inactive checkpoints are eligible for cleanup.
    orc_db::queries::task_checkpoints::deactivate_checkpoint(&db.pool, old.id)
        .await
        .unwrap();
    let recent = orc_db::queries::task_checkpoints::insert_checkpoint(
        &db.pool,
        "t-checkpoints",
        "recent-state",
        CheckpointType::Manual,
        None,
        now,
    )
    .await
    .unwrap();

    let purged = db.recovery.cleanup_old_checkpoints(7, now).await.unwrap();
    assert_eq!(purged, 1);

    let remaining = orc_db::queries::task_checkpoints::list_active_checkpoints(&db.pool, "t-checkpoints", i64::MAX)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, recent.id);

    db.teardown().await;
}
