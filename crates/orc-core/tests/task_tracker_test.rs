//! Integration tests for the Task Tracker surface: registration, heartbeats,
//! progress, and the pause/resume checkpoint dance.

use chrono::{Duration, Utc};

use orc_core::TaskTracker;
use orc_db::models::{CheckpointType, TaskStatus};
use orc_test_utils::{create_test_db, drop_test_db};

struct TestDb {
    tracker: TaskTracker,
    db_name: String,
}

impl TestDb {
    async fn new() -> Self {
        let (pool, db_name) = create_test_db().await;
        Self {
            tracker: TaskTracker::new(pool),
            db_name,
        }
    }

    async fn teardown(self) {
        drop_test_db(&self.db_name).await;
    }
}

#[tokio::test]
async fn register_task_rejects_duplicate_task_id() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-1", "build", "agent-a", None, None, None, now)
        .await
        .expect("first registration should succeed");

    let err = db
        .tracker
        .register_task("t-1", "build", "agent-a", None, None, None, now)
        .await
        .expect_err("duplicate registration should fail");
    assert!(matches!(err, orc_core::OrchestratorError::DuplicateTask(id) if id == "t-1"));

    db.teardown().await;
}

#[tokio::test]
async fn progress_is_clamped_into_zero_to_one_hundred() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-2", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();

    db.tracker.update_progress("t-2", 150).await.unwrap();
    let task = db
        .tracker
        .get_active_tasks(None, None)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.task_id == "t-2")
        .unwrap();
    assert_eq!(task.progress_percentage, 100);

    db.tracker.update_progress("t-2", -20).await.unwrap();
    let task = db
        .tracker
        .get_active_tasks(None, None)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.task_id == "t-2")
        .unwrap();
    assert_eq!(task.progress_percentage, 0);

    db.teardown().await;
}

#[tokio::test]
async fn unregister_marks_task_completed_and_is_not_repeatable() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-3", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();
    db.tracker.unregister_task("t-3", Some("done")).await.unwrap();

    let err = db
        .tracker
        .unregister_task("does-not-exist", None)
        .await
        .expect_err("unregistering a missing task should fail");
    assert!(matches!(err, orc_core::OrchestratorError::TaskNotFound(_)));

    db.teardown().await;
}

#[tokio::test]
async fn pause_then_resume_round_trips_current_state() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-4", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();
    db.tracker.update_state("t-4", "step-3-of-7").await.unwrap();

    let paused = db.tracker.pause_task("t-4", now).await.unwrap();
    assert!(paused, "pausing a running task should succeed");

    let checkpoint = db
        .tracker
        .get_latest_checkpoint("t-4")
        .await
        .unwrap()
        .expect("pause_task should have written a checkpoint");
    assert_eq!(checkpoint.checkpoint_type, CheckpointType::PreDeploy);
    assert_eq!(checkpoint.serialized_state, "step-3-of-7");

    let resumed = db.tracker.resume_task("t-4").await.unwrap();
    assert!(resumed);

    let task = db
        .tracker
        .get_active_tasks(None, None)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.task_id == "t-4")
        .unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.current_state.as_deref(), Some("step-3-of-7"));

    db.teardown().await;
}

#[tokio::test]
async fn pause_on_non_running_task_is_a_no_op() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-5", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();
    db.tracker.pause_task("t-5", now).await.unwrap();

    // Already paused -- pausing again should report false, not error.
    let paused_again = db.tracker.pause_task("t-5", now).await.unwrap();
    assert!(!paused_again);

    db.teardown().await;
}

#[tokio::test]
async fn resume_without_prior_checkpoint_leaves_current_state_untouched() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-6", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();
    // No `update_state` call, so `current_state` is NULL when paused.
    db.tracker.pause_task("t-6", now).await.unwrap();
    db.tracker.resume_task("t-6").await.unwrap();

    let task = db
        .tracker
        .get_active_tasks(None, None)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.task_id == "t-6")
        .unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.current_state.is_none());

    db.teardown().await;
}

#[tokio::test]
async fn stale_sweeper_boundary_is_fresh_not_stale() {
    let db = TestDb::new().await;
    let now = Utc::now();

    db.tracker
        .register_task("t-7", "build", "agent-a", None, None, None, now)
        .await
        .unwrap();

    // Heartbeat exactly at the threshold boundary should be treated as fresh.
    let max_age = Duration::seconds(300);
    let swept = db.tracker.cleanup_stale_tasks(max_age, now + max_age).await.unwrap();
    assert_eq!(swept, 0, "heartbeat exactly at the threshold should not be swept");

    let swept = db
        .tracker
        .cleanup_stale_tasks(max_age, now + max_age + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(swept, 1, "heartbeat one second past the threshold should be swept");

    db.teardown().await;
}

#[tokio::test]
async fn pause_all_active_and_resume_all_paused_are_bulk_variants() {
    let db = TestDb::new().await;
    let now = Utc::now();

    for id in ["t-8", "t-9", "t-10"] {
        db.tracker
            .register_task(id, "build", "agent-a", None, None, None, now)
            .await
            .unwrap();
    }
    db.tracker.unregister_task("t-10", None).await.unwrap();

    let paused = db.tracker.pause_all_active(now).await.unwrap();
    assert_eq!(paused, 2, "only the two still-running tasks should be paused");

    let resumed = db.tracker.resume_all_paused().await.unwrap();
    assert_eq!(resumed, 2);

    db.teardown().await;
}
