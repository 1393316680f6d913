//! Integration tests for the Queue Manager surface: priority ordering,
//! worker-count gating, and the queue item state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use orc_core::{ProceedCheck, QueueManager, WorkerCountCallback};
use orc_db::models::{DeploymentType, QueuePriority};
use orc_db::pool::OrcPool;
use orc_test_utils::{create_test_db, drop_test_db};

struct FixedWorkerCount(AtomicI64);

#[async_trait]
impl WorkerCountCallback for FixedWorkerCount {
    async fn active_worker_count(&self) -> Result<i64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

struct TestDb {
    pool: OrcPool,
    queue: QueueManager,
    db_name: String,
}

impl TestDb {
    async fn new(max_retries: i32) -> Self {
        let (pool, db_name) = create_test_db().await;
        Self {
            queue: QueueManager::new(pool.clone(), max_retries),
            pool,
            db_name,
        }
    }

    async fn teardown(self) {
        drop_test_db(&self.db_name).await;
    }
}

#[tokio::test]
async fn destructive_deployments_default_to_high_priority() {
    let db = TestDb::new(3).await;
    let now = Utc::now();

    let item = db
        .queue
        .add_to_queue(DeploymentType::Restart, "svc-a", None, None, None, None, now)
        .await
        .unwrap();
    assert_eq!(item.priority, QueuePriority::High);
    assert!(item.requires_state_pause);

    let item = db
        .queue
        .add_to_queue(DeploymentType::Deploy, "svc-a", None, None, None, None, now)
        .await
        .unwrap();
    assert_eq!(item.priority, QueuePriority::Normal);
    assert!(!item.requires_state_pause);

    db.teardown().await;
}

#[tokio::test]
async fn next_pending_breaks_ties_by_priority_then_recency() {
    let db = TestDb::new(3).await;
    let now = Utc::now();

    let low = db
        .queue
        .add_to_queue(
            DeploymentType::Deploy,
            "svc-low",
            None,
            None,
            Some(QueuePriority::Low),
            None,
            now,
        )
        .await
        .unwrap();
    let high_older = db
        .queue
        .add_to_queue(
            DeploymentType::Deploy,
            "svc-high-older",
            None,
            None,
            Some(QueuePriority::High),
            None,
            now - Duration::seconds(10),
        )
        .await
        .unwrap();
    let high_newer = db
        .queue
        .add_to_queue(
            DeploymentType::Deploy,
            "svc-high-newer",
            None,
            None,
            Some(QueuePriority::High),
            None,
            now,
        )
        .await
        .unwrap();

    let next = db.queue.get_next_pending(now).await.unwrap().unwrap();
    assert_eq!(next.id, high_newer.id, "higher priority and more recent wins");

    // Remove the winner from contention and confirm the tie-break chain.
    db.queue.cancel_queue_item(high_newer.id, now).await.unwrap();
    let next = db.queue.get_next_pending(now).await.unwrap().unwrap();
    assert_eq!(next.id, high_older.id);

    db.queue.cancel_queue_item(high_older.id, now).await.unwrap();
    let next = db.queue.get_next_pending(now).await.unwrap().unwrap();
    assert_eq!(next.id, low.id);

    db.teardown().await;
}

#[tokio::test]
async fn next_pending_ignores_items_scheduled_in_the_future() {
    let db = TestDb::new(3).await;
    let now = Utc::now();

    db.queue
        .add_to_queue(
            DeploymentType::Deploy,
            "svc-future",
            None,
            None,
            None,
            Some(now + Duration::hours(1)),
            now,
        )
        .await
        .unwrap();

    let next = db.queue.get_next_pending(now).await.unwrap();
    assert!(next.is_none(), "a future-scheduled item is not yet a candidate");

    db.teardown().await;
}

#[tokio::test]
async fn destructive_deployment_waits_while_workers_are_active() {
    let db = TestDb::new(3).await;
    let now = Utc::now();

    let item = db
        .queue
        .add_to_queue(DeploymentType::Redeploy, "svc-a", None, None, None, None, now)
        .await
        .unwrap();

    let workers = Arc::new(FixedWorkerCount(AtomicI64::new(2)));
    let gated_queue = QueueManager::new(db.pool.clone(), 3).with_worker_count_callback(workers.clone());

    let outcome = gated_queue.check_can_proceed(item.id).await.unwrap();
    assert_eq!(outcome, ProceedCheck::WaitingForWorkers);

    let requeued = gated_queue.get_queue_status().await.unwrap();
    let same_item = requeued.into_iter().find(|i| i.id == item.id).unwrap();
    assert_eq!(same_item.status, orc_db::models::QueueStatus::WaitingForWorkers);

    workers.0.store(0, Ordering::SeqCst);
    let outcome = gated_queue.check_can_proceed(item.id).await.unwrap();
    assert_eq!(outcome, ProceedCheck::Proceed);

    db.teardown().await;
}

#[tokio::test]
async fn non_destructive_deployment_proceeds_regardless_of_worker_count() {
    let db = TestDb::new(3).await;
    let now = Utc::now();

    let item = db
        .queue
        .add_to_queue(DeploymentType::Deploy, "svc-a", None, None, None, None, now)
        .await
        .unwrap();

    let workers = Arc::new(FixedWorkerCount(AtomicI64::new(5)));
    let gated_queue = QueueManager::new(db.pool.clone(), 3).with_worker_count_callback(workers);

    let outcome = gated_queue.check_can_proceed(item.id).await.unwrap();
    assert_eq!(outcome, ProceedCheck::Proceed);

    db.teardown().await;
}

#[tokio::test]
async fn retry_failed_items_resets_only_rows_under_their_retry_ceiling() {
    let db = TestDb::new(1).await;
    let now = Utc::now();

    let item = db
        .queue
        .add_to_queue(DeploymentType::Deploy, "svc-a", None, None, None, None, now)
        .await
        .unwrap();
    db.queue.mark_processing(item.id, now).await.unwrap();
    db.queue.mark_failed(item.id, now, "boom").await.unwrap();

    let reset = db.queue.retry_failed_items().await.unwrap();
    assert_eq!(reset, 1);

    let status = db
        .queue
        .get_queue_status()
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.id == item.id)
        .unwrap();
    assert_eq!(status.status, orc_db::models::QueueStatus::Pending);
    assert_eq!(status.retry_count, 1);

    db.teardown().await;
}

#[tokio::test]
async fn cancel_is_rejected_once_an_item_is_processing() {
    let db = TestDb::new(3).await;
    let now = Utc::now();

    let item = db
        .queue
        .add_to_queue(DeploymentType::Deploy, "svc-a", None, None, None, None, now)
        .await
        .unwrap();
    db.queue.mark_processing(item.id, now).await.unwrap();

    let err = db.queue.cancel_queue_item(item.id, now).await.expect_err("processing items can't be cancelled");
    assert!(matches!(err, orc_core::OrchestratorError::Database(_)));

    db.teardown().await;
}
