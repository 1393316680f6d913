//! `orc serve`: run startup recovery, then the coordinator's background
//! loops until Ctrl-C.
//!
//! The demo executors below log what they would do rather than shelling out
//! to a real deployment or job system; a production deployment wires its own
//! `DeploymentExecutor`/`JobExecutor`/`NotificationHandler` in through
//! `OrchestratorBuilder` instead of going through this binary at all.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use orc_core::{DeploymentExecutor, JobExecutor, NotificationHandler, Orchestrator};
use orc_db::models::{DeploymentQueue, ScheduledJob};

pub struct LoggingDeploymentExecutor;

#[async_trait]
impl DeploymentExecutor for LoggingDeploymentExecutor {
    async fn execute(&self, item: &DeploymentQueue) -> Result<()> {
        tracing::info!(
            queue_id = item.id,
            deployment_type = %item.deployment_type,
            target_service = %item.target_service,
            "executing deployment"
        );
        Ok(())
    }
}

pub struct LoggingJobExecutor;

#[async_trait]
impl JobExecutor for LoggingJobExecutor {
    async fn execute(&self, job: &ScheduledJob, restored_state: Option<&str>) -> Result<()> {
        tracing::info!(
            job_id = %job.job_id,
            job_name = %job.job_name,
            restored = restored_state.is_some(),
            "executing scheduled job"
        );
        Ok(())
    }
}

pub struct LoggingNotificationHandler;

#[async_trait]
impl NotificationHandler for LoggingNotificationHandler {
    async fn notify(&self, user_id: &str, message: &str) {
        tracing::info!(user_id, message, "notification");
    }
}

pub async fn run_serve(orchestrator: &Orchestrator) -> Result<()> {
    let report = orchestrator.recover_interrupted_tasks(Utc::now()).await?;
    print!("{}", report.render());

    orchestrator.start();
    println!("orc serve running. Press Ctrl-C to stop.");

    shutdown_signal().await;

    println!("shutting down...");
    orchestrator.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}
