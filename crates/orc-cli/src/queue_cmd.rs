//! `orc queue` subcommands: add/list/cancel/retry-failed/retry.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use orc_core::Orchestrator;
use orc_db::models::{DeploymentType, QueuePriority};

use crate::QueueCommands;

pub async fn run_queue_command(command: QueueCommands, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        QueueCommands::Add {
            deployment_type,
            target_service,
            requested_by,
            reason,
            priority,
        } => cmd_add(orchestrator, &deployment_type, &target_service, requested_by, reason, priority).await,
        QueueCommands::List => cmd_list(orchestrator).await,
        QueueCommands::Cancel { queue_id } => cmd_cancel(orchestrator, queue_id).await,
        QueueCommands::RetryFailed => cmd_retry_failed(orchestrator).await,
        QueueCommands::Retry { queue_id } => cmd_retry(orchestrator, queue_id).await,
    }
}

async fn cmd_add(
    orchestrator: &Orchestrator,
    deployment_type: &str,
    target_service: &str,
    requested_by: Option<String>,
    reason: Option<String>,
    priority: Option<String>,
) -> Result<()> {
    let deployment_type = DeploymentType::from_str(deployment_type)
        .with_context(|| format!("invalid deployment type: {deployment_type:?}"))?;
    let priority = priority
        .map(|p| QueuePriority::from_str(&p))
        .transpose()
        .with_context(|| "invalid priority")?;

    let item = orchestrator
        .queue_deployment(
            deployment_type,
            target_service,
            requested_by.as_deref(),
            reason.as_deref(),
            priority,
            None,
            Utc::now(),
        )
        .await?;

    println!(
        "Queued deployment #{}: {} on {} (priority {})",
        item.id, item.deployment_type, item.target_service, item.priority
    );
    Ok(())
}

async fn cmd_list(orchestrator: &Orchestrator) -> Result<()> {
    let items = orchestrator.get_queue_status().await?;

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<20} {:<20} {:<10}",
        "ID", "TYPE", "TARGET", "STATUS", "PRIORITY"
    );
    println!("{}", "-".repeat(68));
    for item in &items {
        println!(
            "{:<6} {:<10} {:<20} {:<20} {:<10}",
            item.id, item.deployment_type, item.target_service, item.status, item.priority
        );
    }
    Ok(())
}

async fn cmd_cancel(orchestrator: &Orchestrator, queue_id: i64) -> Result<()> {
    orchestrator.cancel_queue_item(queue_id, Utc::now()).await?;
    println!("Deployment #{queue_id} cancelled.");
    Ok(())
}

async fn cmd_retry_failed(orchestrator: &Orchestrator) -> Result<()> {
    let count = orchestrator.retry_failed_items().await?;
    println!("{count} failed deployment(s) reset to pending.");
    Ok(())
}

async fn cmd_retry(orchestrator: &Orchestrator, queue_id: i64) -> Result<()> {
    orchestrator.retry_deployment(queue_id).await?;
    println!("Deployment #{queue_id} reset to pending.");
    Ok(())
}
