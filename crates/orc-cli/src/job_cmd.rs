//! `orc job` subcommands: register/list/toggle.

use anyhow::Result;
use chrono::Utc;
use orc_core::Orchestrator;

use crate::JobCommands;

pub async fn run_job_command(command: JobCommands, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        JobCommands::Register {
            job_id,
            job_name,
            cron_expression,
            auto_resume,
        } => cmd_register(orchestrator, &job_id, &job_name, &cron_expression, auto_resume).await,
        JobCommands::List => cmd_list(orchestrator).await,
        JobCommands::Toggle { job_id, enabled } => cmd_toggle(orchestrator, &job_id, enabled).await,
    }
}

async fn cmd_register(
    orchestrator: &Orchestrator,
    job_id: &str,
    job_name: &str,
    cron_expression: &str,
    auto_resume: bool,
) -> Result<()> {
    let job = orchestrator
        .register_scheduled_job(job_id, job_name, cron_expression, auto_resume, Utc::now())
        .await?;
    println!(
        "Job {} ({}) registered, next run at {}",
        job.job_id,
        job.job_name,
        job.next_run.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

async fn cmd_list(orchestrator: &Orchestrator) -> Result<()> {
    let jobs = orchestrator.list_scheduled_jobs().await?;

    if jobs.is_empty() {
        println!("No scheduled jobs found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<20} {:<16} {:<8} {:<8}",
        "JOB ID", "NAME", "CRON", "ENABLED", "RUNNING"
    );
    println!("{}", "-".repeat(76));
    for job in &jobs {
        println!(
            "{:<20} {:<20} {:<16} {:<8} {:<8}",
            job.job_id, job.job_name, job.cron_expression, job.is_enabled, job.is_running
        );
    }
    Ok(())
}

async fn cmd_toggle(orchestrator: &Orchestrator, job_id: &str, enabled: bool) -> Result<()> {
    orchestrator.toggle_scheduled_job(job_id, enabled, Utc::now()).await?;
    println!("Job {job_id} {}.", if enabled { "enabled" } else { "disabled" });
    Ok(())
}
