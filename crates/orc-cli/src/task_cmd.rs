//! `orc task` subcommands: register/list/show/heartbeat/progress/pause/resume/unregister.

use anyhow::Result;
use chrono::Utc;
use orc_core::Orchestrator;

use crate::TaskCommands;

pub async fn run_task_command(command: TaskCommands, orchestrator: &Orchestrator) -> Result<()> {
    match command {
        TaskCommands::Register {
            task_id,
            task_type,
            subagent_name,
            project_id,
            description,
            initial_state,
        } => cmd_register(orchestrator, &task_id, &task_type, &subagent_name, project_id, description, initial_state).await,
        TaskCommands::List { project_id, subagent_name } => {
            cmd_list(orchestrator, project_id.as_deref(), subagent_name.as_deref()).await
        }
        TaskCommands::Show { task_id } => cmd_show(orchestrator, &task_id).await,
        TaskCommands::Heartbeat { task_id } => cmd_heartbeat(orchestrator, &task_id).await,
        TaskCommands::Progress { task_id, percentage } => cmd_progress(orchestrator, &task_id, percentage).await,
        TaskCommands::Pause { task_id } => cmd_pause(orchestrator, &task_id).await,
        TaskCommands::Resume { task_id } => cmd_resume(orchestrator, &task_id).await,
        TaskCommands::Unregister { task_id, final_state } => {
            cmd_unregister(orchestrator, &task_id, final_state.as_deref()).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_register(
    orchestrator: &Orchestrator,
    task_id: &str,
    task_type: &str,
    subagent_name: &str,
    project_id: Option<String>,
    description: Option<String>,
    initial_state: Option<String>,
) -> Result<()> {
    let task = orchestrator
        .register_task(
            task_id,
            task_type,
            subagent_name,
            project_id.as_deref(),
            description.as_deref(),
            initial_state.as_deref(),
            Utc::now(),
        )
        .await?;
    println!("Task {} registered ({}, subagent {})", task.task_id, task.task_type, task.subagent_name);
    Ok(())
}

async fn cmd_list(orchestrator: &Orchestrator, project_id: Option<&str>, subagent_name: Option<&str>) -> Result<()> {
    let tasks = orchestrator.get_active_tasks(project_id, subagent_name).await?;

    if tasks.is_empty() {
        println!("No active tasks found.");
        return Ok(());
    }

    println!("{:<24} {:<16} {:<20} {:<10} {:>8}", "TASK ID", "TYPE", "SUBAGENT", "STATUS", "PROGRESS");
    println!("{}", "-".repeat(82));
    for task in &tasks {
        println!(
            "{:<24} {:<16} {:<20} {:<10} {:>7}%",
            task.task_id, task.task_type, task.subagent_name, task.status, task.progress_percentage
        );
    }
    Ok(())
}

async fn cmd_show(orchestrator: &Orchestrator, task_id: &str) -> Result<()> {
    let tasks = orchestrator.get_active_tasks(None, None).await?;
    let task = tasks
        .into_iter()
        .find(|t| t.task_id == task_id)
        .ok_or_else(|| anyhow::anyhow!("task {task_id:?} not found"))?;

    println!("Task: {}", task.task_id);
    println!("Type: {}", task.task_type);
    println!("Subagent: {}", task.subagent_name);
    println!("Status: {}", task.status);
    println!("Progress: {}%", task.progress_percentage);
    println!("Started: {}", task.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Last heartbeat: {}", task.last_heartbeat.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(project_id) = &task.project_id {
        println!("Project: {project_id}");
    }
    if let Some(description) = &task.description {
        println!("Description: {description}");
    }
    if let Some(state) = &task.current_state {
        println!("Current state:\n{state}");
    }
    Ok(())
}

async fn cmd_heartbeat(orchestrator: &Orchestrator, task_id: &str) -> Result<()> {
    orchestrator.update_heartbeat(task_id, Utc::now()).await?;
    println!("Heartbeat recorded for {task_id}.");
    Ok(())
}

async fn cmd_progress(orchestrator: &Orchestrator, task_id: &str, percentage: i32) -> Result<()> {
    orchestrator.update_progress(task_id, percentage).await?;
    println!("Task {task_id} progress set to {percentage}%.");
    Ok(())
}

async fn cmd_pause(orchestrator: &Orchestrator, task_id: &str) -> Result<()> {
    if orchestrator.pause_task(task_id, Utc::now()).await? {
        println!("Task {task_id} paused.");
    } else {
        println!("Task {task_id} was not running; nothing to pause.");
    }
    Ok(())
}

async fn cmd_resume(orchestrator: &Orchestrator, task_id: &str) -> Result<()> {
    if orchestrator.resume_task(task_id).await? {
        println!("Task {task_id} resumed.");
    } else {
        println!("Task {task_id} was not paused; nothing to resume.");
    }
    Ok(())
}

async fn cmd_unregister(orchestrator: &Orchestrator, task_id: &str, final_state: Option<&str>) -> Result<()> {
    orchestrator.unregister_task(task_id, final_state).await?;
    println!("Task {task_id} unregistered.");
    Ok(())
}
