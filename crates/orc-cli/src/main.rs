mod config;
mod job_cmd;
mod queue_cmd;
mod recover_cmd;
mod serve_cmd;
mod task_cmd;

#[cfg(test)]
mod test_util;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::ResolvedConfig;

#[derive(Parser)]
#[command(name = "orc", about = "Task and deployment orchestrator")]
struct Cli {
    /// Database URL (overrides DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database (if needed) and run migrations
    DbInit,
    /// Active task tracking
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Deployment queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Scheduled job registry
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Run startup recovery and print the resulting report
    Recover {
        /// Also purge checkpoints older than the configured retention window
        #[arg(long)]
        cleanup_checkpoints: bool,
    },
    /// Run the coordinator's background loops until interrupted
    Serve,
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Register a new active task
    Register {
        task_id: String,
        task_type: String,
        subagent_name: String,
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        initial_state: Option<String>,
    },
    /// List active tasks, optionally filtered
    List {
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long)]
        subagent_name: Option<String>,
    },
    /// Show the current state blob for a task
    Show { task_id: String },
    /// Record a heartbeat
    Heartbeat { task_id: String },
    /// Update progress percentage
    Progress { task_id: String, percentage: i32 },
    /// Pause a running task, checkpointing its state
    Pause { task_id: String },
    /// Resume a paused task, restoring its latest checkpoint
    Resume { task_id: String },
    /// Unregister a task, optionally recording a final state
    Unregister {
        task_id: String,
        #[arg(long)]
        final_state: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Queue a deployment
    Add {
        /// deploy, redeploy, restart, scale, rollback
        deployment_type: String,
        target_service: String,
        #[arg(long)]
        requested_by: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        /// low, normal, high, critical
        #[arg(long)]
        priority: Option<String>,
    },
    /// List all queued deployments
    List,
    /// Cancel a pending (not yet processing) item
    Cancel { queue_id: i64 },
    /// Reset every retry-eligible failed item back to pending
    RetryFailed,
    /// Reset a single failed item back to pending
    Retry { queue_id: i64 },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Register a scheduled job
    Register {
        job_id: String,
        job_name: String,
        /// Standard five-field cron expression
        cron_expression: String,
        #[arg(long)]
        auto_resume: bool,
    },
    /// List all scheduled jobs
    List,
    /// Enable or disable a scheduled job
    Toggle { job_id: String, enabled: bool },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Task { command } => {
            let (orchestrator, pool) = build_orchestrator(cli.database_url.as_deref()).await?;
            let result = task_cmd::run_task_command(command, &orchestrator).await;
            pool.close().await;
            result?;
        }
        Commands::Queue { command } => {
            let (orchestrator, pool) = build_orchestrator(cli.database_url.as_deref()).await?;
            let result = queue_cmd::run_queue_command(command, &orchestrator).await;
            pool.close().await;
            result?;
        }
        Commands::Job { command } => {
            let (orchestrator, pool) = build_orchestrator(cli.database_url.as_deref()).await?;
            let result = job_cmd::run_job_command(command, &orchestrator).await;
            pool.close().await;
            result?;
        }
        Commands::Recover { cleanup_checkpoints } => {
            let (orchestrator, pool) = build_orchestrator(cli.database_url.as_deref()).await?;
            let result = recover_cmd::run_recover(&orchestrator, cleanup_checkpoints).await;
            pool.close().await;
            result?;
        }
        Commands::Serve => {
            let (orchestrator, pool) = build_orchestrator(cli.database_url.as_deref()).await?;
            let result = serve_cmd::run_serve(&orchestrator).await;
            pool.close().await;
            result?;
        }
    }

    Ok(())
}

/// Resolve config, connect, and wire up an `Orchestrator` with the demo
/// executors/notifier. Every subcommand shares this so `orc serve` and
/// one-shot CLI calls see the same facade surface.
async fn build_orchestrator(
    cli_db_url: Option<&str>,
) -> anyhow::Result<(orc_core::Orchestrator, orc_db::pool::OrcPool)> {
    let resolved = ResolvedConfig::resolve(cli_db_url)?;
    let pool = orc_db::pool::create_pool(&resolved.db_config).await?;
    let orchestrator = orc_core::Orchestrator::builder(pool.clone(), resolved.orc_config)
        .with_deployment_executor(std::sync::Arc::new(serve_cmd::LoggingDeploymentExecutor))
        .with_job_executor(std::sync::Arc::new(serve_cmd::LoggingJobExecutor))
        .with_notification_handler(std::sync::Arc::new(serve_cmd::LoggingNotificationHandler))
        .build();
    Ok((orchestrator, pool))
}

/// `orc db-init`: create the database (postgres only) and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = ResolvedConfig::resolve(cli_db_url)?;

    println!("Initializing orchestrator database...");

    orc_db::pool::ensure_database_exists(&resolved.db_config)
        .await
        .context("failed to ensure database exists")?;

    let pool = orc_db::pool::create_pool(&resolved.db_config).await?;
    orc_db::pool::run_migrations(&pool).await?;

    let counts = orc_db::pool::table_counts(&pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    pool.close().await;
    println!("orc db-init complete.");
    Ok(())
}
