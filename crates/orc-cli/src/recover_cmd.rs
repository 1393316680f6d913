//! `orc recover`: run startup recovery and print the resulting report.

use anyhow::Result;
use chrono::Utc;
use orc_core::Orchestrator;

pub async fn run_recover(orchestrator: &Orchestrator, cleanup_checkpoints: bool) -> Result<()> {
    let report = orchestrator.recover_interrupted_tasks(Utc::now()).await?;
    print!("{}", report.render());

    if cleanup_checkpoints {
        let retention_days = orchestrator.config().checkpoint_retention_days;
        let purged = orchestrator.cleanup_old_checkpoints(retention_days, Utc::now()).await?;
        println!("purged {purged} checkpoint(s) older than {retention_days} day(s)");
    }

    Ok(())
}
