//! Numeric knobs for the coordinator's background loops and the stale-task
//! sweeper, each overridable by an env var and collected with sensible
//! production defaults.

use std::time::Duration;

/// Tuning parameters for the orchestrator core. Paired with `orc_db::config::DbConfig`
/// by the CLI's top-level config resolution.
#[derive(Debug, Clone, Copy)]
pub struct OrcConfig {
    /// How often the queue loop polls for the next pending deployment.
    pub queue_poll_interval: Duration,
    /// How often the scheduler loop checks for due jobs.
    pub scheduler_poll_interval: Duration,
    /// A running task with no heartbeat for longer than this is considered stale.
    pub stale_heartbeat_threshold: Duration,
    /// Inactive checkpoints older than this are eligible for cleanup.
    pub checkpoint_retention_days: i64,
    /// Default ceiling on `DeploymentQueue.retry_count` for newly queued items.
    pub max_retries: i32,
    /// Elapsed time after which an active task is flagged in status reports.
    pub active_task_warn_elapsed: Duration,
}

impl Default for OrcConfig {
    fn default() -> Self {
        Self {
            queue_poll_interval: Duration::from_secs(5),
            scheduler_poll_interval: Duration::from_secs(60),
            stale_heartbeat_threshold: Duration::from_secs(300),
            checkpoint_retention_days: 7,
            max_retries: 3,
            active_task_warn_elapsed: Duration::from_secs(300),
        }
    }
}

impl OrcConfig {
    /// Read each knob from its env var, falling back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_poll_interval: env_secs("ORC_QUEUE_POLL_INTERVAL_SECS", defaults.queue_poll_interval),
            scheduler_poll_interval: env_secs(
                "ORC_SCHEDULER_POLL_INTERVAL_SECS",
                defaults.scheduler_poll_interval,
            ),
            stale_heartbeat_threshold: env_secs(
                "ORC_STALE_HEARTBEAT_THRESHOLD_SECS",
                defaults.stale_heartbeat_threshold,
            ),
            checkpoint_retention_days: env_i64(
                "ORC_CHECKPOINT_RETENTION_DAYS",
                defaults.checkpoint_retention_days,
            ),
            max_retries: env_i32("ORC_MAX_RETRIES", defaults.max_retries),
            active_task_warn_elapsed: env_secs(
                "ORC_ACTIVE_TASK_WARN_ELAPSED_SECS",
                defaults.active_task_warn_elapsed,
            ),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = OrcConfig::default();
        assert_eq!(cfg.queue_poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.scheduler_poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.stale_heartbeat_threshold, Duration::from_secs(300));
        assert_eq!(cfg.checkpoint_retention_days, 7);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.active_task_warn_elapsed, Duration::from_secs(300));
    }

    #[test]
    fn env_override_parses_when_present() {
        assert_eq!(env_i32("ORC_NONEXISTENT_KNOB_XYZ", 3), 3);
        assert_eq!(env_i64("ORC_NONEXISTENT_KNOB_XYZ", 7), 7);
        assert_eq!(env_secs("ORC_NONEXISTENT_KNOB_XYZ", Duration::from_secs(5)), Duration::from_secs(5));
    }
}
