//! Hand-written query functions, one module per table.
//!
//! Every function takes `&OrcPool` and matches on the variant, issuing the
//! same operation against whichever concrete backend is active. Postgres and
//! SQLite use different placeholder syntax (`$1` vs `?`), so each match arm
//! carries its own SQL text even when the statement is otherwise identical.
//! Timestamps that matter to correctness ("now") are always passed in by the
//! caller rather than read from a SQL `now()`/`CURRENT_TIMESTAMP` function,
//! since the two dialects format it differently and tests need to control it.

pub mod active_tasks;
pub mod deployment_queue;
pub mod notification_log;
pub mod project_contexts;
pub mod scheduled_jobs;
pub mod task_checkpoints;
