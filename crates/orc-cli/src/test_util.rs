//! Shared test helpers for serializing tests that mutate process-global
//! environment variables (`DATABASE_URL`, `HOME`, `XDG_CONFIG_HOME`, ...).

use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
