//! Process memory guard for batch runs.
//!
//! Long rebuild/sync sweeps are aborted once resident memory crosses a
//! configured share of the configured limit. Unlike per-item failures this
//! error always propagates to the sweep caller.

use sysinfo::System;
use thiserror::Error;

/// Raised when process memory exceeds the configured bound. Fatal for the
/// whole batch run.
#[derive(Debug, Error)]
#[error("process memory {used_mb} MiB exceeds allowed {allowed_mb} MiB")]
pub struct MemoryOutOfBounds {
    pub used_mb: u64,
    pub allowed_mb: u64,
}

/// Checks resident memory against `limit_mb * max_percent`.
#[derive(Debug, Clone, Copy)]
pub struct MemoryGuard {
    limit_mb: u64,
    max_percent: f64,
}

impl MemoryGuard {
    /// A guard allowing `max_percent` of `limit_mb` mebibytes.
    #[must_use]
    pub const fn new(limit_mb: u64, max_percent: f64) -> Self {
        Self {
            limit_mb,
            max_percent,
        }
    }

    /// A guard that never trips; used where the caller opts out.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            limit_mb: u64::MAX,
            max_percent: 100.0,
        }
    }

    /// Allowed resident size in bytes.
    #[must_use]
    fn allowed_bytes(&self) -> u64 {
        let limit_bytes = self.limit_mb.saturating_mul(1024 * 1024);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            (limit_bytes as f64 * (self.max_percent / 100.0)) as u64
        }
    }

    fn exceeded(&self, used_bytes: u64) -> Option<MemoryOutOfBounds> {
        let allowed = self.allowed_bytes();
        if used_bytes > allowed {
            Some(MemoryOutOfBounds {
                used_mb: used_bytes / (1024 * 1024),
                allowed_mb: allowed / (1024 * 1024),
            })
        } else {
            None
        }
    }

    /// Check current resident memory.
    ///
    /// An unreadable RSS never aborts a run.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryOutOfBounds`] when the bound is crossed.
    pub fn check(&self) -> Result<(), MemoryOutOfBounds> {
        match current_rss_bytes() {
            Some(used) => match self.exceeded(used) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

fn current_rss_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_process(pid);
    system.process(pid).map(sysinfo::Process::memory)
}
