//! Periodic background jobs.
//!
//! Each job has its own ticker. A tick only enqueues the job when it is not
//! already waiting in the command queue, so a slow device never builds a
//! backlog ahead of `:` commands.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::device::Device;
use crate::session::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodicJob {
    /// Device snapshot → renderer info line.
    Dashboard,
    /// Cloud account link state → renderer.
    LinkCheck,
}

impl PeriodicJob {
    /// Default job table: dashboard every second, link check every 10 s.
    pub fn defaults() -> Vec<(PeriodicJob, Duration)> {
        vec![
            (Self::Dashboard, Duration::from_secs(1)),
            (Self::LinkCheck, Duration::from_secs(10)),
        ]
    }

    /// Run once. Failures are logged and otherwise ignored.
    pub async fn run(self, device: &dyn Device, renderer: &dyn Renderer) {
        match self {
            Self::Dashboard => match device.snapshot().await {
                Ok(snapshot) => renderer.update_info(&snapshot.summary()),
                Err(e) => debug!("device refresh failed: {e}"),
            },
            Self::LinkCheck => match device.account_state().await {
                Ok(state) => renderer.update_link(state.as_deref().unwrap_or("unknown")),
                Err(e) => debug!("link check failed: {e}"),
            },
        }
    }
}

impl fmt::Display for PeriodicJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dashboard => f.write_str("dashboard"),
            Self::LinkCheck => f.write_str("link_check"),
        }
    }
}

/// Jobs currently sitting in the command queue.
#[derive(Debug, Default)]
pub struct PendingJobs {
    queued: Mutex<HashSet<PeriodicJob>>,
}

impl PendingJobs {
    /// Mark `job` queued. Returns `false` when it already was.
    pub fn mark(&self, job: PeriodicJob) -> bool {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job)
    }

    /// Called when the queue takes `job` off.
    pub fn clear(&self, job: PeriodicJob) {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job);
    }
}
