//! Periodic dead-job sweep.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::pool::WorkerHandle;
use crate::service::JobService;

/// Reaper configuration.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often the sweep runs.
    pub sweep_interval: Duration,
    /// How stale a running job's keep-alive may get before it is killed.
    pub dead_after: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            dead_after: Duration::from_secs(600),
        }
    }
}

impl ReaperConfig {
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn with_dead_after(mut self, dead_after: Duration) -> Self {
        self.dead_after = dead_after;
        self
    }
}

/// Background worker that periodically kills stalled jobs and reconciles the
/// run-lock registry.
#[derive(Debug)]
pub struct ReaperWorker;

impl ReaperWorker {
    /// Spawn the sweep loop. Shut down via the returned handle.
    pub fn spawn(service: Arc<JobService>, config: ReaperConfig) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("job-reaper".to_string())
            .spawn(move || {
                info!(
                    sweep_interval_secs = config.sweep_interval.as_secs(),
                    dead_after_secs = config.dead_after.as_secs(),
                    "job reaper started"
                );
                let threshold = config.dead_after.as_secs() as i64;

                loop {
                    match shutdown_rx.recv_timeout(config.sweep_interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            if let Err(err) = service.kill_jobs_dead_since(threshold) {
                                error!(error = %err, "dead job sweep failed");
                            }
                        }
                    }
                }

                info!("job reaper stopped");
            })
            .expect("failed to spawn job reaper thread");

        WorkerHandle::new(shutdown_tx, join)
    }
}
