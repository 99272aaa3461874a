//! Runs one job on a worker thread.

use std::sync::{Arc, mpsc};
use std::thread;

use tracing::{error, info, warn};

use jobward_core::JobId;
use jobward_jobs::{JobMessage, JobRunnable, JobState};

use crate::pool::WorkerHandle;
use crate::service::JobService;

/// Executes a single job: reports the start, keeps the record's heartbeat
/// fresh while the business logic runs, and closes the record afterwards.
///
/// There is no cooperative cancellation: once `execute` is underway it runs
/// to completion, even if the reaper marks the record dead in the meantime.
pub struct JobRunner {
    job_id: JobId,
    runnable: Arc<dyn JobRunnable>,
    service: Arc<JobService>,
}

impl JobRunner {
    pub(crate) fn new(
        job_id: JobId,
        runnable: Arc<dyn JobRunnable>,
        service: Arc<JobService>,
    ) -> Self {
        Self {
            job_id,
            runnable,
            service,
        }
    }

    pub fn run(self) {
        let job_type = self.runnable.definition().job_type().to_string();
        info!(job_id = %self.job_id, job_type = %job_type, "job started");
        self.service
            .publish_state(self.job_id, &job_type, JobState::Started);

        let ticker = spawn_keep_alive(
            Arc::clone(&self.service),
            self.job_id,
            job_type.clone(),
        );

        let outcome = self.runnable.execute();

        ticker.shutdown();

        match outcome {
            Ok(true) => {}
            Ok(false) => {
                if let Err(err) = self.service.mark_skipped(&self.job_id) {
                    warn!(job_id = %self.job_id, error = %err, "failed to mark job skipped");
                }
            }
            Err(err) => {
                warn!(
                    job_id = %self.job_id,
                    job_type = %job_type,
                    error = %err,
                    "job execution failed"
                );
                let message = JobMessage::error(err.to_string(), self.service.now());
                if let Err(append_err) = self.service.append_message(&self.job_id, message) {
                    error!(
                        job_id = %self.job_id,
                        error = %append_err,
                        "failed to record job failure"
                    );
                }
            }
        }

        if let Err(err) = self.service.stop_job(&self.job_id) {
            error!(job_id = %self.job_id, error = %err, "failed to stop job record");
        }
        info!(job_id = %self.job_id, job_type = %job_type, "job finished");
    }
}

/// Heartbeat thread: refreshes the record's `last_updated` every ping period
/// until shut down, so the reaper can tell a busy job from a dead one.
fn spawn_keep_alive(service: Arc<JobService>, job_id: JobId, job_type: String) -> WorkerHandle {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let period = service.ping_interval();

    let join = thread::Builder::new()
        .name(format!("job-keepalive-{job_id}"))
        .spawn(move || {
            loop {
                match shutdown_rx.recv_timeout(period) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => match service.keep_alive(&job_id) {
                        Ok(()) => {
                            service.publish_state(job_id, &job_type, JobState::StillAlive);
                        }
                        Err(err) => {
                            warn!(job_id = %job_id, error = %err, "keep-alive failed");
                        }
                    },
                }
            }
        })
        .expect("failed to spawn keep-alive thread");

    WorkerHandle::new(shutdown_tx, join)
}
