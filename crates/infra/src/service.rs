//! The job lifecycle engine.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use jobward_core::{Clock, JobId};
use jobward_jobs::{
    JobEvent, JobEventPublisher, JobInfo, JobMessage, JobRunnable, JobState, JobStatus, Level,
};
use jobward_observability::MetricsSink;

use crate::meta::{Acquisition, RegistryError, RunLockRegistry, RunningJob};
use crate::metered::MeteredRunnable;
use crate::pool::WorkerPool;
use crate::repository::{JobRepository, RepositoryError};
use crate::runner::JobRunner;

/// Default keep-alive ping period for running jobs.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct JobServiceConfig {
    /// How often running jobs refresh their keep-alive timestamp.
    pub ping_interval: Duration,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

impl JobServiceConfig {
    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }
}

/// Engine error.
#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    /// No runnable registered for the requested type. A caller programming
    /// error; being blocked is *not* this (a blocked start returns `None`).
    #[error("no runnable registered for job type '{0}'")]
    UnknownJobType(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Starts, tracks, locks, and times out named job types.
///
/// All methods are synchronous and safe to call concurrently from any number
/// of callers (request handlers, timers, the reaper). Cross-instance mutual
/// exclusion is delegated entirely to the registry's atomic acquisition; no
/// in-process lock is held across storage calls.
pub struct JobService {
    me: Weak<JobService>,
    repository: Arc<dyn JobRepository>,
    run_locks: Arc<dyn RunLockRegistry>,
    runnables: BTreeMap<String, Arc<dyn JobRunnable>>,
    pool: Arc<WorkerPool>,
    publisher: Arc<dyn JobEventPublisher>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    hostname: String,
    config: JobServiceConfig,
}

impl JobService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn JobRepository>,
        run_locks: Arc<dyn RunLockRegistry>,
        runnables: Vec<Arc<dyn JobRunnable>>,
        pool: Arc<WorkerPool>,
        publisher: Arc<dyn JobEventPublisher>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        hostname: impl Into<String>,
        config: JobServiceConfig,
    ) -> Arc<Self> {
        let runnables: BTreeMap<String, Arc<dyn JobRunnable>> = runnables
            .into_iter()
            .map(|r| (r.definition().job_type().to_ascii_lowercase(), r))
            .collect();

        info!(
            count = runnables.len(),
            types = ?runnables.keys().collect::<Vec<_>>(),
            "registered job runnables"
        );

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            repository,
            run_locks,
            runnables,
            pool,
            publisher,
            metrics,
            clock,
            hostname: hostname.into(),
            config,
        })
    }

    /// Start a job of the given type asynchronously.
    ///
    /// Returns the new job's id, or `None` when no job was started because
    /// the type is disabled, already running, or blocked by a declared
    /// blocking type. Unknown types are an error.
    pub fn start_job(&self, job_type: &str) -> Result<Option<JobId>, JobServiceError> {
        let runnable = self
            .runnable_for(job_type)
            .ok_or_else(|| JobServiceError::UnknownJobType(job_type.to_string()))?;
        let definition = runnable.definition().clone();

        let now = self.clock.now();
        let job = JobInfo::new(
            JobId::new(),
            definition.job_type(),
            now,
            self.hostname.clone(),
        );

        match self.run_locks.try_acquire(
            &job.id,
            definition.job_type(),
            &definition.mutex_types(),
        )? {
            Acquisition::Blocked(reason) => {
                info!(job_type = %definition.job_type(), %reason, "job not started");
                Ok(None)
            }
            Acquisition::Acquired => {
                // Acquire-then-persist: a crash between the two leaks a lock
                // that the consistency sweep reclaims. A plain persist error
                // is handled in-band by giving the lock straight back.
                if let Err(err) = self.repository.create_or_update(&job) {
                    if let Err(release_err) = self.run_locks.release(definition.job_type()) {
                        error!(
                            job_type = %definition.job_type(),
                            error = %release_err,
                            "failed to release run-lock after persist failure"
                        );
                    }
                    return Err(err.into());
                }

                self.publish_state(job.id, definition.job_type(), JobState::Created);
                self.dispatch(job.id, runnable);
                debug!(job_id = %job.id, job_type = %definition.job_type(), "job dispatched");
                Ok(Some(job.id))
            }
        }
    }

    /// Stop a job: release its type's run-lock and close the record,
    /// preserving the last known status. Unknown ids are a no-op.
    pub fn stop_job(&self, job_id: &JobId) -> Result<(), JobServiceError> {
        self.stop_job_with(job_id, None)
    }

    /// Stop a job as dead and note why on its message log.
    pub fn kill_job(&self, job_id: &JobId) -> Result<(), JobServiceError> {
        self.stop_job_with(job_id, Some(JobStatus::Dead))?;
        self.repository.append_message(
            job_id,
            &JobMessage::warning(
                "Job didn't receive updates for a while, considering it dead",
                self.clock.now(),
            ),
        )?;
        Ok(())
    }

    fn stop_job_with(
        &self,
        job_id: &JobId,
        status: Option<JobStatus>,
    ) -> Result<(), JobServiceError> {
        let Some(mut job) = self.repository.find_one(job_id)? else {
            return Ok(());
        };

        self.run_locks.release(&job.job_type)?;

        job.stop(self.clock.now(), status);
        self.repository.create_or_update(&job)?;

        let state = match status {
            Some(JobStatus::Dead) => JobState::Dead,
            _ => JobState::Stopped,
        };
        self.publish_state(job.id, &job.job_type, state);
        Ok(())
    }

    /// Append to a job's message log.
    ///
    /// An error-level message also flips the record's status to `Error` and
    /// refreshes `last_updated`; the append is written first so the message
    /// is never visible without the status change eventually following.
    pub fn append_message(
        &self,
        job_id: &JobId,
        message: JobMessage,
    ) -> Result<(), JobServiceError> {
        self.repository.append_message(job_id, &message)?;

        if message.level == Level::Error {
            if let Some(mut job) = self.repository.find_one(job_id)? {
                job.set_status(JobStatus::Error);
                job.touch(self.clock.now());
                self.repository.create_or_update(&job)?;
            }
        }

        self.publisher.publish(JobEvent::message(
            *job_id,
            message.level,
            message.text,
            message.timestamp,
        ));
        Ok(())
    }

    /// Refresh a job's keep-alive timestamp. Unknown ids are a no-op.
    pub fn keep_alive(&self, job_id: &JobId) -> Result<(), JobServiceError> {
        self.repository.set_last_updated(job_id, self.clock.now())?;
        Ok(())
    }

    /// Record that the job decided to skip this run.
    pub fn mark_skipped(&self, job_id: &JobId) -> Result<(), JobServiceError> {
        let now = self.clock.now();
        self.repository
            .append_message(job_id, &JobMessage::info("Skipped job ..", now))?;
        self.repository.set_last_updated(job_id, now)?;
        self.repository.set_job_status(job_id, JobStatus::Skipped)?;

        if let Some(job) = self.repository.find_one(job_id)? {
            self.publish_state(job.id, &job.job_type, JobState::Skipped);
        }
        Ok(())
    }

    /// Bring a previously skipped job back to normal running state.
    pub fn mark_restarted(&self, job_id: &JobId) -> Result<(), JobServiceError> {
        let now = self.clock.now();
        self.repository
            .append_message(job_id, &JobMessage::warning("Restarting job ..", now))?;
        self.repository.set_last_updated(job_id, now)?;
        self.repository.set_job_status(job_id, JobStatus::Ok)?;

        if let Some(job) = self.repository.find_one(job_id)? {
            self.publish_state(job.id, &job.job_type, JobState::Restarted);
        }
        Ok(())
    }

    /// The reaper: kill every running job whose keep-alive is older than
    /// `seconds`, then reconcile the run-lock registry against the records.
    ///
    /// Killing only updates the record and releases the lock; a handler
    /// thread still executing runs to completion independently.
    pub fn kill_jobs_dead_since(&self, seconds: i64) -> Result<(), JobServiceError> {
        let cutoff = self.clock.now() - chrono::Duration::seconds(seconds);
        info!(%cutoff, "job cleanup: looking for jobs without updates");

        for dead in self.repository.find_running_without_update_since(cutoff)? {
            self.kill_job(&dead.id)?;
        }

        self.clear_run_locks()
    }

    /// Release every lock entry whose job record is stopped or missing.
    ///
    /// Guards against leaks from a crash between lock acquisition and record
    /// persistence, or between stop and release. Safe to run concurrently
    /// with normal traffic; releasing an already-released lock is a no-op.
    fn clear_run_locks(&self) -> Result<(), JobServiceError> {
        for running in self.run_locks.running_jobs()? {
            match self.repository.find_one(&running.job_id)? {
                Some(job) if job.is_stopped() => {
                    self.run_locks.release(&running.job_type)?;
                    error!(
                        job_type = %running.job_type,
                        "cleared run-lock: job already stopped"
                    );
                }
                None => {
                    self.run_locks.release(&running.job_type)?;
                    error!(
                        job_type = %running.job_type,
                        job_id = %running.job_id,
                        "cleared run-lock: job record does not exist"
                    );
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn find_job(&self, job_id: &JobId) -> Result<Option<JobInfo>, JobServiceError> {
        Ok(self.repository.find_one(job_id)?)
    }

    /// The latest `count` jobs, optionally restricted to one type.
    pub fn find_jobs(
        &self,
        job_type: Option<&str>,
        count: usize,
    ) -> Result<Vec<JobInfo>, JobServiceError> {
        Ok(match job_type {
            Some(job_type) => self.repository.find_latest_by(job_type, count)?,
            None => self.repository.find_latest(count)?,
        })
    }

    /// The most recent job of each distinct type.
    pub fn find_jobs_distinct(&self) -> Result<Vec<JobInfo>, JobServiceError> {
        Ok(self.repository.find_latest_distinct()?)
    }

    pub fn find_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, JobServiceError> {
        Ok(self.repository.find_status(job_id)?)
    }

    /// Delete stopped job records, optionally restricted to one type.
    /// Running records are never deleted.
    pub fn delete_jobs(&self, job_type: Option<&str>) -> Result<(), JobServiceError> {
        let jobs = match job_type {
            Some(job_type) => self.repository.find_by_type(job_type)?,
            None => self.repository.find_all()?,
        };
        for job in jobs {
            self.repository.remove_if_stopped(&job.id)?;
        }
        Ok(())
    }

    pub fn running_jobs(&self) -> Result<Vec<RunningJob>, JobServiceError> {
        Ok(self.run_locks.running_jobs()?)
    }

    pub fn disable_job_type(&self, job_type: &str) -> Result<(), JobServiceError> {
        self.run_locks.disable_job_type(job_type)?;
        Ok(())
    }

    pub fn enable_job_type(&self, job_type: &str) -> Result<(), JobServiceError> {
        self.run_locks.enable_job_type(job_type)?;
        Ok(())
    }

    pub fn disabled_job_types(&self) -> Result<Vec<String>, JobServiceError> {
        Ok(self.run_locks.disabled_job_types()?)
    }

    /// Job types with a registered runnable.
    pub fn runnable_types(&self) -> Vec<String> {
        self.runnables
            .values()
            .map(|r| r.definition().job_type().to_string())
            .collect()
    }

    fn runnable_for(&self, job_type: &str) -> Option<Arc<dyn JobRunnable>> {
        self.runnables
            .get(&job_type.to_ascii_lowercase())
            .cloned()
    }

    fn dispatch(&self, job_id: JobId, runnable: Arc<dyn JobRunnable>) {
        let Some(service) = self.me.upgrade() else {
            warn!(%job_id, "engine dropped before dispatch");
            return;
        };

        let metered = Arc::new(MeteredRunnable::new(runnable, Arc::clone(&self.metrics)));
        self.pool
            .execute(move || JobRunner::new(job_id, metered, service).run());
    }

    pub(crate) fn publish_state(&self, job_id: JobId, job_type: &str, state: JobState) {
        self.publisher.publish(JobEvent::state_changed(
            job_id,
            job_type,
            state,
            self.clock.now(),
        ));
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::InMemoryRunLockRegistry;
    use crate::repository::InMemoryJobRepository;
    use jobward_core::ManualClock;
    use jobward_jobs::{JobDefinition, JobExecutionError, NullJobEventPublisher};
    use jobward_observability::InMemoryMetricsSink;
    use std::sync::{Mutex, mpsc};
    use std::thread;
    use std::time::Instant;

    struct InstantRunnable {
        definition: JobDefinition,
        outcome: Result<bool, JobExecutionError>,
    }

    impl InstantRunnable {
        fn ok(job_type: &str) -> Arc<Self> {
            Arc::new(Self {
                definition: JobDefinition::new(job_type, job_type),
                outcome: Ok(true),
            })
        }

        fn skipping(job_type: &str) -> Arc<Self> {
            Arc::new(Self {
                definition: JobDefinition::new(job_type, job_type),
                outcome: Ok(false),
            })
        }

        fn failing(job_type: &str, message: &str) -> Arc<Self> {
            Arc::new(Self {
                definition: JobDefinition::new(job_type, job_type),
                outcome: Err(JobExecutionError::new(message)),
            })
        }
    }

    impl JobRunnable for InstantRunnable {
        fn definition(&self) -> &JobDefinition {
            &self.definition
        }

        fn execute(&self) -> Result<bool, JobExecutionError> {
            self.outcome.clone()
        }
    }

    /// Blocks in `execute` until the test sends an outcome through the gate.
    struct GatedRunnable {
        definition: JobDefinition,
        gate: Mutex<mpsc::Receiver<Result<bool, JobExecutionError>>>,
    }

    impl GatedRunnable {
        fn new(
            definition: JobDefinition,
        ) -> (Arc<Self>, mpsc::Sender<Result<bool, JobExecutionError>>) {
            let (tx, rx) = mpsc::channel();
            (
                Arc::new(Self {
                    definition,
                    gate: Mutex::new(rx),
                }),
                tx,
            )
        }
    }

    impl JobRunnable for GatedRunnable {
        fn definition(&self) -> &JobDefinition {
            &self.definition
        }

        fn execute(&self) -> Result<bool, JobExecutionError> {
            self.gate.lock().unwrap().recv().unwrap_or(Ok(true))
        }
    }

    struct Harness {
        service: Arc<JobService>,
        repository: Arc<InMemoryJobRepository>,
        registry: Arc<InMemoryRunLockRegistry>,
        clock: Arc<ManualClock>,
        metrics: Arc<InMemoryMetricsSink>,
    }

    fn harness(runnables: Vec<Arc<dyn JobRunnable>>) -> Harness {
        let repository = InMemoryJobRepository::arc();
        let registry = InMemoryRunLockRegistry::arc();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let metrics = Arc::new(InMemoryMetricsSink::new());

        let service = JobService::new(
            repository.clone(),
            registry.clone(),
            runnables,
            WorkerPool::arc(2),
            Arc::new(NullJobEventPublisher),
            metrics.clone(),
            clock.clone(),
            "test-host",
            // Quiet ticker: tests drive keep-alive explicitly.
            JobServiceConfig::default().with_ping_interval(Duration::from_secs(3600)),
        );

        Harness {
            service,
            repository,
            registry,
            clock,
            metrics,
        }
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn wait_stopped(h: &Harness, job_id: &JobId) {
        assert!(
            wait_until(Duration::from_secs(5), || {
                h.repository
                    .find_one(job_id)
                    .unwrap()
                    .is_some_and(|j| j.is_stopped())
            }),
            "job never stopped"
        );
    }

    #[test]
    fn unknown_job_type_is_a_loud_error() {
        let h = harness(vec![]);

        let err = h.service.start_job("nope").unwrap_err();
        assert!(matches!(err, JobServiceError::UnknownJobType(t) if t == "nope"));
    }

    #[test]
    fn start_runs_to_completion_and_releases_the_lock() {
        let h = harness(vec![InstantRunnable::ok("import")]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");
        wait_stopped(&h, &job_id);

        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Ok);
        assert_eq!(job.hostname, "test-host");
        assert!(job.stopped.is_some());
        assert!(wait_until(Duration::from_secs(5), || {
            h.registry.running_jobs().unwrap().is_empty()
        }));
        assert!(
            h.metrics.gauge_value("jobs.runtime.import").is_some(),
            "runtime gauge missing"
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let h = harness(vec![InstantRunnable::ok("Import")]);

        let job_id = h.service.start_job("IMPORT").unwrap().expect("job id");
        wait_stopped(&h, &job_id);

        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.job_type, "Import");
    }

    #[test]
    fn concurrent_type_is_blocked_without_a_record() {
        let (runnable, gate) = GatedRunnable::new(JobDefinition::new("import", "Import"));
        let h = harness(vec![runnable]);

        let first = h.service.start_job("import").unwrap();
        assert!(first.is_some());

        let second = h.service.start_job("import").unwrap();
        assert!(second.is_none());
        assert_eq!(h.repository.size().unwrap(), 1);
        assert_eq!(h.registry.running_jobs().unwrap().len(), 1);

        gate.send(Ok(true)).unwrap();
        wait_stopped(&h, &first.unwrap());
    }

    #[test]
    fn disabled_type_is_blocked_until_enabled() {
        let h = harness(vec![InstantRunnable::ok("import")]);

        h.service.disable_job_type("import").unwrap();
        assert!(h.service.start_job("import").unwrap().is_none());
        assert_eq!(h.repository.size().unwrap(), 0);
        assert_eq!(h.service.disabled_job_types().unwrap(), vec!["import"]);

        h.service.enable_job_type("import").unwrap();
        let job_id = h.service.start_job("import").unwrap().expect("job id");
        wait_stopped(&h, &job_id);
    }

    #[test]
    fn declared_blocking_type_prevents_start() {
        let (export, gate) = GatedRunnable::new(JobDefinition::new("export", "Export"));
        let import = Arc::new(InstantRunnable {
            definition: JobDefinition::new("import", "Import").blocked_by("export"),
            outcome: Ok(true),
        });
        let h = harness(vec![export, import]);

        let export_id = h.service.start_job("export").unwrap().expect("job id");
        assert!(h.service.start_job("import").unwrap().is_none());

        gate.send(Ok(true)).unwrap();
        wait_stopped(&h, &export_id);
        assert!(wait_until(Duration::from_secs(5), || {
            h.registry.running_jobs().unwrap().is_empty()
        }));

        let import_id = h.service.start_job("import").unwrap().expect("job id");
        wait_stopped(&h, &import_id);
    }

    #[test]
    fn error_message_flips_status_and_touches_the_record() {
        let (runnable, gate) = GatedRunnable::new(JobDefinition::new("import", "Import"));
        let h = harness(vec![runnable]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");

        h.clock.advance(chrono::Duration::seconds(5));
        let at = h.clock.now();
        h.service
            .append_message(&job_id, JobMessage::error("row 17 unparsable", at))
            .unwrap();

        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.last_updated >= at);
        assert_eq!(job.messages.last().unwrap().text, "row 17 unparsable");

        // A later clean stop preserves the error status.
        gate.send(Ok(true)).unwrap();
        wait_stopped(&h, &job_id);
        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
    }

    #[test]
    fn info_message_does_not_change_status() {
        let (runnable, gate) = GatedRunnable::new(JobDefinition::new("import", "Import"));
        let h = harness(vec![runnable]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");
        h.service
            .append_message(&job_id, JobMessage::info("halfway", h.clock.now()))
            .unwrap();

        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Ok);

        gate.send(Ok(true)).unwrap();
        wait_stopped(&h, &job_id);
    }

    #[test]
    fn skipping_handler_marks_the_record_skipped() {
        let h = harness(vec![InstantRunnable::skipping("import")]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");
        wait_stopped(&h, &job_id);

        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Skipped);
        assert!(job.messages.iter().any(|m| m.text == "Skipped job .."));
    }

    #[test]
    fn failing_handler_marks_the_record_errored() {
        let h = harness(vec![InstantRunnable::failing("import", "disk full")]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");
        wait_stopped(&h, &job_id);

        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(
            job.messages
                .iter()
                .any(|m| m.level == Level::Error && m.text == "disk full")
        );
        assert!(h.registry.running_jobs().unwrap().is_empty());
    }

    #[test]
    fn keep_alive_refreshes_last_updated_only() {
        let (runnable, gate) = GatedRunnable::new(JobDefinition::new("import", "Import"));
        let h = harness(vec![runnable]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");
        let before = h.repository.find_one(&job_id).unwrap().unwrap();

        h.clock.advance(chrono::Duration::seconds(30));
        h.service.keep_alive(&job_id).unwrap();

        let after = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(after.last_updated - before.last_updated, chrono::Duration::seconds(30));
        assert_eq!(after.status, before.status);
        assert_eq!(after.started, before.started);

        gate.send(Ok(true)).unwrap();
        wait_stopped(&h, &job_id);
    }

    #[test]
    fn skip_and_restart_round_trip() {
        let (runnable, gate) = GatedRunnable::new(JobDefinition::new("import", "Import"));
        let h = harness(vec![runnable]);

        let job_id = h.service.start_job("import").unwrap().expect("job id");

        h.clock.advance(chrono::Duration::seconds(1));
        h.service.mark_skipped(&job_id).unwrap();
        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Skipped);
        let skipped_at = job.messages.last().unwrap().timestamp;
        assert_eq!(job.last_updated, skipped_at);

        h.clock.advance(chrono::Duration::seconds(1));
        h.service.mark_restarted(&job_id).unwrap();
        let job = h.repository.find_one(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Ok);
        assert!(job.messages.iter().any(|m| m.text == "Restarting job .."));

        gate.send(Ok(true)).unwrap();
        wait_stopped(&h, &job_id);
    }

    #[test]
    fn lifecycle_mutations_on_unknown_ids_are_no_ops() {
        let h = harness(vec![]);
        let ghost = JobId::new();

        h.service.stop_job(&ghost).unwrap();
        h.service.keep_alive(&ghost).unwrap();
        h.service.mark_skipped(&ghost).unwrap();
        h.service.mark_restarted(&ghost).unwrap();
        h.service
            .append_message(&ghost, JobMessage::info("x", Utc::now()))
            .unwrap();

        assert_eq!(h.repository.size().unwrap(), 0);
    }

    #[test]
    fn reaper_kills_stale_jobs_and_spares_fresh_ones() {
        let h = harness(vec![]);
        let now = h.clock.now();

        let stale = JobInfo::new(JobId::new(), "import", now, "test-host");
        let fresh = JobInfo::new(JobId::new(), "export", now, "test-host");
        h.repository.create_or_update(&stale).unwrap();
        h.repository.create_or_update(&fresh).unwrap();
        h.registry
            .try_acquire(&stale.id, "import", &Default::default())
            .unwrap();
        h.registry
            .try_acquire(&fresh.id, "export", &Default::default())
            .unwrap();

        h.clock.advance(chrono::Duration::seconds(120));
        h.service.keep_alive(&fresh.id).unwrap();
        h.clock.advance(chrono::Duration::seconds(10));

        h.service.kill_jobs_dead_since(60).unwrap();

        let dead = h.repository.find_one(&stale.id).unwrap().unwrap();
        assert_eq!(dead.status, JobStatus::Dead);
        assert!(dead.stopped.is_some());
        assert!(dead.messages.iter().any(|m| m.level == Level::Warning
            && m.text.contains("considering it dead")));

        let alive = h.repository.find_one(&fresh.id).unwrap().unwrap();
        assert_eq!(alive.status, JobStatus::Ok);
        assert!(alive.stopped.is_none());

        let locks = h.registry.running_jobs().unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].job_type, "export");
    }

    #[test]
    fn sweep_releases_locks_without_a_live_record() {
        let h = harness(vec![]);
        let now = h.clock.now();

        // Lock whose record was never persisted (crash window).
        h.registry
            .try_acquire(&JobId::new(), "import", &Default::default())
            .unwrap();

        // Lock whose record is already stopped.
        let mut finished = JobInfo::new(JobId::new(), "export", now, "test-host");
        finished.stop(now, None);
        h.repository.create_or_update(&finished).unwrap();
        h.registry
            .try_acquire(&finished.id, "export", &Default::default())
            .unwrap();

        h.service.kill_jobs_dead_since(60).unwrap();

        assert!(h.registry.running_jobs().unwrap().is_empty());

        // Running it again with nothing to do is harmless.
        h.service.kill_jobs_dead_since(60).unwrap();
    }

    #[test]
    fn delete_jobs_removes_only_stopped_records() {
        let h = harness(vec![]);
        let now = h.clock.now();

        let running = JobInfo::new(JobId::new(), "import", now, "test-host");
        let mut stopped_import = JobInfo::new(JobId::new(), "import", now, "test-host");
        stopped_import.stop(now, None);
        let mut stopped_export = JobInfo::new(JobId::new(), "export", now, "test-host");
        stopped_export.stop(now, None);

        h.repository.create_or_update(&running).unwrap();
        h.repository.create_or_update(&stopped_import).unwrap();
        h.repository.create_or_update(&stopped_export).unwrap();

        h.service.delete_jobs(Some("import")).unwrap();
        assert!(h.repository.find_one(&stopped_import.id).unwrap().is_none());
        assert!(h.repository.find_one(&running.id).unwrap().is_some());
        assert!(h.repository.find_one(&stopped_export.id).unwrap().is_some());

        h.service.delete_jobs(None).unwrap();
        assert!(h.repository.find_one(&stopped_export.id).unwrap().is_none());
        assert!(h.repository.find_one(&running.id).unwrap().is_some());
    }

    #[test]
    fn find_jobs_filters_and_limits() {
        let h = harness(vec![]);
        let t0 = h.clock.now();

        for i in 0..3i64 {
            let job = JobInfo::new(
                JobId::new(),
                "import",
                t0 + chrono::Duration::seconds(i),
                "test-host",
            );
            h.repository.create_or_update(&job).unwrap();
        }
        let export = JobInfo::new(
            JobId::new(),
            "export",
            t0 + chrono::Duration::seconds(10),
            "test-host",
        );
        h.repository.create_or_update(&export).unwrap();

        assert_eq!(h.service.find_jobs(None, 10).unwrap().len(), 4);
        assert_eq!(h.service.find_jobs(Some("import"), 2).unwrap().len(), 2);
        assert_eq!(h.service.find_jobs_distinct().unwrap().len(), 2);

        let latest = h.service.find_jobs(None, 1).unwrap();
        assert_eq!(latest[0].id, export.id);
    }
}
