//! In-memory run-lock registry for tests/dev.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use jobward_core::JobId;

use super::{Acquisition, BlockedReason, RegistryError, RunLockRegistry, RunningJob};

#[derive(Debug, Default)]
struct MetaState {
    running: BTreeMap<String, JobId>,
    disabled: BTreeSet<String>,
}

/// Run-lock registry backed by process memory.
///
/// A single mutex over both maps makes the check-disabled, check-blocking,
/// record-entry sequence indivisible, the same way the conditional update on
/// the shared registry document does in a real deployment.
#[derive(Debug, Default)]
pub struct InMemoryRunLockRegistry {
    state: Mutex<MetaState>,
}

impl InMemoryRunLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MetaState>, RegistryError> {
        self.state
            .lock()
            .map_err(|_| RegistryError::Storage("lock poisoned".to_string()))
    }
}

impl RunLockRegistry for InMemoryRunLockRegistry {
    fn try_acquire(
        &self,
        job_id: &JobId,
        job_type: &str,
        mutex_types: &BTreeSet<String>,
    ) -> Result<Acquisition, RegistryError> {
        let mut state = self.lock()?;

        if state.disabled.contains(job_type) {
            return Ok(Acquisition::Blocked(BlockedReason::Disabled));
        }
        if state.running.contains_key(job_type) {
            return Ok(Acquisition::Blocked(BlockedReason::AlreadyRunning));
        }
        for blocking in mutex_types {
            if blocking != job_type && state.running.contains_key(blocking) {
                return Ok(Acquisition::Blocked(BlockedReason::BlockedBy(
                    blocking.clone(),
                )));
            }
        }

        state.running.insert(job_type.to_string(), *job_id);
        Ok(Acquisition::Acquired)
    }

    fn release(&self, job_type: &str) -> Result<(), RegistryError> {
        self.lock()?.running.remove(job_type);
        Ok(())
    }

    fn running_jobs(&self) -> Result<Vec<RunningJob>, RegistryError> {
        Ok(self
            .lock()?
            .running
            .iter()
            .map(|(job_type, job_id)| RunningJob {
                job_id: *job_id,
                job_type: job_type.clone(),
            })
            .collect())
    }

    fn disable_job_type(&self, job_type: &str) -> Result<(), RegistryError> {
        self.lock()?.disabled.insert(job_type.to_string());
        Ok(())
    }

    fn enable_job_type(&self, job_type: &str) -> Result<(), RegistryError> {
        self.lock()?.disabled.remove(job_type);
        Ok(())
    }

    fn disabled_job_types(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.lock()?.disabled.iter().cloned().collect())
    }
}
