//! Run-lock registry: per-type mutual exclusion and disabled-type toggles.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use jobward_core::JobId;

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use in_memory::InMemoryRunLockRegistry;
#[cfg(feature = "redis")]
pub use redis::RedisRunLockRegistry;

/// One entry in the run-lock snapshot: a type and the job currently holding
/// its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningJob {
    pub job_id: JobId,
    pub job_type: String,
}

/// Why an acquisition attempt did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockedReason {
    /// The type is administratively disabled.
    Disabled,
    /// The same type already holds its run-lock.
    AlreadyRunning,
    /// A declared blocking type holds its run-lock.
    BlockedBy(String),
}

impl core::fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BlockedReason::Disabled => write!(f, "disabled"),
            BlockedReason::AlreadyRunning => write!(f, "already running"),
            BlockedReason::BlockedBy(job_type) => write!(f, "blocked by '{job_type}'"),
        }
    }
}

/// Outcome of an acquisition attempt. Being blocked is a normal outcome, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired,
    Blocked(BlockedReason),
}

/// Registry storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Cross-instance mutual exclusion for job types.
///
/// The registry is conceptually one shared document mapping job type to the
/// id of the job holding its run-lock, plus a set of administratively
/// disabled types. Presence of an entry is the sole truth for "may this type
/// start".
pub trait RunLockRegistry: Send + Sync {
    /// Attempt to record `job_type -> job_id`, conditioned on the type not
    /// being disabled and none of `mutex_types` (the declared blocking types
    /// plus the type itself) currently holding a lock.
    ///
    /// The checks and the write must be one indivisible storage operation;
    /// a read-then-write sequence is not an acceptable implementation, since
    /// arbitrary callers race across process boundaries.
    fn try_acquire(
        &self,
        job_id: &JobId,
        job_type: &str,
        mutex_types: &BTreeSet<String>,
    ) -> Result<Acquisition, RegistryError>;

    /// Release the run-lock for a type. Releasing a type with no current
    /// entry is a no-op, not an error.
    fn release(&self, job_type: &str) -> Result<(), RegistryError>;

    /// Snapshot of all current lock entries.
    fn running_jobs(&self) -> Result<Vec<RunningJob>, RegistryError>;

    /// Administratively prevent a type from starting.
    fn disable_job_type(&self, job_type: &str) -> Result<(), RegistryError>;

    /// Lift an administrative disable. Unknown types are a no-op.
    fn enable_job_type(&self, job_type: &str) -> Result<(), RegistryError>;

    fn disabled_job_types(&self) -> Result<Vec<String>, RegistryError>;
}
