//! Job record storage abstraction.

use chrono::{DateTime, Utc};

use jobward_core::JobId;
use jobward_jobs::{JobInfo, JobMessage, JobStatus};

mod in_memory;

pub use in_memory::InMemoryJobRepository;

/// Storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence of job records in a document store.
///
/// Mutation operations addressing an unknown job id are silent no-ops; the
/// engine relies on that for idempotent stop/append/keep-alive calls racing
/// with concurrent deletion.
pub trait JobRepository: Send + Sync {
    /// Upsert the full record.
    fn create_or_update(&self, job: &JobInfo) -> Result<(), RepositoryError>;

    fn find_one(&self, job_id: &JobId) -> Result<Option<JobInfo>, RepositoryError>;

    fn find_all(&self) -> Result<Vec<JobInfo>, RepositoryError>;

    /// All records with the message log projected away (for listings).
    fn find_all_without_messages(&self) -> Result<Vec<JobInfo>, RepositoryError>;

    /// The latest `count` records of any type, newest started first.
    fn find_latest(&self, count: usize) -> Result<Vec<JobInfo>, RepositoryError>;

    /// The latest `count` records of one type, newest started first.
    fn find_latest_by(&self, job_type: &str, count: usize)
    -> Result<Vec<JobInfo>, RepositoryError>;

    /// The most recently started record of each distinct type.
    fn find_latest_distinct(&self) -> Result<Vec<JobInfo>, RepositoryError>;

    fn find_by_type(&self, job_type: &str) -> Result<Vec<JobInfo>, RepositoryError>;

    /// Records that are not stopped and whose `last_updated` is older than
    /// `cutoff`. This is the reaper's stall query.
    fn find_running_without_update_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobInfo>, RepositoryError>;

    fn find_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, RepositoryError>;

    /// Append to the record's message log. Missing id: no-op.
    fn append_message(&self, job_id: &JobId, message: &JobMessage) -> Result<(), RepositoryError>;

    /// Set the record's status. Missing id: no-op.
    fn set_job_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), RepositoryError>;

    /// Refresh the record's keep-alive timestamp. Missing id: no-op.
    fn set_last_updated(&self, job_id: &JobId, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Delete the record, but only once it is stopped. Running records and
    /// missing ids are left alone.
    fn remove_if_stopped(&self, job_id: &JobId) -> Result<(), RepositoryError>;

    fn size(&self) -> Result<usize, RepositoryError>;
}
