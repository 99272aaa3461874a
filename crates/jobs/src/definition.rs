//! Job type definitions and the runnable capability interface.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Static description of a job type.
///
/// `blocking_types` declares other job types that must not be running for
/// this type to start. A type is always mutually exclusive with itself; it
/// does not need to list itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    job_type: String,
    job_name: String,
    description: String,
    blocking_types: BTreeSet<String>,
}

impl JobDefinition {
    pub fn new(job_type: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            job_name: job_name.into(),
            description: String::new(),
            blocking_types: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a job type that must not be running for this one to start.
    pub fn blocked_by(mut self, job_type: impl Into<String>) -> Self {
        self.blocking_types.insert(job_type.into());
        self
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn blocking_types(&self) -> &BTreeSet<String> {
        &self.blocking_types
    }

    /// All types whose run-lock must be free before this job may start:
    /// the declared blocking types plus the type itself.
    pub fn mutex_types(&self) -> BTreeSet<String> {
        let mut types = self.blocking_types.clone();
        types.insert(self.job_type.clone());
        types
    }
}

/// Failure raised by a job's business logic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct JobExecutionError {
    message: String,
}

impl JobExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A runnable job type: its definition plus the business logic.
///
/// `execute` returns `Ok(true)` when the job did work, `Ok(false)` when it
/// decided there was nothing to do this run (the record is marked skipped),
/// and `Err` when it failed (the record is marked errored). There is no
/// cooperative cancellation; once executing, the logic runs to completion.
pub trait JobRunnable: Send + Sync {
    fn definition(&self) -> &JobDefinition;

    fn execute(&self) -> Result<bool, JobExecutionError>;
}

impl<R> JobRunnable for std::sync::Arc<R>
where
    R: JobRunnable + ?Sized,
{
    fn definition(&self) -> &JobDefinition {
        (**self).definition()
    }

    fn execute(&self) -> Result<bool, JobExecutionError> {
        (**self).execute()
    }
}
