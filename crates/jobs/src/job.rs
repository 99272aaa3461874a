//! Job records and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobward_core::JobId;

use crate::message::JobMessage;

/// Status of a job execution.
///
/// Status alone does not make a job terminal; a job is finished iff its
/// `stopped` timestamp is set. `Error` and `Skipped` jobs keep running until
/// stopped, and the reaper marks stalled jobs `Dead` while stopping them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ok,
    Error,
    Skipped,
    Dead,
}

/// One record per job execution.
///
/// Created when a job starts, mutated in place while it runs (message
/// appends, status changes, keep-alive touches), closed by setting `stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub job_type: String,
    pub started: DateTime<Utc>,
    pub stopped: Option<DateTime<Utc>>,
    pub messages: Vec<JobMessage>,
    pub status: JobStatus,
    pub last_updated: DateTime<Utc>,
    pub hostname: String,
}

impl JobInfo {
    pub fn new(
        id: JobId,
        job_type: impl Into<String>,
        now: DateTime<Utc>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            id,
            job_type: job_type.into(),
            started: now,
            stopped: None,
            messages: Vec::new(),
            status: JobStatus::Ok,
            last_updated: now,
            hostname: hostname.into(),
        }
    }

    /// A job is terminal iff it has a stop timestamp.
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    /// Refresh the keep-alive timestamp.
    ///
    /// `last_updated` never moves backwards, even if the given instant does.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated = self.last_updated.max(at);
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    /// Append to the message log. Ordering is append order, not timestamp
    /// order.
    pub fn append(&mut self, message: JobMessage) {
        self.messages.push(message);
    }

    /// Close the record: set `stopped`, refresh `last_updated`, and override
    /// the status when one is given (otherwise the last known status stands).
    pub fn stop(&mut self, at: DateTime<Utc>, status: Option<JobStatus>) {
        self.stopped = Some(at);
        self.touch(at);
        if let Some(status) = status {
            self.status = status;
        }
    }

    /// Projection used for listings: the same record with the message log
    /// left out.
    pub fn without_messages(&self) -> JobInfo {
        JobInfo {
            messages: Vec::new(),
            ..self.clone()
        }
    }
}
