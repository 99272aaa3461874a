//! In-memory job repository for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use jobward_core::JobId;
use jobward_jobs::{JobInfo, JobMessage, JobStatus};

use super::{JobRepository, RepositoryError};

/// In-memory document store stand-in.
///
/// Conditional mutations run under the write lock, which plays the role the
/// store's findOneAndUpdate-style primitives play in a real deployment.
/// Intended for tests/dev; not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, JobInfo>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, JobInfo>>, RepositoryError> {
        self.jobs
            .read()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, JobInfo>>, RepositoryError> {
        self.jobs
            .write()
            .map_err(|_| RepositoryError::Storage("lock poisoned".to_string()))
    }

    fn newest_first(mut jobs: Vec<JobInfo>) -> Vec<JobInfo> {
        jobs.sort_by(|a, b| b.started.cmp(&a.started));
        jobs
    }
}

impl JobRepository for InMemoryJobRepository {
    fn create_or_update(&self, job: &JobInfo) -> Result<(), RepositoryError> {
        self.write()?.insert(job.id, job.clone());
        Ok(())
    }

    fn find_one(&self, job_id: &JobId) -> Result<Option<JobInfo>, RepositoryError> {
        Ok(self.read()?.get(job_id).cloned())
    }

    fn find_all(&self) -> Result<Vec<JobInfo>, RepositoryError> {
        Ok(Self::newest_first(self.read()?.values().cloned().collect()))
    }

    fn find_all_without_messages(&self) -> Result<Vec<JobInfo>, RepositoryError> {
        Ok(Self::newest_first(
            self.read()?.values().map(JobInfo::without_messages).collect(),
        ))
    }

    fn find_latest(&self, count: usize) -> Result<Vec<JobInfo>, RepositoryError> {
        let mut jobs = self.find_all()?;
        jobs.truncate(count);
        Ok(jobs)
    }

    fn find_latest_by(
        &self,
        job_type: &str,
        count: usize,
    ) -> Result<Vec<JobInfo>, RepositoryError> {
        let mut jobs = self.find_by_type(job_type)?;
        jobs.truncate(count);
        Ok(jobs)
    }

    fn find_latest_distinct(&self) -> Result<Vec<JobInfo>, RepositoryError> {
        let jobs = self.read()?;
        let mut latest: HashMap<&str, &JobInfo> = HashMap::new();
        for job in jobs.values() {
            match latest.get(job.job_type.as_str()) {
                Some(existing) if existing.started >= job.started => {}
                _ => {
                    latest.insert(job.job_type.as_str(), job);
                }
            }
        }
        Ok(Self::newest_first(
            latest.into_values().cloned().collect(),
        ))
    }

    fn find_by_type(&self, job_type: &str) -> Result<Vec<JobInfo>, RepositoryError> {
        Ok(Self::newest_first(
            self.read()?
                .values()
                .filter(|j| j.job_type == job_type)
                .cloned()
                .collect(),
        ))
    }

    fn find_running_without_update_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobInfo>, RepositoryError> {
        Ok(self
            .read()?
            .values()
            .filter(|j| !j.is_stopped() && j.last_updated < cutoff)
            .cloned()
            .collect())
    }

    fn find_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, RepositoryError> {
        Ok(self.read()?.get(job_id).map(|j| j.status))
    }

    fn append_message(&self, job_id: &JobId, message: &JobMessage) -> Result<(), RepositoryError> {
        if let Some(job) = self.write()?.get_mut(job_id) {
            job.append(message.clone());
        }
        Ok(())
    }

    fn set_job_status(&self, job_id: &JobId, status: JobStatus) -> Result<(), RepositoryError> {
        if let Some(job) = self.write()?.get_mut(job_id) {
            job.set_status(status);
        }
        Ok(())
    }

    fn set_last_updated(&self, job_id: &JobId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(job) = self.write()?.get_mut(job_id) {
            job.touch(at);
        }
        Ok(())
    }

    fn remove_if_stopped(&self, job_id: &JobId) -> Result<(), RepositoryError> {
        let mut jobs = self.write()?;
        if jobs.get(job_id).is_some_and(JobInfo::is_stopped) {
            jobs.remove(job_id);
        }
        Ok(())
    }

    fn size(&self) -> Result<usize, RepositoryError> {
        Ok(self.read()?.len())
    }
}
