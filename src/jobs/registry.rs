//! In-memory job registry.
//!
//! Every read and mutation of a [`JobRecord`] goes through this type. The
//! lock is never held across an `.await`, so a std mutex is enough.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::{JobError, Result};
use super::record::{JobRecord, JobSnapshot};

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        // A panic inside a caller's closure leaves the map structurally valid.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a fully initialized record. Fails if the id is taken.
    pub fn create(&self, record: JobRecord) -> Result<()> {
        let mut jobs = self.lock();
        if jobs.contains_key(&record.id) {
            return Err(JobError::AlreadyExists(record.id));
        }
        jobs.insert(record.id.clone(), record);
        Ok(())
    }

    /// Runs `f` with exclusive access to the record and bumps `updated_at`.
    pub fn with_lock<R>(&self, id: &str, f: impl FnOnce(&mut JobRecord) -> R) -> Result<R> {
        let mut jobs = self.lock();
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let out = f(record);
        record.touch();
        Ok(out)
    }

    pub fn read(&self, id: &str) -> Result<JobRecord> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    pub fn snapshot(&self, id: &str) -> Result<JobSnapshot> {
        self.lock()
            .get(id)
            .map(JobRecord::snapshot)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Snapshot together with [`JobRecord::is_settled`], read under one lock.
    pub fn observe(&self, id: &str) -> Result<(JobSnapshot, bool)> {
        self.lock()
            .get(id)
            .map(|record| (record.snapshot(), record.is_settled()))
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of jobs that have not reached a terminal status.
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|record| !record.status.is_terminal())
            .count()
    }
}
