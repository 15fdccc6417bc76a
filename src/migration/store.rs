use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::models::{
    JobId, JobRecord, JobStatus, MigrationPayload, MigrationResult, Progress, ProgressStep,
    QueueStats,
};

/// Result of recording a failed execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Back to `pending`. Already queued when `queued` is true.
    Requeued { attempt: u32, queued: bool },
    /// Retries exhausted, the job is now `failed`
    Exhausted { attempt: u32 },
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, JobRecord>,
    pending: VecDeque<JobId>,
    in_flight: HashSet<JobId>,
}

/// Job records plus the pending queue
///
/// Every mutation goes through this type and happens under one lock, so a
/// reader always sees a whole record. An id is in at most one of the pending
/// queue and the in-flight set, and in neither once the job is terminal.
#[derive(Default)]
pub struct JobStore {
    inner: Mutex<StoreInner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a pending record and append it to the queue.
    /// The payload must already be validated.
    pub fn submit(&self, payload: MigrationPayload) -> JobId {
        let mut inner = self.lock();
        let mut id = JobId::generate();
        while inner.jobs.contains_key(&id) {
            id = JobId::generate();
        }

        inner.jobs.insert(id.clone(), JobRecord::new(id.clone(), payload));
        inner.pending.push_back(id.clone());
        debug!(job_id = %id, "Job queued");
        id
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.lock().jobs.get(id).cloned()
    }

    /// Pop the oldest pending job and mark it `processing`
    pub fn claim_next(&self) -> Option<JobRecord> {
        let mut inner = self.lock();
        while let Some(id) = inner.pending.pop_front() {
            let Some(record) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if record.status != JobStatus::Pending {
                warn!(job_id = %id, status = ?record.status, "Skipping queued job that is not pending");
                continue;
            }

            record.status = JobStatus::Processing;
            record.started_at = Some(Utc::now());
            record.progress = Progress::new(ProgressStep::Scanning, "Starting migration", 0);
            let claimed = record.clone();
            inner.in_flight.insert(id);
            return Some(claimed);
        }
        None
    }

    /// Replace the progress of a job that is currently processing
    pub fn set_progress(&self, id: &JobId, progress: Progress) -> bool {
        let mut inner = self.lock();
        match inner.jobs.get_mut(id) {
            Some(record) if record.status == JobStatus::Processing => {
                record.progress = progress;
                true
            }
            _ => false,
        }
    }

    /// Processing to completed
    pub fn complete(&self, id: &JobId, result: MigrationResult, progress: Progress) -> bool {
        let mut inner = self.lock();
        let Some(record) = inner.jobs.get_mut(id) else {
            return false;
        };
        if record.status != JobStatus::Processing {
            return false;
        }

        record.status = JobStatus::Completed;
        record.result = Some(result);
        record.progress = progress;
        record.completed_at = Some(Utc::now());
        inner.in_flight.remove(id);
        true
    }

    /// Processing to pending (attempts left) or failed (attempts exhausted).
    ///
    /// With `queue_now` false a requeued job stays out of the pending queue
    /// until [`JobStore::requeue`] is called.
    pub fn record_failure(
        &self,
        id: &JobId,
        error: &str,
        max_retries: u32,
        queue_now: bool,
    ) -> Option<AttemptOutcome> {
        let mut inner = self.lock();
        let record = inner.jobs.get_mut(id)?;
        if record.status != JobStatus::Processing {
            return None;
        }

        record.attempt_count = (record.attempt_count + 1).min(max_retries);
        let attempt = record.attempt_count;

        let outcome = if attempt < max_retries {
            record.status = JobStatus::Pending;
            record.progress = Progress::new(
                ProgressStep::Retrying,
                format!("Attempt {} failed: {}", attempt, error),
                0,
            );
            AttemptOutcome::Requeued {
                attempt,
                queued: queue_now,
            }
        } else {
            let mut progress =
                Progress::new(ProgressStep::Failed, format!("Update failed: {}", error), 0);
            progress.total_objects = record.progress.total_objects;
            record.status = JobStatus::Failed;
            record.error = Some(error.to_string());
            record.completed_at = Some(Utc::now());
            record.progress = progress;
            AttemptOutcome::Exhausted { attempt }
        };

        inner.in_flight.remove(id);
        if queue_now && matches!(outcome, AttemptOutcome::Requeued { .. }) {
            inner.pending.push_back(id.clone());
        }
        Some(outcome)
    }

    /// Put a pending job that is neither queued nor running back on the queue
    pub fn requeue(&self, id: &JobId) -> bool {
        let mut inner = self.lock();
        let eligible = inner
            .jobs
            .get(id)
            .is_some_and(|record| record.status == JobStatus::Pending)
            && !inner.in_flight.contains(id)
            && !inner.pending.contains(id);
        if eligible {
            inner.pending.push_back(id.clone());
        }
        eligible
    }

    /// Terminal jobs that finished before `cutoff`
    pub fn list_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        self.lock()
            .jobs
            .values()
            .filter(|record| is_expired(record, cutoff))
            .map(|record| record.id.clone())
            .collect()
    }

    /// Delete a job if it is still terminal and older than `cutoff`
    pub fn remove_expired(&self, id: &JobId, cutoff: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let expired = inner
            .jobs
            .get(id)
            .is_some_and(|record| is_expired(record, cutoff));
        if expired {
            inner.jobs.remove(id);
        }
        expired
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn stats(&self, max_concurrency: usize) -> QueueStats {
        let inner = self.lock();
        let mut stats = QueueStats {
            total_jobs: inner.jobs.len(),
            max_concurrency,
            ..QueueStats::default()
        };

        for record in inner.jobs.values() {
            match record.status {
                JobStatus::Pending => stats.pending_jobs += 1,
                JobStatus::Processing => stats.processing_jobs += 1,
                JobStatus::Completed => stats.completed_jobs += 1,
                JobStatus::Failed => stats.failed_jobs += 1,
            }
        }
        stats
    }

    #[cfg(test)]
    pub fn backdate_completion(&self, id: &JobId, completed_at: DateTime<Utc>) {
        if let Some(record) = self.lock().jobs.get_mut(id) {
            record.completed_at = Some(completed_at);
        }
    }
}

fn is_expired(record: &JobRecord, cutoff: DateTime<Utc>) -> bool {
    record.status.is_terminal() && record.completed_at.is_some_and(|at| at < cutoff)
}
