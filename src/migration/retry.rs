use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

use super::models::JobId;
use super::store::{AttemptOutcome, JobStore};

/// How long a failed job waits before it re-enters the pending queue
pub trait RetryPolicy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Requeue right away; the next dispatcher tick picks the job up
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl RetryPolicy for Immediate {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// `base * 2^(attempt - 1)`
#[derive(Debug, Clone, Copy)]
pub struct Exponential {
    pub base: Duration,
}

impl RetryPolicy for Exponential {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exponent)
    }
}

/// Decides what happens to a job whose execution attempt failed
#[derive(Clone)]
pub struct RetryController {
    store: Arc<JobStore>,
    max_retries: u32,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryController {
    pub fn new(store: Arc<JobStore>, max_retries: u32, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            store,
            max_retries,
            policy,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Count the failed attempt, then requeue or fail the job for good
    pub fn handle_failure(&self, id: &JobId, reason: &str) -> Option<AttemptOutcome> {
        let next_attempt = self
            .store
            .get(id)
            .map_or(1, |record| record.attempt_count + 1);
        let delay = self.policy.delay(next_attempt);

        let outcome = self
            .store
            .record_failure(id, reason, self.max_retries, delay.is_zero());

        match outcome {
            Some(AttemptOutcome::Requeued { attempt, queued }) => {
                warn!(
                    job_id = %id,
                    attempt,
                    max_retries = self.max_retries,
                    "Migration attempt failed, requeueing: {}",
                    reason
                );
                if !queued {
                    let store = self.store.clone();
                    let id = id.clone();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        store.requeue(&id);
                    });
                }
            }
            Some(AttemptOutcome::Exhausted { attempt }) => {
                error!(
                    job_id = %id,
                    attempt,
                    "Migration failed permanently: {}",
                    reason
                );
            }
            None => warn!(job_id = %id, "Failure reported for a job that is not processing"),
        }

        outcome
    }
}
