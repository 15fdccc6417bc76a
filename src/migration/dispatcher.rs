use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use super::models::JobRecord;
use super::retry::RetryController;
use super::store::JobStore;
use super::worker::MigrationWorker;

/// Admits pending jobs into execution on a fixed tick
///
/// # Concurrency Model
/// - One permit per running job, `max_concurrency` permits in total
/// - A tick takes a permit first and only then pops the queue, so the
///   ceiling can never be overshot
/// - Admission spawns the job and moves on; it never waits for it
/// - The permit is released after the job's final status transition
pub struct Dispatcher {
    jobs: Arc<JobStore>,
    worker: MigrationWorker,
    retry: RetryController,
    permits: Arc<Semaphore>,
    tick_interval: Duration,
    deciding: AtomicBool,
}

/// Clears the "deciding" flag however the tick ends
struct DecisionGuard<'a>(&'a AtomicBool);

impl Drop for DecisionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    pub fn new(
        jobs: Arc<JobStore>,
        worker: MigrationWorker,
        retry: RetryController,
        max_concurrency: usize,
        tick_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            worker,
            retry,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            tick_interval,
            deciding: AtomicBool::new(false),
        }
    }

    /// Tick until shutdown is signalled
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "Dispatcher started: tick every {:?}, up to {} concurrent jobs, {} attempts per job",
            self.tick_interval,
            self.permits.available_permits(),
            self.retry.max_retries()
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Dispatcher stopped admitting jobs");
    }

    /// One scheduling decision. Returns how many jobs were admitted.
    ///
    /// A tick that starts while another is still deciding does nothing.
    pub fn tick(&self) -> usize {
        if self
            .deciding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Dispatch decision already in progress, skipping tick");
            return 0;
        }
        let _guard = DecisionGuard(&self.deciding);

        let mut admitted = 0;
        loop {
            // ceiling reached
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            // queue drained; the permit goes back
            let Some(job) = self.jobs.claim_next() else {
                break;
            };

            admitted += 1;
            info!(job_id = %job.id, attempt = job.attempt_count + 1, "Admitted job");

            let worker = self.worker.clone();
            let retry = self.retry.clone();
            tokio::spawn(async move {
                execute(worker, retry, job).await;
                drop(permit);
            });
        }

        if admitted > 0 {
            debug!(
                "Admitted {} jobs, {} still queued, {} running",
                admitted,
                self.jobs.pending_len(),
                self.jobs.in_flight_len()
            );
        }
        admitted
    }
}

/// Run one attempt and route any failure, panics included, to the retry
/// controller
async fn execute(worker: MigrationWorker, retry: RetryController, job: JobRecord) {
    let id = job.id.clone();
    let attempt = tokio::spawn(async move { worker.run(&job).await });

    let reason = match attempt.await {
        Ok(Ok(_)) => return,
        Ok(Err(e)) => e.to_string(),
        Err(e) => {
            error!(job_id = %id, "Migration task aborted: {}", e);
            format!("migration task aborted: {}", e)
        }
    };
    retry.handle_failure(&id, &reason);
}
