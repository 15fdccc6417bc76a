use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use super::store::JobStore;

/// Evicts terminal jobs once they are older than the retention window
pub struct GarbageCollector {
    jobs: Arc<JobStore>,
    retention: chrono::Duration,
    sweep_interval: Duration,
}

impl GarbageCollector {
    pub fn new(jobs: Arc<JobStore>, retention: chrono::Duration, sweep_interval: Duration) -> Self {
        Self {
            jobs,
            retention,
            sweep_interval,
        }
    }

    /// Remove every completed or failed job that finished before
    /// `now - retention`. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let removed = self
            .jobs
            .list_terminal_older_than(cutoff)
            .iter()
            .filter(|id| self.jobs.remove_expired(id, cutoff))
            .count();

        if removed > 0 {
            info!("Garbage collected {} finished jobs", removed);
        } else {
            debug!("Garbage collection found nothing to remove");
        }
        removed
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "Garbage collector started: sweep every {:?}, retention {}h",
            self.sweep_interval,
            self.retention.num_hours()
        );

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(Utc::now());
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Garbage collector stopped");
    }
}
