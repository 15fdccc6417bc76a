pub mod dispatcher;
pub mod dto;
pub mod gc;
pub mod handlers;
pub mod models;
pub mod retry;
pub mod service;
pub mod store;
pub mod worker;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::registry::CredentialRegistry;
use crate::storage::ObjectStore;
use dispatcher::Dispatcher;
use gc::GarbageCollector;
use retry::{Exponential, Immediate, RetryController, RetryPolicy};
use service::MigrationService;
use store::JobStore;
use worker::MigrationWorker;

/// The wired-up migration engine: service for callers, background loops
/// for scheduling and eviction
pub struct Engine {
    pub service: Arc<MigrationService>,
    dispatcher: Arc<Dispatcher>,
    gc: GarbageCollector,
}

impl Engine {
    pub fn new(
        config: &Config,
        objects: Arc<dyn ObjectStore>,
        registry: Arc<dyn CredentialRegistry>,
    ) -> Self {
        let jobs = Arc::new(JobStore::new());

        let policy: Arc<dyn RetryPolicy> = if config.retry_backoff.is_zero() {
            Arc::new(Immediate)
        } else {
            Arc::new(Exponential {
                base: config.retry_backoff,
            })
        };
        let retry = RetryController::new(jobs.clone(), config.max_retries, policy);

        let worker = MigrationWorker::new(
            objects,
            registry.clone(),
            jobs.clone(),
            config.migration.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            jobs.clone(),
            worker,
            retry,
            config.max_concurrent_jobs,
            config.dispatch_interval,
        ));

        let retention = chrono::Duration::from_std(config.job_retention)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let gc = GarbageCollector::new(jobs.clone(), retention, config.gc_interval);

        let service = Arc::new(MigrationService::new(
            jobs,
            registry,
            config.max_concurrent_jobs,
        ));

        Self {
            service,
            dispatcher,
            gc,
        }
    }

    /// Spawn the dispatcher and garbage collector loops
    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.dispatcher.run(shutdown_rx.clone())),
            tokio::spawn(self.gc.run(shutdown_rx)),
        ]
    }
}
