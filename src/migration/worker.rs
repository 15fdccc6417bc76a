use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::models::{JobId, JobRecord, MigrationPayload, MigrationResult, Progress, ProgressStep};
use super::store::JobStore;
use crate::registry::{CredentialRegistry, RegistryError};
use crate::storage::{tenant_prefix, ObjectStore, StoreError};

/// Percentage reported when a scan starts
const SCAN_START: u8 = 10;
/// The scan phase never reports more than this
const SCAN_CAP: u8 = 19;
/// Objects scanned for the scan phase to reach its cap
const SCAN_FULL_SCALE: u64 = 50_000;
/// Where the update phase starts
const UPDATE_BASE: u8 = 20;
/// Headroom kept below 100 until the job is finished
const ERROR_MARGIN: u8 = 5;

/// Tuning for a single migration run
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Metadata field holding the credential
    pub credential_tag: String,
    pub batch_size: usize,
    /// Batches running at once within a wave
    pub concurrent_batches: usize,
    /// Pause between waves
    pub wave_delay: Duration,
    /// Metadata lookups in flight per listing page
    pub scan_concurrency: usize,
    /// Report scan progress every this many objects
    pub scan_progress_every: u64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            credential_tag: "api-key".to_string(),
            batch_size: 100,
            concurrent_batches: 5,
            wave_delay: Duration::from_secs(1),
            scan_concurrency: 64,
            scan_progress_every: 5000,
        }
    }
}

/// A failure of the whole execution attempt
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("failed to scan objects: {0}")]
    Scan(#[source] StoreError),

    #[error("failed to commit new credential: {0}")]
    Commit(#[from] RegistryError),
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchOutcome {
    updated: u64,
    failed: u64,
}

/// Runs one migration attempt: scan, rewrite in waves, commit
#[derive(Clone)]
pub struct MigrationWorker {
    objects: Arc<dyn ObjectStore>,
    registry: Arc<dyn CredentialRegistry>,
    jobs: Arc<JobStore>,
    settings: MigrationSettings,
}

impl MigrationWorker {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        registry: Arc<dyn CredentialRegistry>,
        jobs: Arc<JobStore>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            objects,
            registry,
            jobs,
            settings,
        }
    }

    /// Execute one attempt of `job`
    ///
    /// On success the job is already marked `completed` when this returns.
    /// Errors are left to the retry controller.
    pub async fn run(&self, job: &JobRecord) -> Result<MigrationResult, MigrationError> {
        let id = &job.id;
        let payload = &job.payload;
        info!(
            job_id = %id,
            tenant = %payload.tenant,
            attempt = job.attempt_count + 1,
            "Starting metadata migration"
        );

        self.report(
            id,
            Progress::new(ProgressStep::Scanning, "Scanning objects...", SCAN_START),
        );

        let candidates = self.find_candidates(id, payload).await?;

        let result = if candidates.is_empty() {
            info!(job_id = %id, "No objects found to update");
            MigrationResult::default()
        } else {
            info!(job_id = %id, "Found {} objects to update", candidates.len());
            self.rewrite_all(id, payload, candidates).await
        };

        self.registry
            .commit_new_credential(&payload.tenant, &payload.new_credential)
            .await?;

        let message = if result.total_objects == 0 {
            "No objects found to update"
        } else {
            "Metadata update completed successfully"
        };
        let mut progress = Progress::new(ProgressStep::Completed, message, 100);
        progress.total_objects = Some(result.total_objects);
        progress.total_processed = Some(result.total_objects);
        progress.total_updated = Some(result.total_updated);
        progress.total_failed = Some(result.total_failed);
        self.jobs.complete(id, result, progress);

        info!(
            job_id = %id,
            "Metadata migration completed. Processed: {}, Updated: {}, Failed: {}",
            result.total_objects,
            result.total_updated,
            result.total_failed
        );
        Ok(result)
    }

    fn report(&self, id: &JobId, progress: Progress) {
        if !self.jobs.set_progress(id, progress) {
            debug!(job_id = %id, "Dropped progress update for job that is no longer processing");
        }
    }

    /// Page through the tenant's namespace collecting keys still tagged with
    /// the old credential. Pages are sequential, lookups within a page are not.
    async fn find_candidates(
        &self,
        id: &JobId,
        payload: &MigrationPayload,
    ) -> Result<Vec<String>, MigrationError> {
        let prefix = tenant_prefix(&payload.tenant);
        let old_credential = payload.old_credential.as_str();
        let every = self.settings.scan_progress_every.max(1);

        let mut candidates = Vec::new();
        let mut token: Option<String> = None;
        let mut scanned: u64 = 0;
        let mut next_report = every;

        loop {
            let page = self
                .objects
                .list_objects(&prefix, token.as_deref())
                .await
                .map_err(MigrationError::Scan)?;

            scanned += page.objects.len() as u64;

            let checked: Vec<Option<String>> = stream::iter(page.objects)
                .map(|object| async move {
                    self.carries_credential(&object.key, old_credential)
                        .await
                        .map(|hit| hit.then_some(object.key))
                })
                .buffered(self.settings.scan_concurrency.max(1))
                .try_collect()
                .await
                .map_err(MigrationError::Scan)?;
            candidates.extend(checked.into_iter().flatten());

            if scanned >= next_report {
                let mut progress = Progress::new(
                    ProgressStep::Scanning,
                    format!(
                        "Scanned {} objects, found {} to update",
                        scanned,
                        candidates.len()
                    ),
                    scan_percentage(scanned),
                );
                progress.scanned_count = Some(scanned);
                progress.found_count = Some(candidates.len() as u64);
                self.report(id, progress);
                next_report = (scanned / every + 1) * every;
            }

            match page.next_token {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                Some(next) => {
                    warn!(job_id = %id, "Listing returned the same token twice ({}), stopping scan", next);
                    break;
                }
                None => break,
            }
        }

        debug!(job_id = %id, "Scan finished: {} scanned, {} candidates", scanned, candidates.len());
        Ok(candidates)
    }

    /// An object that vanished since listing is "not tagged". Any other
    /// lookup failure aborts the attempt.
    async fn carries_credential(&self, key: &str, credential: &str) -> Result<bool, StoreError> {
        match self.objects.get_metadata(key).await {
            Ok(Some(metadata)) => Ok(metadata
                .tags
                .get(&self.settings.credential_tag)
                .map(String::as_str)
                == Some(credential)),
            Ok(None) => Ok(false),
            Err(StoreError::NotFound(_)) => {
                debug!("{} disappeared during the scan", key);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Rewrite every candidate in waves of concurrent batches
    async fn rewrite_all(
        &self,
        id: &JobId,
        payload: &MigrationPayload,
        candidates: Vec<String>,
    ) -> MigrationResult {
        let total = candidates.len() as u64;
        let batches: Vec<Vec<String>> = candidates
            .chunks(self.settings.batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();
        let total_batches = batches.len();
        let wave_size = self.settings.concurrent_batches.max(1);

        let mut progress = Progress::new(
            ProgressStep::Updating,
            "Processing metadata updates...",
            UPDATE_BASE,
        );
        progress.total_objects = Some(total);
        progress.total_batches = Some(total_batches as u64);
        self.report(id, progress);

        let mut processed: u64 = 0;
        let mut updated: u64 = 0;
        let mut failed: u64 = 0;

        let waves: Vec<&[Vec<String>]> = batches.chunks(wave_size).collect();
        let wave_count = waves.len();

        for (wave_index, wave) in waves.into_iter().enumerate() {
            let first_batch = wave_index * wave_size;
            let handles = wave.iter().map(|batch| {
                tokio::spawn(rewrite_batch(
                    self.objects.clone(),
                    batch.clone(),
                    self.settings.credential_tag.clone(),
                    payload.new_credential.clone(),
                ))
            });
            let outcomes = join_all(handles).await;

            for (offset, (batch, outcome)) in wave.iter().zip(outcomes).enumerate() {
                let size = batch.len() as u64;
                processed += size;
                match outcome {
                    Ok(outcome) => {
                        updated += outcome.updated;
                        failed += outcome.failed;
                    }
                    Err(e) => {
                        failed += size;
                        error!(job_id = %id, "Batch {} failed: {}", first_batch + offset + 1, e);
                    }
                }
            }

            let done_batches = (first_batch + wave.len()).min(total_batches);
            let mut progress = Progress::new(
                ProgressStep::Updating,
                format!("Processing batch {} of {}", done_batches, total_batches),
                update_percentage(processed, total),
            );
            progress.total_objects = Some(total);
            progress.total_processed = Some(processed);
            progress.total_updated = Some(updated);
            progress.total_failed = Some(failed);
            progress.current_batch = Some(done_batches as u64);
            progress.total_batches = Some(total_batches as u64);
            self.report(id, progress);

            if wave_index + 1 < wave_count && !self.settings.wave_delay.is_zero() {
                sleep(self.settings.wave_delay).await;
            }
        }

        MigrationResult {
            total_objects: total,
            total_updated: updated,
            total_failed: failed,
        }
    }
}

async fn rewrite_batch(
    objects: Arc<dyn ObjectStore>,
    keys: Vec<String>,
    tag: String,
    credential: String,
) -> BatchOutcome {
    let results = join_all(
        keys.iter()
            .map(|key| rewrite_object(objects.as_ref(), key, &tag, &credential)),
    )
    .await;

    let mut outcome = BatchOutcome::default();
    for (key, result) in keys.iter().zip(results) {
        match result {
            Ok(()) => outcome.updated += 1,
            Err(e) => {
                warn!("Failed to update {}: {}", key, e);
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// Swap the credential tag of one object, keeping every other field and the
/// content type as they are
async fn rewrite_object(
    objects: &dyn ObjectStore,
    key: &str,
    tag: &str,
    credential: &str,
) -> Result<(), StoreError> {
    let metadata = objects
        .get_metadata(key)
        .await?
        .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
    if metadata.tags.is_empty() {
        return Err(StoreError::MissingMetadata(key.to_string()));
    }

    let mut tags = metadata.tags;
    tags.insert(tag.to_string(), credential.to_string());
    objects
        .replace_metadata(key, tags, metadata.content_type)
        .await
}

fn scan_percentage(scanned: u64) -> u8 {
    let grown = u64::from(SCAN_START) + scanned.saturating_mul(10) / SCAN_FULL_SCALE;
    grown.min(u64::from(SCAN_CAP)) as u8
}

fn update_percentage(processed: u64, total: u64) -> u8 {
    let cap = 100 - ERROR_MARGIN;
    if total == 0 {
        return cap;
    }
    let span = f64::from(100 - UPDATE_BASE - ERROR_MARGIN);
    let ratio = processed.min(total) as f64 / total as f64;
    let pct = UPDATE_BASE + (ratio * span).round() as u8;
    pct.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::models::JobStatus;
    use crate::registry::JsonFileRegistry;
    use crate::storage::memory::MemoryObjectStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    const TAG: &str = "api-key";

    /// Registry whose commits wait for `gate` to open
    struct GatedRegistry {
        inner: JsonFileRegistry,
        gate: Notify,
    }

    #[async_trait]
    impl CredentialRegistry for GatedRegistry {
        async fn commit_new_credential(
            &self,
            tenant: &str,
            credential: &str,
        ) -> Result<(), RegistryError> {
            self.gate.notified().await;
            self.inner.commit_new_credential(tenant, credential).await
        }

        fn find_tenant_by_credential(&self, credential: &str) -> Option<String> {
            self.inner.find_tenant_by_credential(credential)
        }
    }

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        registry: Arc<JsonFileRegistry>,
        jobs: Arc<JobStore>,
        worker: MigrationWorker,
    }

    fn harness(page_size: usize) -> Harness {
        let objects = Arc::new(MemoryObjectStore::new(page_size));
        let registry = Arc::new(JsonFileRegistry::in_memory([("gallery", "old")]));
        let jobs = Arc::new(JobStore::new());
        let settings = MigrationSettings {
            wave_delay: Duration::from_millis(10),
            ..MigrationSettings::default()
        };
        let worker = MigrationWorker::new(objects.clone(), registry.clone(), jobs.clone(), settings);
        Harness {
            objects,
            registry,
            jobs,
            worker,
        }
    }

    fn claim(jobs: &JobStore) -> JobRecord {
        jobs.submit(MigrationPayload {
            tenant: "gallery".into(),
            old_credential: "old".into(),
            new_credential: "new".into(),
        });
        jobs.claim_next().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn rewrites_matches_across_pages() {
        let h = harness(100);
        for i in 0..250 {
            h.objects.put_tagged(&format!("gallery/{:04}.webp", i), TAG, "old");
        }
        for i in 0..30 {
            h.objects.put_tagged(&format!("gallery/other-{:02}.webp", i), TAG, "someone-else");
            h.objects.put_tagged(&format!("archive/{:02}.webp", i), TAG, "old");
        }

        let job = claim(&h.jobs);
        let result = h.worker.run(&job).await.unwrap();

        assert_eq!(result.total_objects, 250);
        assert_eq!(result.total_updated, 250);
        assert_eq!(result.total_failed, 0);
        assert_eq!(h.objects.list_calls(), 3);
        assert_eq!(h.objects.count_tagged(TAG, "new"), 250);
        // other tenants stay untouched
        assert_eq!(h.objects.count_tagged(TAG, "old"), 30);

        let metadata = h.objects.metadata("gallery/0000.webp").unwrap();
        assert_eq!(metadata.tags["width"], "320");
        assert_eq!(metadata.content_type.as_deref(), Some("image/webp"));

        let record = h.jobs.get(&job.id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.result, Some(result));
        assert_eq!(record.progress.percentage, 100);
        assert_eq!(record.progress.total_batches, None);
        assert!(record.completed_at.is_some());
        assert_eq!(h.registry.find_tenant_by_credential("new").as_deref(), Some("gallery"));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_migrate_completes_empty() {
        let h = harness(100);
        h.objects.put_tagged("gallery/a.webp", TAG, "unrelated");

        let job = claim(&h.jobs);
        let result = h.worker.run(&job).await.unwrap();

        assert_eq!(result, MigrationResult::default());
        assert_eq!(h.objects.replace_calls(), 0);
        let record = h.jobs.get(&job.id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress.step, ProgressStep::Completed);
        assert_eq!(record.progress.message, "No objects found to update");
    }

    #[tokio::test(start_paused = true)]
    async fn object_failures_are_counted_not_fatal() {
        let h = harness(100);
        for i in 0..10 {
            h.objects.put_tagged(&format!("gallery/{}.webp", i), TAG, "old");
        }
        h.objects.fail_rewrites_for("gallery/3.webp");
        h.objects.fail_rewrites_for("gallery/7.webp");

        let job = claim(&h.jobs);
        let result = h.worker.run(&job).await.unwrap();

        assert_eq!(result.total_objects, 10);
        assert_eq!(result.total_updated, 8);
        assert_eq!(result.total_failed, 2);
        assert_eq!(h.jobs.get(&job.id).unwrap().status, JobStatus::Completed);
        assert_eq!(h.registry.find_tenant_by_credential("new").as_deref(), Some("gallery"));
    }

    #[tokio::test(start_paused = true)]
    async fn a_rejected_batch_fails_as_a_whole_and_later_waves_still_run() {
        let h = harness(1000);
        for i in 0..700 {
            h.objects.put_tagged(&format!("gallery/{:04}.webp", i), TAG, "old");
        }
        // first batch of the first wave
        h.objects.panic_on_rewrite_of("gallery/0050.webp");

        let job = claim(&h.jobs);
        let result = h.worker.run(&job).await.unwrap();

        assert_eq!(result.total_objects, 700);
        assert_eq!(result.total_failed, 100);
        assert_eq!(result.total_updated, 600);
        // the second wave (batches 6 and 7) ran after the failure
        let metadata = h.objects.metadata("gallery/0699.webp").unwrap();
        assert_eq!(metadata.tags[TAG], "new");
    }

    #[tokio::test(start_paused = true)]
    async fn objects_without_metadata_are_never_candidates() {
        let h = harness(100);
        h.objects.put_bare("gallery/bare.webp");
        h.objects.put_tagged("gallery/tagged.webp", TAG, "old");

        let job = claim(&h.jobs);
        let result = h.worker.run(&job).await.unwrap();
        assert_eq!(result.total_objects, 1);
        assert!(h.objects.metadata("gallery/bare.webp").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_finds_nothing() {
        let h = harness(50);
        for i in 0..120 {
            h.objects.put_tagged(&format!("gallery/{:03}.webp", i), TAG, "old");
        }

        let first = claim(&h.jobs);
        h.worker.run(&first).await.unwrap();

        let second = claim(&h.jobs);
        let result = h.worker.run(&second).await.unwrap();
        assert_eq!(result, MigrationResult::default());
        assert_eq!(h.objects.count_tagged(TAG, "old"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_failure_aborts_the_attempt() {
        let h = harness(100);
        h.objects.put_tagged("gallery/a.webp", TAG, "old");
        h.objects.fail_next_listings(1);

        let job = claim(&h.jobs);
        let err = h.worker.run(&job).await.unwrap_err();
        assert!(matches!(err, MigrationError::Scan(StoreError::Unavailable(_))));
        assert_eq!(h.jobs.get(&job.id).unwrap().status, JobStatus::Processing);
        assert_eq!(h.registry.find_tenant_by_credential("old").as_deref(), Some("gallery"));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_outage_aborts_the_attempt() {
        let h = harness(100);
        for i in 0..10 {
            h.objects.put_tagged(&format!("gallery/{}.webp", i), TAG, "old");
        }
        h.objects.fail_metadata_lookups(true);

        let job = claim(&h.jobs);
        let err = h.worker.run(&job).await.unwrap_err();

        assert!(matches!(err, MigrationError::Scan(StoreError::Unavailable(_))));
        assert_eq!(h.objects.replace_calls(), 0);
        assert_eq!(h.jobs.get(&job.id).unwrap().status, JobStatus::Processing);
        assert_eq!(h.registry.find_tenant_by_credential("old").as_deref(), Some("gallery"));
        assert!(h.registry.find_tenant_by_credential("new").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_lost_before_rewrite_counts_as_a_failure() {
        let h = harness(100);
        for i in 0..5 {
            h.objects.put_tagged(&format!("gallery/{}.webp", i), TAG, "old");
        }
        h.objects.drop_metadata_after_first_read("gallery/2.webp");

        let job = claim(&h.jobs);
        let result = h.worker.run(&job).await.unwrap();

        assert_eq!(result.total_objects, 5);
        assert_eq!(result.total_updated, 4);
        assert_eq!(result.total_failed, 1);
        assert!(h.objects.metadata("gallery/2.webp").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn waves_are_paced_and_progress_counts_batches() {
        let objects = Arc::new(MemoryObjectStore::new(100));
        for i in 0..250 {
            objects.put_tagged(&format!("gallery/{:03}.webp", i), TAG, "old");
        }
        let jobs = Arc::new(JobStore::new());
        let settings = MigrationSettings {
            concurrent_batches: 1,
            wave_delay: Duration::from_secs(1),
            ..MigrationSettings::default()
        };
        let worker = MigrationWorker::new(
            objects.clone(),
            Arc::new(JsonFileRegistry::in_memory([("gallery", "old")])),
            jobs.clone(),
            settings,
        );

        let job = claim(&jobs);
        let id = job.id.clone();
        let started = Instant::now();
        let run = tokio::spawn(async move { worker.run(&job).await });

        sleep(Duration::from_millis(500)).await;
        let progress = jobs.get(&id).unwrap().progress;
        assert_eq!(progress.step, ProgressStep::Updating);
        assert_eq!(progress.current_batch, Some(1));
        assert_eq!(progress.total_batches, Some(3));
        assert_eq!(progress.total_processed, Some(100));

        sleep(Duration::from_secs(1)).await;
        let progress = jobs.get(&id).unwrap().progress;
        assert_eq!(progress.current_batch, Some(2));
        assert!(progress.percentage < 100 - ERROR_MARGIN);

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.total_updated, 250);
        // two pauses between three waves
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn a_single_wave_is_not_paced() {
        let h = harness(100);
        for i in 0..250 {
            h.objects.put_tagged(&format!("gallery/{:03}.webp", i), TAG, "old");
        }

        let job = claim(&h.jobs);
        let started = Instant::now();
        h.worker.run(&job).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn no_candidates_means_no_update_phase() {
        let objects = Arc::new(MemoryObjectStore::new(100));
        objects.put_tagged("gallery/a.webp", TAG, "unrelated");
        let jobs = Arc::new(JobStore::new());
        let registry = Arc::new(GatedRegistry {
            inner: JsonFileRegistry::in_memory([("gallery", "old")]),
            gate: Notify::new(),
        });
        let worker = MigrationWorker::new(
            objects.clone(),
            registry.clone(),
            jobs.clone(),
            MigrationSettings::default(),
        );

        let job = claim(&jobs);
        let id = job.id.clone();
        let run = tokio::spawn(async move { worker.run(&job).await });

        // parked on the commit, right after the last phase ran
        sleep(Duration::from_millis(10)).await;
        let progress = jobs.get(&id).unwrap().progress;
        assert_eq!(progress.step, ProgressStep::Scanning);
        assert_eq!(progress.percentage, SCAN_START);
        assert!(progress.total_batches.is_none());

        registry.gate.notify_one();
        let result = run.await.unwrap().unwrap();
        assert_eq!(result, MigrationResult::default());
        assert_eq!(jobs.get(&id).unwrap().status, JobStatus::Completed);
        assert_eq!(registry.find_tenant_by_credential("new").as_deref(), Some("gallery"));
    }

    #[tokio::test(start_paused = true)]
    async fn commit_failure_fails_the_attempt() {
        let h = harness(100);
        let job = {
            h.jobs.submit(MigrationPayload {
                tenant: "ghost".into(),
                old_credential: "old".into(),
                new_credential: "new".into(),
            });
            h.jobs.claim_next().unwrap()
        };

        let err = h.worker.run(&job).await.unwrap_err();
        assert!(matches!(err, MigrationError::Commit(RegistryError::UnknownTenant(_))));
    }

    #[test]
    fn scan_progress_stays_below_the_update_phase() {
        let mut last = 0;
        for scanned in (0..200_000).step_by(5000) {
            let pct = scan_percentage(scanned);
            assert!(pct >= last);
            assert!((SCAN_START..=SCAN_CAP).contains(&pct));
            last = pct;
        }
        assert!(SCAN_CAP < UPDATE_BASE);
    }

    #[test]
    fn update_progress_is_monotonic_and_capped() {
        for total in [1u64, 7, 100, 250, 1001] {
            let mut last = UPDATE_BASE;
            for processed in 0..=total {
                let pct = update_percentage(processed, total);
                assert!(pct >= last);
                assert!(pct <= 100 - ERROR_MARGIN);
                last = pct;
            }
            assert_eq!(last, 100 - ERROR_MARGIN);
        }
    }
}
