use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use validator::{Validate, ValidationError};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque job identifier: `metadata_update_<unix-millis>_<7 base36 chars>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..7)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(format!(
            "metadata_update_{}_{}",
            Utc::now().timestamp_millis(),
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a migration job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// What to migrate: every object of `tenant` tagged with `old_credential`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_distinct_credentials"))]
pub struct MigrationPayload {
    #[validate(length(min = 1, message = "Tenant is required"))]
    pub tenant: String,

    #[validate(length(min = 1, message = "Old credential is required"))]
    pub old_credential: String,

    #[validate(length(min = 1, message = "New credential is required"))]
    pub new_credential: String,
}

fn validate_distinct_credentials(payload: &MigrationPayload) -> Result<(), ValidationError> {
    if payload.old_credential == payload.new_credential {
        let mut err = ValidationError::new("identical_credentials");
        err.message = Some(Cow::from("Old and new credentials cannot be the same"));
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    Queued,
    Scanning,
    Updating,
    Retrying,
    Completed,
    Failed,
}

/// Progress snapshot. Workers replace it wholesale, never merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub step: ProgressStep,
    pub message: String,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanned_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_objects: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_updated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_failed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_batch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<u64>,
}

impl Progress {
    pub fn new(step: ProgressStep, message: impl Into<String>, percentage: u8) -> Self {
        Self {
            step,
            message: message.into(),
            percentage: percentage.min(100),
            scanned_count: None,
            found_count: None,
            total_objects: None,
            total_processed: None,
            total_updated: None,
            total_failed: None,
            current_batch: None,
            total_batches: None,
        }
    }

    pub fn queued() -> Self {
        Self::new(ProgressStep::Queued, "Waiting for a worker slot", 0)
    }
}

/// Outcome counters, set once a job is terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub total_objects: u64,
    pub total_updated: u64,
    pub total_failed: u64,
}

/// One migration request and its lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub payload: MigrationPayload,
    pub progress: Progress,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<MigrationResult>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(id: JobId, payload: MigrationPayload) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            payload,
            progress: Progress::queued(),
            attempt_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

/// Counters exposed by `get_queue_stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total_jobs: usize,
    pub pending_jobs: usize,
    pub processing_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub max_concurrency: usize,
}
