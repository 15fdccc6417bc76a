use serde::{Deserialize, Serialize};
use validator::Validate;

use super::models::{JobId, JobRecord, QueueStats};

/// Body of a migration request. The old key comes from the `x-api-key` header.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMetadataRequest {
    #[validate(length(min = 1, message = "New key is required"))]
    pub new_key: String,
}

/// Success envelope shared by the migration endpoints
#[derive(Serialize)]
pub struct ApiSuccessResponse<T: Serialize> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiSuccessResponse<T> {
    pub fn new(status_code: u16, message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            status_code,
            message: message.into(),
            data,
        }
    }
}

#[derive(Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub message: String,
}

/// A job record together with the engine-wide counters
#[derive(Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub job: JobRecord,
    pub queue_stats: QueueStats,
}
