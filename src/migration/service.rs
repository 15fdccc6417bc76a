use actix_web::{HttpResponse, ResponseError};
use std::sync::Arc;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

use super::models::{JobId, JobRecord, MigrationPayload, QueueStats};
use super::store::JobStore;
use crate::api::validation::ErrorResponse;
use crate::registry::CredentialRegistry;

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed submission, rejected before it reaches the queue
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unknown or already garbage-collected job
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Credential that belongs to no tenant
    #[error("Invalid API key")]
    InvalidCredential,
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errors| {
                errors.iter().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
            })
            .collect();
        messages.sort();
        ServiceError::ValidationError(messages.join("; "))
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::ValidationError(msg) => {
                warn!("Validation error: {}", msg);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: serde_json::json!({"message": msg}),
                })
            }
            ServiceError::NotFound(id) => {
                warn!("Job not found: {}", id);
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "Not found".to_string(),
                    fields: serde_json::json!({"message": format!("Job {} not found", id)}),
                })
            }
            ServiceError::InvalidCredential => {
                warn!("Rejected migration request with unknown API key");
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Invalid API key".to_string(),
                    fields: serde_json::json!({"message": "API key does not belong to any app"}),
                })
            }
        }
    }
}

/// Programmatic surface of the migration engine
pub struct MigrationService {
    jobs: Arc<JobStore>,
    registry: Arc<dyn CredentialRegistry>,
    max_concurrency: usize,
}

impl MigrationService {
    pub fn new(
        jobs: Arc<JobStore>,
        registry: Arc<dyn CredentialRegistry>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            jobs,
            registry,
            max_concurrency,
        }
    }

    /// Queue a migration and hand back its id without waiting for it
    ///
    /// # Returns
    /// - `Ok(JobId)` - Job queued, poll `get_status` for progress
    /// - `Err(ServiceError::ValidationError)` - Missing fields or identical credentials
    pub fn submit_migration(
        &self,
        tenant: &str,
        old_credential: &str,
        new_credential: &str,
    ) -> Result<JobId, ServiceError> {
        let payload = MigrationPayload {
            tenant: tenant.to_string(),
            old_credential: old_credential.to_string(),
            new_credential: new_credential.to_string(),
        };
        payload.validate()?;

        let id = self.jobs.submit(payload);
        info!(job_id = %id, tenant = %tenant, "Service: Metadata migration queued");
        Ok(id)
    }

    /// Queue a migration for whichever tenant currently owns `old_credential`
    pub fn submit_for_credential(
        &self,
        old_credential: &str,
        new_credential: &str,
    ) -> Result<JobId, ServiceError> {
        let tenant = self
            .registry
            .find_tenant_by_credential(old_credential)
            .ok_or(ServiceError::InvalidCredential)?;
        self.submit_migration(&tenant, old_credential, new_credential)
    }

    pub fn get_status(&self, id: &JobId) -> Result<JobRecord, ServiceError> {
        self.jobs
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        self.jobs.stats(self.max_concurrency)
    }
}
