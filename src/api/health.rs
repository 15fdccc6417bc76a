use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;

use crate::migration::models::QueueStats;
use crate::migration::service::MigrationService;

/// Where the health endpoints look for the object store
pub struct HealthState {
    pub store_root: PathBuf,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    object_store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue: Option<QueueStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn store_reachable(state: &HealthState) -> Result<(), String> {
    match tokio::fs::metadata(&state.store_root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(format!("{} is not a directory", state.store_root.display())),
        Err(e) => Err(format!("{}: {}", state.store_root.display(), e)),
    }
}

/// Health check endpoint
///
/// Object store reachability plus the engine's job counters.
#[get("/health")]
async fn health_check(
    state: web::Data<HealthState>,
    service: web::Data<MigrationService>,
) -> impl Responder {
    let queue = Some(service.get_queue_stats());
    match store_reachable(&state).await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "healthy".to_string(),
            object_store: "reachable".to_string(),
            queue,
            error: None,
        }),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "unhealthy".to_string(),
                object_store: "unreachable".to_string(),
                queue,
                error: Some(format!("Object store error: {}", e)),
            })
        }
    }
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "alive".to_string(),
        object_store: "not_checked".to_string(),
        queue: None,
        error: None,
    })
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config.service(health_check).service(liveness_check);
}
