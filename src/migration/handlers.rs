use actix_web::{
    get, post,
    web::{Data, Path, ServiceConfig, scope},
    HttpRequest, HttpResponse, Responder,
};
use actix_web_validator::Json;

use super::dto::{ApiSuccessResponse, JobAccepted, JobStatusResponse, UpdateMetadataRequest};
use super::models::JobId;
use super::service::{MigrationService, ServiceError};

const API_KEY_HEADER: &str = "x-api-key";

/// Start rotating the caller's key to `new_key`
///
/// The caller's current key (header `x-api-key`) identifies the tenant.
/// Responds 202 right away; progress is polled via `update-status`.
#[post("/update-metadata")]
async fn update_metadata(
    service: Data<MigrationService>,
    req: HttpRequest,
    body: Json<UpdateMetadataRequest>,
) -> Result<HttpResponse, ServiceError> {
    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if api_key.is_empty() {
        return Err(ServiceError::InvalidCredential);
    }

    let job_id = service.submit_for_credential(api_key, &body.new_key)?;

    Ok(HttpResponse::Accepted().json(ApiSuccessResponse::new(
        202,
        "Metadata update initiated",
        JobAccepted {
            job_id,
            message: "Update process started in background".to_string(),
        },
    )))
}

#[get("/update-status/{job_id}")]
async fn update_status(
    service: Data<MigrationService>,
    path: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let id = JobId::from(path.into_inner());
    let job = service.get_status(&id)?;

    Ok(HttpResponse::Ok().json(ApiSuccessResponse::new(
        200,
        "Status retrieved",
        JobStatusResponse {
            job,
            queue_stats: service.get_queue_stats(),
        },
    )))
}

#[get("/stats")]
async fn queue_stats(service: Data<MigrationService>) -> impl Responder {
    HttpResponse::Ok().json(ApiSuccessResponse::new(
        200,
        "Queue stats retrieved",
        service.get_queue_stats(),
    ))
}

pub fn migration_config(config: &mut ServiceConfig) {
    config.service(
        scope("meta-data")
            .service(update_metadata)
            .service(update_status)
            .service(queue_stats),
    );
}
