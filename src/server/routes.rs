//! The user-facing JSON web server. Each route decodes its payload and hands
//! it to the [`Orchestrator`], which decides the outcome.

use super::protocol::{self, DetectResponse, HealthResponse, PredictResponse};
use super::WebError;
use crate::orchestrator::Orchestrator;
use actix_multipart::Multipart;
use actix_web::{get, post, web, Responder};
use serde_json::{json, Map, Value};

type Result<T> = std::result::Result<T, WebError>;

/// Recommend a crop from soil and climate measurements
#[post("/predict")]
pub async fn predict(
    body: web::Json<Map<String, Value>>,
    state: web::Data<Orchestrator>,
) -> Result<impl Responder> {
    let recommendation = state.predict(&body).await.map_err(WebError::predict)?;
    Ok(web::Json(PredictResponse::from(recommendation)))
}

/// Identify the pest in an uploaded image
#[post("/advisory/pest-detect")]
pub async fn pest_detect(payload: Multipart, state: web::Data<Orchestrator>) -> Result<impl Responder> {
    let form = protocol::read_detection_form(payload, state.max_image_bytes())
        .await
        .map_err(WebError::detect)?;
    let detection = state.detect(form).await.map_err(WebError::detect)?;
    Ok(web::Json(DetectResponse::from(detection)))
}

#[get("/health")]
pub async fn health(state: web::Data<Orchestrator>) -> impl Responder {
    web::Json(HealthResponse::from(state.health().await))
}

#[get("/")]
pub async fn index() -> impl Responder {
    web::Json(json!({ "status": "ok", "message": "fieldgate running" }))
}

/// Mount every route at the root and again under `/api`, where the browser
/// client expects them
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(health)
        .service(predict)
        .service(pest_detect)
        .service(
            web::scope("/api")
                .service(health)
                .service(predict)
                .service(pest_detect),
        );
}
