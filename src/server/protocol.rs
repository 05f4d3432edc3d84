use crate::error::ApiError;
use crate::orchestrator::{CropRecommendation, Health, PestDetection};
use crate::request::{DetectionForm, UploadedPart, IMAGE_FIELD, ONE_IMAGE_ONLY};
use actix_multipart::{Multipart, MultipartError};
use actix_web::web::BytesMut;
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::Number;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predicted_crop: String,
}

impl From<CropRecommendation> for PredictResponse {
    fn from(rec: CropRecommendation) -> Self {
        PredictResponse {
            predicted_crop: rec.crop,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub success: bool,
    pub pest: String,
    pub confidence: Number,
}

impl From<PestDetection> for DetectResponse {
    fn from(detection: PestDetection) -> Self {
        DetectResponse {
            success: true,
            pest: detection.pest,
            confidence: detection.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub inference_backend: &'static str,
    pub store: &'static str,
}

impl From<Health> for HealthResponse {
    fn from(health: Health) -> Self {
        HealthResponse {
            status: "ok",
            inference_backend: if health.backend_reachable {
                "reachable"
            } else {
                "unreachable"
            },
            store: if health.store_enabled {
                "enabled"
            } else {
                "disabled"
            },
        }
    }
}

fn invalid_multipart(err: MultipartError) -> ApiError {
    ApiError::Validation(format!("Invalid multipart body: {err}"))
}

/// Collect the `image` part of the form, draining anything else. Reading
/// stops as soon as a second image appears or the image grows past `max_bytes`.
pub async fn read_detection_form(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<DetectionForm, ApiError> {
    let mut form = DetectionForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(invalid_multipart)? {
        let disposition = field.content_disposition();
        if disposition.get_name() != Some(IMAGE_FIELD) {
            while field.try_next().await.map_err(invalid_multipart)?.is_some() {}
            continue;
        }
        if !form.images.is_empty() {
            return Err(ApiError::Validation(ONE_IMAGE_ONLY.into()));
        }
        let file_name = disposition.get_filename().map(str::to_owned);
        let content_type = field.content_type().map(|mime| mime.essence_str().to_owned());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.try_next().await.map_err(invalid_multipart)? {
            if data.len() + chunk.len() > max_bytes {
                return Err(ApiError::Validation(format!(
                    "Image exceeds the {max_bytes} byte limit"
                )));
            }
            data.extend_from_slice(&chunk);
        }

        form.images.push(UploadedPart {
            content_type,
            file_name,
            data: data.freeze(),
        });
    }

    Ok(form)
}
