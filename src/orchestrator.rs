//! The orchestrator validates each request, forwards it to the inference
//! backend and hands successful outcomes to the result store. The reply only
//! ever reflects the inference; storage runs on the side.

use crate::error::ApiError;
use crate::inference::{FailureKind, InferenceClient, InferenceOutcome, UNAVAILABLE};
use crate::request::{DetectionForm, ImageUpload, InferenceRequest, PredictionRequest};
use crate::store::{DetectionRecord, PersistedRecord, PredictionRecord, ResultStore, StoreError};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::timeout;
use tracing::*;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// What happened to the record of a successful inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Recorded,
    RecordSkipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropRecommendation {
    pub crop: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PestDetection {
    pub pest: String,
    /// Percentage, 0 to 100
    pub confidence: Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub backend_reachable: bool,
    pub store_enabled: bool,
}

/// Shared by every request. Holds no per-request state.
pub struct Orchestrator {
    client: Arc<dyn InferenceClient>,
    store: Arc<dyn ResultStore>,
    store_timeout: Duration,
    max_image_bytes: usize,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn InferenceClient>, store: Arc<dyn ResultStore>) -> Self {
        Orchestrator {
            client,
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Longest a request waits on the store before replying anyway
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    pub async fn health(&self) -> Health {
        Health {
            backend_reachable: self.client.health().await,
            store_enabled: self.store.is_enabled(),
        }
    }

    /// Recommend a crop for the submitted soil and climate features
    #[tracing::instrument(name = "predict", skip_all)]
    pub async fn predict(&self, body: &Map<String, Value>) -> Result<CropRecommendation, ApiError> {
        let features = PredictionRequest::from_json(body).map_err(rejected)?;
        debug!("request validated");

        let (crop, _) = self.infer(&InferenceRequest::Prediction(features)).await?;

        let state = self
            .record(PersistedRecord::Prediction(PredictionRecord {
                features,
                predicted_crop: crop.clone(),
                created_at: SystemTime::now(),
            }))
            .await;

        info!(%crop, ?state, "prediction served");
        Ok(CropRecommendation { crop })
    }

    /// Classify the pest in the single uploaded image
    #[tracing::instrument(name = "detect", skip_all)]
    pub async fn detect(&self, form: DetectionForm) -> Result<PestDetection, ApiError> {
        let image = ImageUpload::try_from(form).map_err(rejected)?;
        debug!(?image, "request validated");

        let content_type = image.content_type.clone();
        let file_name = image.file_name.clone();
        let size_bytes = image.data.len() as u64;

        let (pest, confidence) = self.infer(&InferenceRequest::Detection(image)).await?;
        let Some(confidence) = confidence else {
            error!("detection outcome without a confidence score");
            return Err(ApiError::UpstreamUnavailable(UNAVAILABLE.to_string()));
        };

        let state = self
            .record(PersistedRecord::Detection(DetectionRecord {
                pest: pest.clone(),
                confidence: confidence.as_f64().unwrap_or_default(),
                content_type,
                file_name,
                size_bytes,
                created_at: SystemTime::now(),
            }))
            .await;

        info!(%pest, %confidence, ?state, "detection served");
        Ok(PestDetection { pest, confidence })
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<(String, Option<Number>), ApiError> {
        match self.client.infer(request).await {
            InferenceOutcome::Success { label, confidence } => {
                debug!(%label, "inference succeeded");
                Ok((label, confidence))
            }
            InferenceOutcome::Failure {
                kind: FailureKind::Rejected,
                reason,
            } => {
                warn!(%reason, "inference backend rejected the request");
                Err(ApiError::UpstreamRejected(reason))
            }
            InferenceOutcome::Failure {
                kind: FailureKind::Unavailable,
                reason,
            } => Err(ApiError::UpstreamUnavailable(reason)),
        }
    }

    /// Best-effort write. The write runs on its own task and outlives a
    /// disconnected caller; the reply waits at most `store_timeout` for it.
    async fn record(&self, record: PersistedRecord) -> RecordState {
        if !self.store.is_enabled() {
            return RecordState::RecordSkipped;
        }

        let store = Arc::clone(&self.store);
        let write = tokio::spawn(async move { store.record(record).await });

        let err = match timeout(self.store_timeout, write).await {
            Ok(Ok(Ok(()))) => return RecordState::Recorded,
            Ok(Ok(Err(e))) => e,
            Ok(Err(join)) => StoreError::Write(join.to_string()),
            Err(_) => StoreError::Timeout(self.store_timeout),
        };
        warn!("{err}: continuing without storing the result");
        RecordState::RecordSkipped
    }
}

fn rejected(err: ApiError) -> ApiError {
    warn!("invalid request: {err}");
    err
}
