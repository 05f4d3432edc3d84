//! Client side of the external inference service. Whatever happens on the
//! wire, callers only ever get back an [`InferenceOutcome`].

use crate::request::{ImageUpload, InferenceRequest, PredictionRequest};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Number;
use std::time::Duration;
use tracing::*;

/// Reason reported for every transport-level failure
pub const UNAVAILABLE: &str = "upstream inference unavailable";

const PREDICT_PATH: &str = "/predict";
const DETECT_PATH: &str = "/predict-pest";
const HEALTH_PATH: &str = "/health";

/// Upper bound on a health check, whatever the inference timeout is
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Multipart field name the backend reads the image from
const BACKEND_FILE_FIELD: &str = "file";

/// Why an inference attempt did not produce a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend answered with its success flag unset
    Rejected,

    /// Connection error, timeout or an unreadable reply
    Unavailable,
}

/// The normalized result of one inference call
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Success {
        label: String,
        /// Only reported for pest detection, as a percentage
        confidence: Option<Number>,
    },
    Failure {
        kind: FailureKind,
        reason: String,
    },
}

impl InferenceOutcome {
    pub fn unavailable() -> Self {
        InferenceOutcome::Failure {
            kind: FailureKind::Unavailable,
            reason: UNAVAILABLE.to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        InferenceOutcome::Failure {
            kind: FailureKind::Rejected,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InferenceOutcome::Success { .. })
    }
}

/// Anything that can turn a request into an [`InferenceOutcome`]
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run a single inference attempt. Never retries.
    async fn infer(&self, request: &InferenceRequest) -> InferenceOutcome;

    /// Whether the backend currently answers its health check
    async fn health(&self) -> bool;
}

/// Reply body shared by both backend routes
#[derive(Debug, Deserialize)]
struct BackendReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    recommended_crop: Option<String>,
    #[serde(default)]
    pest: Option<String>,
    #[serde(default)]
    confidence: Option<Number>,
}

impl BackendReply {
    /// Interpret the reply for the given kind of request. A reply claiming
    /// success without the fields that go with it counts as malformed.
    fn into_outcome(self, request: &InferenceRequest) -> Result<InferenceOutcome, String> {
        if !self.success {
            let fallback = match request {
                InferenceRequest::Prediction(_) => "Prediction failed",
                InferenceRequest::Detection(_) => "Pest detection failed",
            };
            return Ok(InferenceOutcome::rejected(
                self.error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string()),
            ));
        }

        match request {
            InferenceRequest::Prediction(_) => {
                let label = required_label(self.recommended_crop, "recommended_crop")?;
                Ok(InferenceOutcome::Success {
                    label,
                    confidence: None,
                })
            }
            InferenceRequest::Detection(_) => {
                let label = required_label(self.pest, "pest")?;
                let confidence = self.confidence.ok_or("success reply without confidence")?;
                match confidence.as_f64() {
                    Some(c) if (0.0..=100.0).contains(&c) => Ok(InferenceOutcome::Success {
                        label,
                        confidence: Some(confidence),
                    }),
                    _ => Err(format!("confidence {confidence} outside 0-100")),
                }
            }
        }
    }
}

fn required_label(label: Option<String>, field: &str) -> Result<String, String> {
    match label {
        Some(label) if !label.trim().is_empty() => Ok(label),
        Some(_) => Err(format!("success reply with a blank {field}")),
        None => Err(format!("success reply without {field}")),
    }
}

/// [`InferenceClient`] speaking JSON/multipart over HTTP to the ML service
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl HttpInferenceClient {
    /// `timeout` bounds each call end to end, connect phase included. Health
    /// checks get the shorter of `timeout` and [`HEALTH_TIMEOUT`].
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("failed to build the inference HTTP client")?;

        Ok(HttpInferenceClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout: timeout.min(HEALTH_TIMEOUT),
        })
    }

    pub fn with_health_timeout(mut self, health_timeout: Duration) -> Self {
        self.health_timeout = health_timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn prediction(&self, features: &PredictionRequest) -> reqwest::RequestBuilder {
        self.http.post(self.endpoint(PREDICT_PATH)).json(features)
    }

    fn detection(&self, image: &ImageUpload) -> reqwest::Result<reqwest::RequestBuilder> {
        let part = Part::stream_with_length(image.data.clone(), image.data.len() as u64)
            .file_name(image.file_name.clone().unwrap_or_else(|| "upload".into()))
            .mime_str(&image.content_type)?;
        let form = Form::new().part(BACKEND_FILE_FIELD, part);

        Ok(self.http.post(self.endpoint(DETECT_PATH)).multipart(form))
    }

    async fn call(&self, request: &InferenceRequest) -> Result<InferenceOutcome, String> {
        let builder = match request {
            InferenceRequest::Prediction(features) => self.prediction(features),
            InferenceRequest::Detection(image) => {
                self.detection(image).map_err(|e| e.to_string())?
            }
        };

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        debug!(%status, bytes = body.len(), "inference backend replied");

        // The success flag in the body is authoritative, not the HTTP status
        let reply: BackendReply = serde_json::from_slice(&body)
            .map_err(|e| format!("unreadable reply (status {status}): {e}"))?;
        reply.into_outcome(request)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer(&self, request: &InferenceRequest) -> InferenceOutcome {
        match self.call(request).await {
            Ok(outcome) => outcome,
            Err(detail) => {
                error!(backend = %self.base_url, %detail, "inference backend unreachable");
                InferenceOutcome::unavailable()
            }
        }
    }

    async fn health(&self) -> bool {
        let check = self
            .http
            .get(self.endpoint(HEALTH_PATH))
            .timeout(self.health_timeout);
        match check.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("inference health check failed: {e}");
                false
            }
        }
    }
}
