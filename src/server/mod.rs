use crate::error::ApiError;
use actix_web::error::JsonPayloadError;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

mod protocol;
pub mod routes;

/// Which operation failed; the two routes report errors in different shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Predict,
    Detect,
}

#[derive(Debug)]
pub struct WebError {
    operation: Operation,
    err: ApiError,
}

impl WebError {
    pub fn predict(err: ApiError) -> Self {
        WebError {
            operation: Operation::Predict,
            err,
        }
    }

    pub fn detect(err: ApiError) -> Self {
        WebError {
            operation: Operation::Detect,
            err,
        }
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let body = match self.operation {
            Operation::Predict => json!({ "error": self.to_string() }),
            Operation::Detect => json!({ "success": false, "error": self.to_string() }),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self.err {
            ApiError::Validation(_) | ApiError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON extractor settings for the predict route. Undecodable bodies are
/// reported like any other validation failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            tracing::warn!("undecodable prediction body: {err}");
            WebError::predict(ApiError::Validation("Invalid or missing JSON body".into())).into()
        })
}
