//! Inbound payloads and the structural checks that turn them into requests the
//! inference backend will accept.

use crate::error::ApiError;
use actix_web::web::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Wire names of the seven crop features, in the order the backend expects them
pub const FEATURE_FIELDS: [&str; 7] = ["N", "P", "K", "temperature", "humidity", "ph", "rainfall"];

/// Multipart field that carries the image to classify
pub const IMAGE_FIELD: &str = "image";

pub(crate) const ONE_IMAGE_ONLY: &str = "Exactly one image must be uploaded";

/// Soil and climate measurements for a crop recommendation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(rename = "N")]
    pub nitrogen: f64,
    #[serde(rename = "P")]
    pub phosphorus: f64,
    #[serde(rename = "K")]
    pub potassium: f64,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(rename = "ph")]
    pub acidity: f64,
    pub rainfall: f64,
}

impl PredictionRequest {
    /// Validate a decoded JSON object. Every missing field is reported at once;
    /// for malformed values only the first offender is named.
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, ApiError> {
        let missing: Vec<&str> = FEATURE_FIELDS
            .iter()
            .copied()
            .filter(|field| body.get(*field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::Validation(format!(
                "Missing fields: {}",
                missing.join(", ")
            )));
        }

        let mut values = [0f64; 7];
        for (slot, field) in values.iter_mut().zip(FEATURE_FIELDS) {
            *slot = numeric(&body[field]).ok_or_else(|| {
                ApiError::Validation(format!("Invalid number for field '{field}'"))
            })?;
        }

        let [nitrogen, phosphorus, potassium, temperature, humidity, acidity, rainfall] = values;
        Ok(PredictionRequest {
            nitrogen,
            phosphorus,
            potassium,
            temperature,
            humidity,
            acidity,
            rainfall,
        })
    }
}

/// Browser forms submit numbers as strings, so both spellings are accepted
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// One part of a multipart upload, as received
#[derive(Clone, Default)]
pub struct UploadedPart {
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub data: Bytes,
}

impl Debug for UploadedPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadedPart {{ data: <{} bytes>, content_type: {:?}, file_name: {:?} }}",
            self.data.len(),
            self.content_type,
            self.file_name
        )
    }
}

/// Every `image` part found in a pest detection form
#[derive(Debug, Clone, Default)]
pub struct DetectionForm {
    pub images: Vec<UploadedPart>,
}

/// A validated image ready to be forwarded for pest detection
#[derive(Clone)]
pub struct ImageUpload {
    pub data: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

impl Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ImageUpload {{ data: <{} bytes>, content_type: {:?}, file_name: {:?} }}",
            self.data.len(),
            self.content_type,
            self.file_name
        )
    }
}

impl TryFrom<DetectionForm> for ImageUpload {
    type Error = ApiError;

    fn try_from(form: DetectionForm) -> Result<Self, Self::Error> {
        let mut images = form.images.into_iter();
        let part = match (images.next(), images.next()) {
            (Some(part), None) => part,
            (None, _) => {
                return Err(ApiError::Validation(format!(
                    "No image uploaded (field name must be '{IMAGE_FIELD}')"
                )))
            }
            (Some(_), Some(_)) => return Err(ApiError::Validation(ONE_IMAGE_ONLY.into())),
        };

        let content_type = match part.content_type {
            Some(ct) if ct.to_ascii_lowercase().starts_with("image/") => ct,
            other => {
                return Err(ApiError::Validation(format!(
                    "Uploaded file must be an image, got {}",
                    other.as_deref().unwrap_or("no content type")
                )))
            }
        };
        if part.data.is_empty() {
            return Err(ApiError::Validation("Uploaded image is empty".into()));
        }

        Ok(ImageUpload {
            data: part.data,
            content_type,
            file_name: part.file_name,
        })
    }
}

/// Input the inference backend can compute on
#[derive(Debug, Clone)]
pub enum InferenceRequest {
    /// Crop recommendation from soil/climate features
    Prediction(PredictionRequest),

    /// Pest classification from a single image
    Detection(ImageUpload),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn complete() -> Value {
        json!({
            "N": 90, "P": 42, "K": 43,
            "temperature": 20.8, "humidity": 82.0, "ph": 6.5, "rainfall": 202.9
        })
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let mut body = object(complete());
        body.insert("ph".into(), json!(" 6.5 "));
        let req = PredictionRequest::from_json(&body).unwrap();
        assert_eq!(req.nitrogen, 90.0);
        assert_eq!(req.acidity, 6.5);
        assert_eq!(req.rainfall, 202.9);
    }

    #[test]
    fn reports_every_missing_field_in_order() {
        let mut body = object(complete());
        body.remove("ph");
        body.remove("N");
        body.insert("rainfall".into(), Value::Null);
        let err = PredictionRequest::from_json(&body).unwrap_err();
        assert_eq!(err.to_string(), "Missing fields: N, ph, rainfall");
    }

    #[test]
    fn rejects_non_numeric_values() {
        for bad in [json!("wet"), json!(true), json!([1]), json!({"v": 1})] {
            let mut body = object(complete());
            body.insert("humidity".into(), bad);
            let err = PredictionRequest::from_json(&body).unwrap_err();
            assert_eq!(err.to_string(), "Invalid number for field 'humidity'");
        }
    }

    #[test]
    fn rejects_non_finite_strings() {
        let mut body = object(complete());
        body.insert("K".into(), json!("NaN"));
        assert!(PredictionRequest::from_json(&body).is_err());
    }

    #[test]
    fn serializes_with_backend_field_names() {
        let req = PredictionRequest::from_json(&object(complete())).unwrap();
        let wire = serde_json::to_value(req).unwrap();
        for field in FEATURE_FIELDS {
            assert!(wire.get(field).is_some(), "missing {field}");
        }
        assert_eq!(wire.as_object().unwrap().len(), 7);
    }

    fn part(content_type: Option<&str>, data: &'static [u8]) -> UploadedPart {
        UploadedPart {
            content_type: content_type.map(str::to_owned),
            file_name: Some("leaf.jpg".into()),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn single_image_part_is_accepted() {
        let form = DetectionForm {
            images: vec![part(Some("image/jpeg"), b"\xff\xd8\xff")],
        };
        let upload = ImageUpload::try_from(form).unwrap();
        assert_eq!(upload.content_type, "image/jpeg");
        assert_eq!(upload.data.len(), 3);
    }

    #[test]
    fn image_form_shape_is_enforced() {
        let cases = [
            (vec![], "No image uploaded"),
            (
                vec![part(Some("image/png"), b"a"), part(Some("image/png"), b"b")],
                "Exactly one image",
            ),
            (vec![part(Some("text/plain"), b"a")], "must be an image"),
            (vec![part(None, b"a")], "must be an image"),
            (vec![part(Some("image/png"), b"")], "empty"),
        ];
        for (images, expected) in cases {
            let err = ImageUpload::try_from(DetectionForm { images }).unwrap_err();
            assert!(err.to_string().contains(expected), "{err} !~ {expected}");
        }
    }
}
