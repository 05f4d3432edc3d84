//! Best-effort persistence of successful inferences. Nothing here is ever
//! allowed to change what the caller sees.

use crate::request::PredictionRequest;
use async_trait::async_trait;
use mongodb::bson::{self, DateTime, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::*;

pub const PREDICTIONS: &str = "predictions";
pub const PEST_DETECTIONS: &str = "pest_detections";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store write failed: {0}")]
    Write(String),

    #[error("store write timed out after {0:?}")]
    Timeout(Duration),
}

/// A crop recommendation together with the features it was computed from
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub features: PredictionRequest,
    pub predicted_crop: String,
    #[serde(skip)]
    pub created_at: SystemTime,
}

/// A pest classification. The image itself is not kept, only its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
    pub pest: String,
    pub confidence: f64,
    pub content_type: String,
    pub file_name: Option<String>,
    pub size_bytes: u64,
    #[serde(skip)]
    pub created_at: SystemTime,
}

/// One successful inference, written at most once
#[derive(Debug, Clone)]
pub enum PersistedRecord {
    Prediction(PredictionRecord),
    Detection(DetectionRecord),
}

impl PersistedRecord {
    pub fn collection(&self) -> &'static str {
        match self {
            PersistedRecord::Prediction(_) => PREDICTIONS,
            PersistedRecord::Detection(_) => PEST_DETECTIONS,
        }
    }

    pub fn to_document(&self) -> Result<Document, StoreError> {
        let (doc, created_at) = match self {
            PersistedRecord::Prediction(r) => (bson::to_document(r), r.created_at),
            PersistedRecord::Detection(r) => (bson::to_document(r), r.created_at),
        };
        let mut doc = doc.map_err(|e| StoreError::Write(e.to_string()))?;
        doc.insert("created_at", DateTime::from_system_time(created_at));
        Ok(doc)
    }
}

/// Somewhere successful inferences can be written to
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn record(&self, record: PersistedRecord) -> Result<(), StoreError>;

    /// A disabled store is skipped without spawning a write
    fn is_enabled(&self) -> bool {
        true
    }
}

/// MongoDB-backed store. The driver's client is pooled and safe to share.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Parse the connection string and prepare a pooled client. The driver
    /// connects lazily, so an unreachable server only shows up on write.
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(MongoStore {
            db: client.database(database),
        })
    }
}

#[async_trait]
impl ResultStore for MongoStore {
    async fn record(&self, record: PersistedRecord) -> Result<(), StoreError> {
        let doc = record.to_document()?;
        let result = self
            .db
            .collection::<Document>(record.collection())
            .insert_one(doc, None)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        debug!(collection = record.collection(), id = %result.inserted_id, "stored inference record");
        Ok(())
    }
}

/// Used when no store is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait]
impl ResultStore for DisabledStore {
    async fn record(&self, _record: PersistedRecord) -> Result<(), StoreError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the store described by the settings. A missing or unusable
/// connection string disables persistence rather than stopping startup.
pub async fn from_settings(
    uri: Option<&str>,
    database: &str,
    timeout: Duration,
) -> Arc<dyn ResultStore> {
    let Some(uri) = uri else {
        info!("no MONGO_URI configured: inference results will not be stored");
        return Arc::new(DisabledStore);
    };

    match MongoStore::connect(uri, database, timeout).await {
        Ok(store) => {
            info!(database, "result store configured");
            Arc::new(store)
        }
        Err(e) => {
            error!("{e}: inference results will not be stored");
            Arc::new(DisabledStore)
        }
    }
}
