//! Spies standing in for the inference backend and the result store

use crate::inference::{InferenceClient, InferenceOutcome};
use crate::request::InferenceRequest;
use crate::store::{PersistedRecord, ResultStore, StoreError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers every call with the same outcome and counts the calls
pub struct SpyClient {
    outcome: InferenceOutcome,
    calls: AtomicUsize,
}

impl SpyClient {
    pub fn returning(outcome: InferenceOutcome) -> Arc<Self> {
        Arc::new(SpyClient {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for SpyClient {
    async fn infer(&self, _request: &InferenceRequest) -> InferenceOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }

    async fn health(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StoreBehavior {
    Accept,
    Fail,
    Hang(Duration),
}

/// Remembers every record handed to it, then behaves as configured.
/// `completed` counts writes that ran all the way to `Ok`.
pub struct SpyStore {
    behavior: StoreBehavior,
    records: Mutex<Vec<PersistedRecord>>,
    completed: AtomicUsize,
}

impl SpyStore {
    pub fn new(behavior: StoreBehavior) -> Arc<Self> {
        Arc::new(SpyStore {
            behavior,
            records: Mutex::new(vec![]),
            completed: AtomicUsize::new(0),
        })
    }

    pub fn records(&self) -> Vec<PersistedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultStore for SpyStore {
    async fn record(&self, record: PersistedRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record);
        match self.behavior {
            StoreBehavior::Accept => {}
            StoreBehavior::Fail => return Err(StoreError::Write("disk on fire".into())),
            StoreBehavior::Hang(duration) => tokio::time::sleep(duration).await,
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
