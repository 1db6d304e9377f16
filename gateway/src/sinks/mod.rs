use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::model::{CatalogAccepted, OnSearchEnvelope};

pub mod kafka;

/// Durable log topic for raw seller envelopes, keyed by transaction_id.
pub const INGEST_TOPIC: &str = "catalog.ingest";
/// Durable log topic for acceptance events, keyed per (seller, city, category).
pub const ACCEPTED_TOPIC: &str = "catalog.accepted";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to publish: {0}")]
    Publish(String),
}

/// Where the pipeline's two event streams go. The Kafka implementation is
/// the real one; print and memory sinks serve local runs and tests.
#[async_trait]
pub trait CatalogSink {
    async fn publish_ingest(&self, envelope: &OnSearchEnvelope) -> Result<(), SinkError>;
    async fn publish_accepted(&self, event: &CatalogAccepted) -> Result<(), SinkError>;
}

pub struct PrintSink {}

#[async_trait]
impl CatalogSink for PrintSink {
    async fn publish_ingest(&self, envelope: &OnSearchEnvelope) -> Result<(), SinkError> {
        metrics::counter!("ingest_envelopes_published_total").increment(1);
        info!(
            transaction_id = envelope.context.transaction_id,
            providers = envelope.message.catalog.bpp_providers.len(),
            "ingest envelope"
        );
        Ok(())
    }

    async fn publish_accepted(&self, event: &CatalogAccepted) -> Result<(), SinkError> {
        metrics::counter!("accepted_events_published_total").increment(1);
        info!(key = event.kafka_key(), "accepted event");
        Ok(())
    }
}

/// Captures published messages for assertions.
#[derive(Default)]
pub struct MemorySink {
    pub ingest: Mutex<Vec<OnSearchEnvelope>>,
    pub accepted: Mutex<Vec<CatalogAccepted>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted_events(&self) -> Vec<CatalogAccepted> {
        self.accepted.lock().unwrap().clone()
    }

    pub fn ingest_count(&self) -> usize {
        self.ingest.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogSink for MemorySink {
    async fn publish_ingest(&self, envelope: &OnSearchEnvelope) -> Result<(), SinkError> {
        self.ingest.lock().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn publish_accepted(&self, event: &CatalogAccepted) -> Result<(), SinkError> {
        self.accepted.lock().unwrap().push(event.clone());
        Ok(())
    }
}
