use async_trait::async_trait;
use rdkafka::producer::FutureProducer;

use common_kafka::kafka_producer::{send_keyed_json, KafkaContext};

use crate::model::{CatalogAccepted, OnSearchEnvelope};
use crate::sinks::{CatalogSink, SinkError, ACCEPTED_TOPIC, INGEST_TOPIC};

pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    ingest_topic: String,
    accepted_topic: String,
}

impl KafkaSink {
    pub fn new(producer: FutureProducer<KafkaContext>) -> KafkaSink {
        KafkaSink {
            producer,
            ingest_topic: INGEST_TOPIC.to_string(),
            accepted_topic: ACCEPTED_TOPIC.to_string(),
        }
    }
}

#[async_trait]
impl CatalogSink for KafkaSink {
    async fn publish_ingest(&self, envelope: &OnSearchEnvelope) -> Result<(), SinkError> {
        send_keyed_json(
            &self.producer,
            &self.ingest_topic,
            &envelope.context.transaction_id,
            envelope,
        )
        .await
        .map_err(|e| SinkError::Publish(e.to_string()))?;
        metrics::counter!("ingest_envelopes_published_total").increment(1);
        Ok(())
    }

    async fn publish_accepted(&self, event: &CatalogAccepted) -> Result<(), SinkError> {
        send_keyed_json(
            &self.producer,
            &self.accepted_topic,
            &event.kafka_key(),
            event,
        )
        .await
        .map_err(|e| SinkError::Publish(e.to_string()))?;
        metrics::counter!("accepted_events_published_total").increment(1);
        Ok(())
    }
}
