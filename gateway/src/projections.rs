use std::sync::Arc;

use common_kafka::kafka_consumer::{RecvErr, SingleTopicConsumer};
use common_redis::{Client, CustomRedisError};
use health::HealthHandle;
use metrics::counter;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::model::CatalogAccepted;

/// Consumer group coordinating the projector instances.
pub const CONSUMER_GROUP: &str = "projectors-group";

/// Deltas are a cheap recent-changes feed; readers fall back to the shard
/// once they expire.
pub const DELTA_TTL_SECONDS: u64 = 300;

pub fn index_key(city: &str, category: &str) -> String {
    format!("idx:{city}:{category}")
}

pub fn freshness_key(city: &str, category: &str) -> String {
    format!("freshness:{city}:{category}")
}

pub fn shard_key(seller_id: &str, city: &str, category: &str) -> String {
    format!("shard:{seller_id}:{city}:cat:{category}")
}

pub fn overlay_key(buyer_id: &str, seller_id: &str, city: &str, category: &str) -> String {
    format!("overlay:{buyer_id}:{seller_id}:{city}:cat:{category}")
}

pub fn delta_key(seller_id: &str, city: &str, category: &str, timestamp: &str) -> String {
    format!("delta:{seller_id}:{city}:{category}:{timestamp}")
}

/// Ready-to-serve snapshot stored at the shard key. The authoritative
/// response body for one (seller, city, category) coordinate; richer
/// catalog detail is served by the curated read-through.
#[derive(Debug, Serialize)]
struct ShardRecord<'a> {
    seller_id: &'a str,
    city: &'a str,
    category: &'a str,
    provider_id: &'a str,
    timestamp: &'a str,
}

#[derive(Debug, Serialize)]
struct DeltaRecord<'a> {
    seller_id: &'a str,
    city: &'a str,
    category: &'a str,
    provider_id: &'a str,
    timestamp: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

fn commit_epoch_seconds(timestamp: &str) -> f64 {
    OffsetDateTime::parse(timestamp, &Rfc3339)
        .map(|t| t.unix_timestamp() as f64)
        .unwrap_or(0.0)
}

/// Index projector: {city, category} → sellers, plus a freshness sorted
/// set scored by commit time.
pub async fn update_index(
    redis: &Arc<dyn Client + Send + Sync>,
    event: &CatalogAccepted,
) -> Result<(), CustomRedisError> {
    redis
        .sadd(
            index_key(&event.city, &event.category),
            event.seller_id.clone(),
        )
        .await?;
    redis
        .zadd(
            freshness_key(&event.city, &event.category),
            event.seller_id.clone(),
            commit_epoch_seconds(&event.timestamp),
        )
        .await?;
    Ok(())
}

/// Shard projector: last-writer-wins snapshot, no expiry.
pub async fn update_shard(
    redis: &Arc<dyn Client + Send + Sync>,
    event: &CatalogAccepted,
) -> Result<(), CustomRedisError> {
    let record = ShardRecord {
        seller_id: &event.seller_id,
        city: &event.city,
        category: &event.category,
        provider_id: &event.provider_id,
        timestamp: &event.timestamp,
    };
    let payload = serde_json::to_string(&record)
        .map_err(|e| CustomRedisError::Other(e.to_string()))?;
    redis
        .set(
            shard_key(&event.seller_id, &event.city, &event.category),
            payload,
        )
        .await
}

/// Delta projector: one short-lived record per change.
pub async fn update_delta(
    redis: &Arc<dyn Client + Send + Sync>,
    event: &CatalogAccepted,
) -> Result<(), CustomRedisError> {
    let record = DeltaRecord {
        seller_id: &event.seller_id,
        city: &event.city,
        category: &event.category,
        provider_id: &event.provider_id,
        timestamp: &event.timestamp,
        kind: "update",
    };
    let payload = serde_json::to_string(&record)
        .map_err(|e| CustomRedisError::Other(e.to_string()))?;
    redis
        .setex(
            delta_key(&event.seller_id, &event.city, &event.category, &event.timestamp),
            payload,
            DELTA_TTL_SECONDS,
        )
        .await
}

/// Run all three projectors for one event. Each fails independently: a
/// logged error here is repaired by a later event or a replay, because
/// every write is idempotent on its key.
pub async fn apply(redis: &Arc<dyn Client + Send + Sync>, event: &CatalogAccepted) {
    if let Err(err) = update_index(redis, event).await {
        counter!("projector_errors_total", "projector" => "index").increment(1);
        error!("index projector error: {err}");
    }
    if let Err(err) = update_shard(redis, event).await {
        counter!("projector_errors_total", "projector" => "shard").increment(1);
        error!("shard projector error: {err}");
    }
    if let Err(err) = update_delta(redis, event).await {
        counter!("projector_errors_total", "projector" => "delta").increment(1);
        error!("delta projector error: {err}");
    }
}

/// Long-running projectors consumer on the accepted topic.
pub async fn run(
    redis: Arc<dyn Client + Send + Sync>,
    consumer: SingleTopicConsumer,
    liveness: HealthHandle,
) {
    info!("projectors consuming from accepted topic");
    loop {
        match consumer.json_recv::<CatalogAccepted>().await {
            Ok((event, offset)) => {
                counter!("projector_events_total").increment(1);
                apply(&redis, &event).await;
                if let Err(err) = offset.store() {
                    warn!("failed to store accepted offset: {err}");
                }
                liveness.report_healthy().await;
            }
            Err(RecvErr::Empty) | Err(RecvErr::Serde(_)) => {
                counter!("projector_poison_messages_total").increment(1);
                warn!("skipping undecodable accepted message");
                liveness.report_healthy().await;
            }
            Err(RecvErr::Kafka(err)) => {
                error!("projectors consumer error: {err}");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}
