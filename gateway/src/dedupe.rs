use std::sync::Arc;

use common_redis::{Client, CustomRedisError};
use tracing::warn;

/// Approximate-membership filter for provider keys.
pub const PROVIDERS_FILTER: &str = "gcr:providers";
/// Approximate-membership filter for item keys, sized for high item volume.
pub const ITEMS_FILTER: &str = "gcr:items";

const PROVIDERS_CAPACITY: u64 = 1_000_000;
const ITEMS_CAPACITY: u64 = 10_000_000;
const ERROR_RATE: f64 = 0.001;

/// "Seen before?" checks over the two RedisBloom filters. A probe also
/// inserts the key, so the first probe for any key answers false and every
/// later probe answers true: no false negatives. False positives silently
/// drop novel items, the designed trade-off of the dedup pass. Any store
/// fault fails open so ingest is never blocked by a missing filter.
pub struct DedupeFilters {
    redis: Arc<dyn Client + Send + Sync>,
}

impl DedupeFilters {
    pub fn new(redis: Arc<dyn Client + Send + Sync>) -> Self {
        Self { redis }
    }

    /// Reserve both filters. Safe to call on every boot: an exists-error
    /// from the store means a previous boot already created them.
    pub async fn init(&self) {
        for (key, capacity) in [
            (PROVIDERS_FILTER, PROVIDERS_CAPACITY),
            (ITEMS_FILTER, ITEMS_CAPACITY),
        ] {
            if let Err(err) = self
                .redis
                .bf_reserve(key.to_string(), ERROR_RATE, capacity)
                .await
            {
                warn!("filter reserve {key} (may already exist): {err}");
            }
        }
    }

    pub async fn seen_provider(&self, domain: &str, city: &str, provider_id: &str) -> bool {
        self.seen(PROVIDERS_FILTER, format!("{domain}:{city}:{provider_id}"))
            .await
    }

    pub async fn seen_item(
        &self,
        domain: &str,
        city: &str,
        provider_id: &str,
        item_id: &str,
    ) -> bool {
        self.seen(
            ITEMS_FILTER,
            format!("{domain}:{city}:{provider_id}:{item_id}"),
        )
        .await
    }

    async fn seen(&self, filter: &str, key: String) -> bool {
        match self.redis.bf_add(filter.to_string(), key).await {
            Ok(added_new) => !added_new,
            Err(err) => {
                if !matches!(err, CustomRedisError::NotFound) {
                    warn!("filter probe error on {filter}: {err}");
                }
                false
            }
        }
    }
}
