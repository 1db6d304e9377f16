use serde::{Deserialize, Serialize};

/// Acceptance event emitted once the curated writer has committed a
/// provider. Published to `catalog.accepted`, one event per
/// (provider, category) pair, and consumed by the projectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogAccepted {
    pub seller_id: String, // bpp_id
    pub city: String,
    pub category: String,
    pub timestamp: String, // commit timestamp, RFC 3339 with nanoseconds
    pub provider_id: String,
    pub domain: String,
}

impl CatalogAccepted {
    /// Partition key: all updates for one (seller, city, category)
    /// coordinate land on one partition and stay ordered.
    pub fn kafka_key(&self) -> String {
        format!("{}:{}:{}", self.seller_id, self.city, self.category)
    }
}

/// A validation rejection produced by the schema-gate, scoped to either a
/// whole provider or a single item within one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub scope: String, // "provider:<id>" or "item:<provider_id>:<item_id>"
    pub reason: String,
}

impl Rejection {
    pub fn provider(provider_id: &str, reason: impl Into<String>) -> Self {
        Self {
            scope: format!("provider:{provider_id}"),
            reason: reason.into(),
        }
    }

    pub fn item(provider_id: &str, item_id: &str, reason: impl Into<String>) -> Self {
        Self {
            scope: format!("item:{provider_id}:{item_id}"),
            reason: reason.into(),
        }
    }
}
