use std::sync::Arc;

use common_redis::{Client, CustomRedisError};
use tracing::warn;

/// Authorization verdict for a buyer×seller×domain×city combination.
/// Anything other than the literal stored values "allowed" and "denied"
/// reads as Unknown, and discovery denies by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    Allowed,
    Denied,
    Unknown,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStatus::Allowed => "allowed",
            PolicyStatus::Denied => "denied",
            PolicyStatus::Unknown => "unknown",
        }
    }

    fn from_value(value: &str) -> Self {
        match value {
            "allowed" => PolicyStatus::Allowed,
            "denied" => PolicyStatus::Denied,
            _ => PolicyStatus::Unknown,
        }
    }
}

pub fn policy_key(buyer_id: &str, seller_id: &str, domain: &str, city: &str) -> String {
    format!("policy:{buyer_id}:{seller_id}:{domain}:{city}")
}

pub struct PolicyStore {
    redis: Arc<dyn Client + Send + Sync>,
}

impl PolicyStore {
    pub fn new(redis: Arc<dyn Client + Send + Sync>) -> Self {
        Self { redis }
    }

    pub async fn check(
        &self,
        buyer_id: &str,
        seller_id: &str,
        domain: &str,
        city: &str,
    ) -> PolicyStatus {
        let key = policy_key(buyer_id, seller_id, domain, city);
        match self.redis.get(key).await {
            Ok(value) => PolicyStatus::from_value(&value),
            Err(CustomRedisError::NotFound) => PolicyStatus::Unknown,
            Err(err) => {
                warn!("policy check error: {err}");
                PolicyStatus::Unknown
            }
        }
    }

    pub async fn set(
        &self,
        buyer_id: &str,
        seller_id: &str,
        domain: &str,
        city: &str,
        status: PolicyStatus,
    ) -> Result<(), CustomRedisError> {
        let key = policy_key(buyer_id, seller_id, domain, city);
        self.redis.set(key, status.as_str().to_string()).await
    }
}
