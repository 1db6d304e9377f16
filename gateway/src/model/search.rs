use serde::{Deserialize, Serialize};

/// Buyer-side `/ondc/search` request: which {city, category} is being
/// browsed, and on behalf of which buyer app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub context: SearchContext,
    #[serde(default)]
    pub message: SearchMessage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchContext {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub bap_id: String,
    #[serde(default)]
    pub bap_uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchMessage {
    #[serde(default)]
    pub intent: Intent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub item: ItemIntent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemIntent {
    #[serde(default)]
    pub category: CategoryRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(default)]
    pub id: String,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.context.domain.is_empty() {
            return Err("context.domain missing".to_string());
        }
        if self.context.city.is_empty() {
            return Err("context.city missing".to_string());
        }
        if self.context.action != "search" {
            return Err("context.action must be search".to_string());
        }
        if self.context.bap_id.is_empty() {
            return Err("context.bap_id missing".to_string());
        }
        if self.message.intent.item.category.id.is_empty() {
            return Err("intent.item.category.id missing".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_intent_category() {
        let request: SearchRequest = serde_json::from_value(json!({
            "context": {
                "domain": "retail",
                "city": "std:080",
                "action": "search",
                "bap_id": "b1",
                "bap_uri": "https://buyer.example.com"
            },
            "message": {"intent": {"item": {"category": {"id": "c1"}}}}
        }))
        .expect("decode failed");
        assert!(request.validate().is_ok());

        let missing: SearchRequest = serde_json::from_value(json!({
            "context": {
                "domain": "retail",
                "city": "std:080",
                "action": "search",
                "bap_id": "b1"
            },
            "message": {}
        }))
        .expect("decode failed");
        assert_eq!(
            missing.validate().unwrap_err(),
            "intent.item.category.id missing"
        );
    }
}
