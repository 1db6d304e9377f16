use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level seller catalog submission, as posted to `/ondc/on_search`.
///
/// All leaf fields decode leniently (missing strings become empty): header
/// requirements are enforced by [`OnSearchEnvelope::validate`] at the edge,
/// while provider and item level rules are the schema-gate's job so that a
/// single bad provider cannot fail the whole envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnSearchEnvelope {
    #[serde(default)]
    pub context: OnSearchContext,
    #[serde(default)]
    pub message: OnSearchMessage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnSearchContext {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub core_version: String,
    #[serde(default)]
    pub bap_id: String,
    #[serde(default)]
    pub bap_uri: String,
    #[serde(default)]
    pub bpp_id: String,
    #[serde(default)]
    pub bpp_uri: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnSearchMessage {
    #[serde(default)]
    pub catalog: Catalog,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "bpp/descriptor", default)]
    pub bpp_descriptor: SellerDescriptor,
    #[serde(rename = "bpp/fulfillments", default)]
    pub bpp_fulfillments: Vec<Fulfillment>,
    #[serde(rename = "bpp/providers", default)]
    pub bpp_providers: Vec<Provider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SellerDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub long_desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub fulfillment_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Schedule>,
    #[serde(default)]
    pub descriptor: ProviderDescriptor,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub long_desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub descriptor: ItemDescriptor,
    #[serde(default)]
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fulfillment_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Schedule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_desc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub long_desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub maximum_value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<QuantityCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<QuantityCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unitized: Option<Unitized>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantityCount {
    #[serde(default)]
    pub count: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Unitized {
    #[serde(default)]
    pub measure: Measure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measure {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_category_id: String,
    #[serde(default)]
    pub descriptor: CategoryDescriptor,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub long_desc: String,
}

fn require(value: &str, field: &'static str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} missing"));
    }
    Ok(())
}

fn require_url(value: &str, field: &'static str) -> Result<(), String> {
    Url::parse(value).map_err(|_| format!("{field} is not a valid URL"))?;
    Ok(())
}

impl OnSearchEnvelope {
    /// Header-level schema check run at the edge. Provider and item rules
    /// are deliberately not enforced here; see the schema-gate.
    pub fn validate(&self) -> Result<(), String> {
        let ctx = &self.context;
        require(&ctx.domain, "context.domain")?;
        require(&ctx.country, "context.country")?;
        require(&ctx.city, "context.city")?;
        require(&ctx.action, "context.action")?;
        if ctx.action != "on_search" {
            return Err("context.action must be on_search".to_string());
        }
        require(&ctx.core_version, "context.core_version")?;
        require(&ctx.bap_id, "context.bap_id")?;
        require(&ctx.bap_uri, "context.bap_uri")?;
        require_url(&ctx.bap_uri, "context.bap_uri")?;
        require(&ctx.bpp_id, "context.bpp_id")?;
        require(&ctx.bpp_uri, "context.bpp_uri")?;
        require_url(&ctx.bpp_uri, "context.bpp_uri")?;
        require(&ctx.transaction_id, "context.transaction_id")?;
        require(&ctx.message_id, "context.message_id")?;
        require(&ctx.timestamp, "context.timestamp")?;

        let descriptor = &self.message.catalog.bpp_descriptor;
        require(&descriptor.name, "catalog.bpp/descriptor.name")?;
        require(&descriptor.short_desc, "catalog.bpp/descriptor.short_desc")?;
        require(&descriptor.long_desc, "catalog.bpp/descriptor.long_desc")?;
        if let Some(symbol) = &descriptor.symbol {
            if !symbol.is_empty() {
                require_url(symbol, "catalog.bpp/descriptor.symbol")?;
            }
        }

        for fulfillment in &self.message.catalog.bpp_fulfillments {
            require(&fulfillment.id, "catalog.bpp/fulfillments.id")?;
            require(&fulfillment.fulfillment_type, "catalog.bpp/fulfillments.type")?;
        }

        Ok(())
    }
}
