use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use bytes::Bytes;
use common_redis::CustomRedisError;
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, instrument};

use crate::api::{gzip_json, gzip_raw, GatewayError};
use crate::app_context::AppContext;
use crate::model::SearchRequest;
use crate::policy::PolicyStatus;
use crate::projections::{index_key, overlay_key, shard_key};

/// `POST /ondc/search`: buyer discovery. Index lookup for the requested
/// {city, category}, then a per-seller policy filter; only sellers whose
/// policy reads exactly "allowed" survive (deny-by-default).
#[instrument(skip_all, fields(city, category, buyer_id))]
pub async fn search(
    State(context): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request: SearchRequest = serde_json::from_slice(&body)?;
    request.validate().map_err(GatewayError::InvalidEnvelope)?;

    let city = &request.context.city;
    let category = &request.message.intent.item.category.id;
    let buyer_id = &request.context.bap_id;
    let domain = &request.context.domain;

    tracing::Span::current().record("city", city.as_str());
    tracing::Span::current().record("category", category.as_str());
    tracing::Span::current().record("buyer_id", buyer_id.as_str());
    counter!("discovery_search_requests_total").increment(1);

    let candidates = context
        .redis
        .smembers(index_key(city, category))
        .await
        .map_err(|err| {
            error!("index lookup failed: {err}");
            GatewayError::IndexLookupError
        })?;

    let mut sellers = Vec::new();
    for seller_id in candidates {
        match context.policy.check(buyer_id, &seller_id, domain, city).await {
            PolicyStatus::Allowed => sellers.push(seller_id),
            status => {
                debug!("seller {seller_id} filtered by policy: {}", status.as_str())
            }
        }
    }
    // SMEMBERS order is unspecified; keep responses stable
    sellers.sort();

    gzip_json(&json!({
        "sellers": sellers,
        "city": city,
        "category": category,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct OnSearchReadQuery {
    pub seller_id: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub buyer_id: Option<String>,
}

/// `GET /ondc/on_search`: fetch the ready-to-serve catalog body for one
/// seller coordinate. When a buyer id is given its overlay is consulted
/// first and returned verbatim on a hit; otherwise the base shard. A miss
/// is a 404 and the caller retries later.
#[instrument(skip_all, fields(seller_id, city, category))]
pub async fn on_search_read(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<OnSearchReadQuery>,
) -> Result<Response, GatewayError> {
    let (Some(seller_id), Some(city), Some(category)) =
        (&query.seller_id, &query.city, &query.category)
    else {
        return Err(GatewayError::MissingParams("seller_id, city, category"));
    };

    tracing::Span::current().record("seller_id", seller_id.as_str());
    tracing::Span::current().record("city", city.as_str());
    tracing::Span::current().record("category", category.as_str());
    counter!("discovery_shard_requests_total").increment(1);

    if let Some(buyer_id) = &query.buyer_id {
        match context
            .redis
            .get(overlay_key(buyer_id, seller_id, city, category))
            .await
        {
            Ok(overlay) => {
                counter!("discovery_overlay_hits_total").increment(1);
                return Ok(gzip_raw(overlay.as_bytes()));
            }
            Err(CustomRedisError::NotFound) => {}
            Err(err) => debug!("overlay lookup error, falling back to shard: {err}"),
        }
    }

    match context
        .redis
        .get(shard_key(seller_id, city, category))
        .await
    {
        Ok(shard) => Ok(gzip_raw(shard.as_bytes())),
        Err(err) => {
            if !matches!(err, CustomRedisError::NotFound) {
                error!("shard lookup error: {err}");
            }
            Err(GatewayError::ShardNotFound)
        }
    }
}
