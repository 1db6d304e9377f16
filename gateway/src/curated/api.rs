use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::api::GatewayError;
use crate::app_context::AppContext;
use crate::curated::writer::CuratedError;

/// Read-only surface over the curated log, for operators and downstream
/// analytics. Unlike the buyer endpoints these respond with plain JSON.

#[derive(Deserialize, Default)]
pub struct ListProvidersQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub city: Option<String>,
    pub domain: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListItemsQuery {
    pub provider_id: Option<String>,
    pub category_id: Option<String>,
    pub city: Option<String>,
    pub limit: Option<usize>,
}

fn internal(err: CuratedError) -> GatewayError {
    error!("curated query error: {err}");
    GatewayError::ProcessingError
}

pub async fn list_providers(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<ListProvidersQuery>,
) -> Result<Json<Value>, GatewayError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let offset = query.offset.unwrap_or(0);

    let records = context
        .catalog
        .list(limit, offset, query.city.as_deref(), query.domain.as_deref())
        .await
        .map_err(internal)?;

    let data: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "provider_id": record.provider_id,
                "domain": record.domain,
                "city": record.city,
                "bpp_id": record.bpp_id,
                "bap_id": record.bap_id,
                "timestamp": record.timestamp,
                "provider_name": record.descriptor.name,
                "items_count": record.items.len(),
                "categories": record.categories,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": data,
        "count": data.len(),
        "limit": limit,
        "offset": offset,
        "has_more": data.len() == limit,
    })))
}

pub async fn get_provider(
    State(context): State<Arc<AppContext>>,
    Path(provider_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let record = context
        .catalog
        .latest(&provider_id)
        .await
        .map_err(internal)?
        .ok_or(GatewayError::ProviderNotFound)?;

    Ok(Json(json!({"success": true, "data": record})))
}

pub async fn list_items(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Value>, GatewayError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 10000);

    let rows = context
        .catalog
        .items(
            query.provider_id.as_deref(),
            query.category_id.as_deref(),
            query.city.as_deref(),
            limit,
        )
        .await
        .map_err(internal)?;

    Ok(Json(json!({
        "success": true,
        "data": rows,
        "count": rows.len(),
        "limit": limit,
        "has_more": rows.len() == limit,
    })))
}

pub async fn stats(
    State(context): State<Arc<AppContext>>,
) -> Result<Json<Value>, GatewayError> {
    let stats = context.catalog.stats().await.map_err(internal)?;
    Ok(Json(json!({"success": true, "data": stats})))
}
