use std::future::ready;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use serve_metrics::setup_metrics_routes;

use crate::app_context::AppContext;
use crate::curated::api as catalog_api;
use crate::{discovery, edge};

async fn index() -> &'static str {
    "catalog gateway"
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub fn router(context: Arc<AppContext>, metrics: bool) -> Router {
    let liveness = context.liveness.clone();

    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        // Seller ingest (edge) and buyer shard reads share the path
        .route(
            "/ondc/on_search",
            post(edge::on_search).get(discovery::on_search_read),
        )
        .route("/ondc/search", post(discovery::search))
        .route("/api/catalog/providers", get(catalog_api::list_providers))
        .route(
            "/api/catalog/providers/:provider_id",
            get(catalog_api::get_provider),
        )
        .route("/api/catalog/items", get(catalog_api::list_items))
        .route("/api/catalog/stats", get(catalog_api::stats))
        .layer(TraceLayer::new_for_http())
        .with_state(context);

    // Don't install the recorder when the gateway is used as a library
    // (during tests etc), a global recorder can only be set once.
    if metrics {
        setup_metrics_routes(router)
    } else {
        router
    }
}
