use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::{Buf, Bytes};
use flate2::read::GzDecoder;
use metrics::counter;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use crate::api::{gzip_json, GatewayError};
use crate::app_context::AppContext;
use crate::model::{OnSearchContext, OnSearchEnvelope, Provider};

const MAX_FANOUT_WORKERS: usize = 16;

/// Stats returned to the seller so they can see throughput and latency.
#[derive(Debug, Serialize)]
pub struct OnSearchStats {
    pub providers: i64,
    pub duration_ms: i64,
}

/// `POST /ondc/on_search`: seller catalog ingest. Decodes and validates
/// the envelope, publishes it durably, then runs a bounded inline fan-out
/// purely to answer with stats quickly; the authoritative processing is
/// the schema-gate consumer on the ingest topic.
#[instrument(skip_all, fields(transaction_id, providers))]
pub async fn on_search(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let start = Instant::now();

    let envelope = decode_envelope(&headers, body)?;
    envelope.validate().map_err(|reason| {
        counter!("edge_envelopes_invalid_total").increment(1);
        GatewayError::InvalidEnvelope(reason)
    })?;

    tracing::Span::current().record("transaction_id", &envelope.context.transaction_id);
    tracing::Span::current().record("providers", envelope.message.catalog.bpp_providers.len());
    counter!("edge_envelopes_received_total").increment(1);

    // Fire-and-forget: the seller gets its stats response even when the
    // broker hiccups, delivery is retried by the seller network.
    if let Err(err) = context.sink.publish_ingest(&envelope).await {
        counter!("edge_publish_errors_total").increment(1);
        error!("failed to publish envelope to ingest topic: {err}");
    }

    let providers = envelope.message.catalog.bpp_providers.len();
    inline_fanout(&context, &envelope).await;

    let stats = OnSearchStats {
        providers: providers as i64,
        duration_ms: start.elapsed().as_millis() as i64,
    };
    debug!(duration_ms = stats.duration_ms, "envelope processed inline");
    gzip_json(&stats)
}

pub fn decode_envelope(headers: &HeaderMap, body: Bytes) -> Result<OnSearchEnvelope, GatewayError> {
    let gzipped = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    let payload = if gzipped {
        let mut decoder = GzDecoder::new(body.reader());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).map_err(|e| {
            debug!("failed to decode gzip body: {e}");
            GatewayError::RequestDecodingError(String::from("invalid gzip data"))
        })?;
        Bytes::from(decoded)
    } else {
        body
    };

    Ok(serde_json::from_slice::<OnSearchEnvelope>(&payload)?)
}

/// Probe the provider filter and append a curated record for each provider
/// on a pool of clamp(provider_count, 1..=16) workers, draining fully
/// before the response. Errors are swallowed: this path duplicates the
/// schema-gate pipeline and exists only to compute response stats.
async fn inline_fanout(context: &Arc<AppContext>, envelope: &OnSearchEnvelope) {
    let providers = &envelope.message.catalog.bpp_providers;
    if providers.is_empty() {
        return;
    }

    let workers = providers.len().clamp(1, MAX_FANOUT_WORKERS);
    let semaphore = Arc::new(Semaphore::new(workers));
    let ctx_meta = Arc::new(envelope.context.clone());
    let mut set = JoinSet::new();

    for provider in providers.iter().cloned() {
        let semaphore = semaphore.clone();
        let context = context.clone();
        let ctx_meta = ctx_meta.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            fanout_provider(&context, &ctx_meta, provider).await;
        });
    }

    while let Some(result) = set.join_next().await {
        if let Err(err) = result {
            error!("inline fan-out worker panicked: {err}");
        }
    }
}

async fn fanout_provider(context: &AppContext, ctx_meta: &OnSearchContext, provider: Provider) {
    let _ = context
        .filters
        .seen_provider(&ctx_meta.domain, &ctx_meta.city, &provider.id)
        .await;

    let commit_timestamp = context.timesource.current_time();
    if let Err(err) = context
        .curated
        .append(ctx_meta, &provider, &commit_timestamp)
        .await
    {
        warn!("inline curated append failed for {}: {err}", provider.id);
    }
}
