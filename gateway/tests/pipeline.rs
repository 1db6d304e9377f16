use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use tempfile::TempDir;

use common_redis::{Client, MockRedisClient};
use gateway::api::GatewayError;
use gateway::app_context::AppContext;
use gateway::curated::CuratedRecord;
use gateway::discovery::{self, OnSearchReadQuery};
use gateway::model::OnSearchEnvelope;
use gateway::policy::PolicyStatus;
use gateway::projections::{self, delta_key, freshness_key, index_key, overlay_key, shard_key};
use gateway::rejections::AuditRecord;
use gateway::schemagate;
use gateway::sinks::MemorySink;
use gateway::time::FixedTime;
use gateway::{edge, router};
use health::HealthRegistry;

const COMMIT_T1: &str = "2024-05-01T10:00:00.000000001Z";
const COMMIT_T2: &str = "2024-05-01T11:00:00.000000001Z";

struct Harness {
    context: Arc<AppContext>,
    sink: Arc<MemorySink>,
    redis: Arc<MockRedisClient>,
    _data_dir: TempDir,
}

fn harness() -> Harness {
    harness_at(COMMIT_T1)
}

fn harness_at(commit_time: &str) -> Harness {
    let data_dir = tempfile::tempdir().expect("tempdir failed");
    let redis = Arc::new(MockRedisClient::new());
    let sink = Arc::new(MemorySink::new());
    let context = context_for(&sink, &redis, data_dir.path(), commit_time);
    Harness {
        context,
        sink,
        redis,
        _data_dir: data_dir,
    }
}

fn context_for(
    sink: &Arc<MemorySink>,
    redis: &Arc<MockRedisClient>,
    data_dir: &Path,
    commit_time: &str,
) -> Arc<AppContext> {
    Arc::new(AppContext::new(
        sink.clone(),
        redis.clone(),
        Arc::new(FixedTime {
            time: commit_time.to_string(),
        }),
        data_dir,
        HealthRegistry::new("test"),
    ))
}

fn s1_envelope() -> OnSearchEnvelope {
    serde_json::from_value(s1_json()).expect("failed to decode envelope fixture")
}

fn s1_json() -> Value {
    json!({
        "context": {
            "domain": "retail",
            "country": "IND",
            "city": "std:080",
            "action": "on_search",
            "core_version": "1.1.0",
            "bap_id": "b1",
            "bap_uri": "https://buyer.example.com",
            "bpp_id": "s1",
            "bpp_uri": "https://seller.example.com",
            "transaction_id": "tx1",
            "message_id": "m1",
            "timestamp": "2024-05-01T09:59:00Z"
        },
        "message": {
            "catalog": {
                "bpp/descriptor": {
                    "name": "Seller One",
                    "short_desc": "short",
                    "long_desc": "long"
                },
                "bpp/providers": [{
                    "id": "p1",
                    "descriptor": {"name": "Foo"},
                    "categories": [
                        {"id": "c1", "descriptor": {"name": "Cat 1", "short_desc": "s", "long_desc": "l"}},
                        {"id": "c2", "descriptor": {"name": "Cat 2", "short_desc": "s", "long_desc": "l"}}
                    ],
                    "items": [{
                        "id": "i1",
                        "descriptor": {"name": "A"},
                        "price": {"currency": "INR", "value": "10"},
                        "category_id": "c1"
                    }]
                }]
            }
        }
    })
}

fn curated_lines(context: &AppContext, provider_id: &str) -> Vec<CuratedRecord> {
    let path = context
        .curated
        .dir()
        .join(format!("{provider_id}.jsonl"));
    if !path.exists() {
        return Vec::new();
    }
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn audit_records(context: &AppContext) -> Vec<AuditRecord> {
    let dir = context.rejections.dir();
    if !dir.exists() {
        return Vec::new();
    }
    let mut records = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let contents = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        for line in contents.lines() {
            records.push(serde_json::from_str(line).unwrap());
        }
    }
    records
}

async fn gunzip_body(response: Response) -> String {
    assert_eq!(
        response
            .headers()
            .get("content-encoding")
            .and_then(|v| v.to_str().ok()),
        Some("gzip")
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read failed");
    let mut decoder = GzDecoder::new(&body[..]);
    let mut decoded = String::new();
    decoder.read_to_string(&mut decoded).expect("gunzip failed");
    decoded
}

async fn project_all(harness: &Harness) {
    let redis: Arc<dyn Client + Send + Sync> = harness.redis.clone();
    for event in harness.sink.accepted_events() {
        projections::apply(&redis, &event).await;
    }
}

// S1 — happy path: one provider, two categories, one valid item.
#[tokio::test]
async fn s1_happy_path() {
    let harness = harness();

    let emitted = schemagate::process_envelope(&harness.context, &s1_envelope()).await;
    assert_eq!(emitted, 2);

    let events = harness.sink.accepted_events();
    assert_eq!(events.len(), 2);
    let mut categories: Vec<&str> = events.iter().map(|e| e.category.as_str()).collect();
    categories.sort();
    assert_eq!(categories, vec!["c1", "c2"]);
    for event in &events {
        assert_eq!(event.seller_id, "s1");
        assert_eq!(event.city, "std:080");
        assert_eq!(event.provider_id, "p1");
        assert_eq!(event.domain, "retail");
        assert_eq!(event.timestamp, COMMIT_T1);
    }

    project_all(&harness).await;
    for category in ["c1", "c2"] {
        let members = harness
            .redis
            .smembers(index_key("std:080", category))
            .await
            .unwrap();
        assert_eq!(members, vec!["s1".to_string()]);
        assert!(harness
            .redis
            .get(shard_key("s1", "std:080", category))
            .await
            .is_ok());
    }

    let lines = curated_lines(&harness.context, "p1");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].items.len(), 1);
    assert_eq!(lines[0].items[0].id, "i1");
    assert!(audit_records(&harness.context).is_empty());
}

// S2 — partial rejection: an invalid item drops, the provider survives.
#[tokio::test]
async fn s2_partial_item_rejection() {
    let harness = harness();
    let mut json = s1_json();
    json["message"]["catalog"]["bpp/providers"][0]["items"][0]["price"]["value"] = json!("");
    let envelope: OnSearchEnvelope = serde_json::from_value(json).unwrap();

    let emitted = schemagate::process_envelope(&harness.context, &envelope).await;
    assert_eq!(emitted, 2);

    let audits = audit_records(&harness.context);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].scope, "item:p1:i1");
    assert_eq!(audits[0].reason, "item.price.value missing");
    assert_eq!(audits[0].transaction_id, "tx1");

    let lines = curated_lines(&harness.context, "p1");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].items.is_empty());
}

// S3 — provider rejection: no descriptor name, nothing is accepted.
#[tokio::test]
async fn s3_provider_rejection() {
    let harness = harness();
    let mut json = s1_json();
    json["message"]["catalog"]["bpp/providers"][0]["descriptor"]["name"] = json!("");
    let envelope: OnSearchEnvelope = serde_json::from_value(json).unwrap();

    let emitted = schemagate::process_envelope(&harness.context, &envelope).await;
    assert_eq!(emitted, 0);
    assert!(harness.sink.accepted_events().is_empty());

    let audits = audit_records(&harness.context);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].scope, "provider:p1");

    assert!(curated_lines(&harness.context, "p1").is_empty());
}

// S4 — duplicate suppression: the second run emits events again but the
// already-seen item is filtered from the second curated line.
#[tokio::test]
async fn s4_duplicate_suppression() {
    let harness = harness();
    harness.context.filters.init().await;

    let first = schemagate::process_envelope(&harness.context, &s1_envelope()).await;
    let second = schemagate::process_envelope(&harness.context, &s1_envelope()).await;
    assert_eq!(first, 2);
    assert_eq!(second, 2);
    assert_eq!(harness.sink.accepted_events().len(), 4);

    let lines = curated_lines(&harness.context, "p1");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].items.len(), 1);
    assert!(lines[1].items.is_empty(), "duplicate item must be dropped");

    // No rejection record for the silent duplicate drop
    assert!(audit_records(&harness.context).is_empty());
}

// Invariant 2 — replays converge: same index membership, shard reflects
// the second run's timestamp, twice the events.
#[tokio::test]
async fn replay_is_idempotent_on_keys() {
    let data_dir = tempfile::tempdir().unwrap();
    let redis = Arc::new(MockRedisClient::new());
    let sink = Arc::new(MemorySink::new());

    let first_run = context_for(&sink, &redis, data_dir.path(), COMMIT_T1);
    schemagate::process_envelope(&first_run, &s1_envelope()).await;

    let second_run = context_for(&sink, &redis, data_dir.path(), COMMIT_T2);
    schemagate::process_envelope(&second_run, &s1_envelope()).await;

    assert_eq!(sink.accepted_events().len(), 4);

    let client: Arc<dyn Client + Send + Sync> = redis.clone();
    for event in sink.accepted_events() {
        projections::apply(&client, &event).await;
    }

    let members = redis.smembers(index_key("std:080", "c1")).await.unwrap();
    assert_eq!(members, vec!["s1".to_string()]);

    let shard = redis.get(shard_key("s1", "std:080", "c1")).await.unwrap();
    let value: Value = serde_json::from_str(&shard).unwrap();
    assert_eq!(value["timestamp"], COMMIT_T2);

    // Freshness carries the commit time of the newest accepted event
    assert_eq!(
        redis.zscore(&freshness_key("std:080", "c1"), "s1"),
        Some(1714561200.0)
    );
}

// Invariant 8 — deltas carry the 5-minute lifetime.
#[tokio::test]
async fn deltas_expire_within_five_minutes() {
    let harness = harness();
    schemagate::process_envelope(&harness.context, &s1_envelope()).await;
    project_all(&harness).await;

    let key = delta_key("s1", "std:080", "c1", COMMIT_T1);
    assert_eq!(harness.redis.ttl(&key), Some(300));
}

// S5 — discovery returns a seller iff indexed and policy-allowed.
#[tokio::test]
async fn s5_discovery_policy_filter() {
    let harness = harness();
    schemagate::process_envelope(&harness.context, &s1_envelope()).await;
    project_all(&harness).await;

    let request = json!({
        "context": {
            "domain": "retail",
            "city": "std:080",
            "action": "search",
            "bap_id": "b1",
            "bap_uri": "https://buyer.example.com"
        },
        "message": {"intent": {"item": {"category": {"id": "c1"}}}}
    });
    let body = Bytes::from(serde_json::to_vec(&request).unwrap());

    // Unknown policy denies by default
    let response = discovery::search(State(harness.context.clone()), body.clone())
        .await
        .unwrap();
    let decoded: Value = serde_json::from_str(&gunzip_body(response).await).unwrap();
    assert_eq!(decoded["sellers"], json!([]));

    harness
        .context
        .policy
        .set("b1", "s1", "retail", "std:080", PolicyStatus::Allowed)
        .await
        .unwrap();
    let response = discovery::search(State(harness.context.clone()), body.clone())
        .await
        .unwrap();
    let decoded: Value = serde_json::from_str(&gunzip_body(response).await).unwrap();
    assert_eq!(decoded["sellers"], json!(["s1"]));
    assert_eq!(decoded["city"], "std:080");
    assert_eq!(decoded["category"], "c1");

    harness
        .context
        .policy
        .set("b1", "s1", "retail", "std:080", PolicyStatus::Denied)
        .await
        .unwrap();
    let response = discovery::search(State(harness.context.clone()), body)
        .await
        .unwrap();
    let decoded: Value = serde_json::from_str(&gunzip_body(response).await).unwrap();
    assert_eq!(decoded["sellers"], json!([]));
}

// S6 / invariant 7 — overlay-first: the buyer-specific overlay wins over
// whatever the base shard holds.
#[tokio::test]
async fn s6_overlay_first() {
    let harness = harness();

    harness
        .redis
        .set(
            shard_key("s1", "std:080", "c1"),
            json!({"base": "shard"}).to_string(),
        )
        .await
        .unwrap();
    harness
        .redis
        .set(
            overlay_key("b1", "s1", "std:080", "c1"),
            "{\"hello\":\"world\"}".to_string(),
        )
        .await
        .unwrap();

    let query = OnSearchReadQuery {
        seller_id: Some("s1".to_string()),
        city: Some("std:080".to_string()),
        category: Some("c1".to_string()),
        buyer_id: Some("b1".to_string()),
    };
    let response = discovery::on_search_read(State(harness.context.clone()), Query(query))
        .await
        .unwrap();
    assert_eq!(gunzip_body(response).await, "{\"hello\":\"world\"}");

    // Without a buyer id the base shard is served
    let query = OnSearchReadQuery {
        seller_id: Some("s1".to_string()),
        city: Some("std:080".to_string()),
        category: Some("c1".to_string()),
        buyer_id: None,
    };
    let response = discovery::on_search_read(State(harness.context.clone()), Query(query))
        .await
        .unwrap();
    assert_eq!(gunzip_body(response).await, "{\"base\":\"shard\"}");

    // A miss is a 404
    let query = OnSearchReadQuery {
        seller_id: Some("s9".to_string()),
        city: Some("std:080".to_string()),
        category: Some("c1".to_string()),
        buyer_id: None,
    };
    let err = discovery::on_search_read(State(harness.context.clone()), Query(query))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::ShardNotFound));

    // Missing params are a 400
    let err = discovery::on_search_read(
        State(harness.context.clone()),
        Query(OnSearchReadQuery::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::MissingParams(_)));
}

// Edge ingest: stats response, durable publish, inline curated append.
#[tokio::test]
async fn edge_returns_gzip_stats_and_publishes() {
    let harness = harness();
    let body = Bytes::from(serde_json::to_vec(&s1_json()).unwrap());

    let response = edge::on_search(State(harness.context.clone()), HeaderMap::new(), body)
        .await
        .unwrap();
    let decoded: Value = serde_json::from_str(&gunzip_body(response).await).unwrap();
    assert_eq!(decoded["providers"], 1);
    assert!(decoded["duration_ms"].as_i64().is_some());

    assert_eq!(harness.sink.ingest_count(), 1);
    // The inline fan-out wrote a curated record for the stats pass
    assert_eq!(curated_lines(&harness.context, "p1").len(), 1);
}

#[tokio::test]
async fn edge_rejects_invalid_envelopes() {
    let harness = harness();

    let mut json = s1_json();
    json["context"]["action"] = json!("search");
    let body = Bytes::from(serde_json::to_vec(&json).unwrap());
    let err = edge::on_search(State(harness.context.clone()), HeaderMap::new(), body)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidEnvelope(_)));
    assert_eq!(harness.sink.ingest_count(), 0);

    let err = edge::on_search(
        State(harness.context.clone()),
        HeaderMap::new(),
        Bytes::from_static(b"{not json"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GatewayError::RequestParsingError(_)));
}

// A provider with zero surviving items is still accepted so its metadata
// reaches the read side.
#[tokio::test]
async fn zero_item_provider_is_still_accepted() {
    let harness = harness();
    let mut json = s1_json();
    json["message"]["catalog"]["bpp/providers"][0]["items"] = json!([]);
    let envelope: OnSearchEnvelope = serde_json::from_value(json).unwrap();

    let emitted = schemagate::process_envelope(&harness.context, &envelope).await;
    assert_eq!(emitted, 2);
    assert_eq!(curated_lines(&harness.context, "p1").len(), 1);
}

// The catalog read-through serves the curated log through the router.
#[tokio::test]
async fn catalog_read_through_serves_latest_state() {
    let harness = harness();
    schemagate::process_envelope(&harness.context, &s1_envelope()).await;

    let record = harness
        .context
        .catalog
        .latest("p1")
        .await
        .unwrap()
        .expect("provider missing");
    assert_eq!(record.bpp_id, "s1");
    assert_eq!(record.items.len(), 1);

    let stats = harness.context.catalog.stats().await.unwrap();
    assert_eq!(stats.total_providers, 1);
    assert_eq!(stats.total_items, 1);

    // Router smoke check: the state wires up
    let _app = router::router(harness.context.clone(), false);
}
