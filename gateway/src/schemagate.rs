use std::sync::Arc;

use common_kafka::kafka_consumer::{RecvErr, SingleTopicConsumer};
use health::HealthHandle;
use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app_context::AppContext;
use crate::model::{CatalogAccepted, Item, OnSearchContext, OnSearchEnvelope, Provider, Rejection};

/// Consumer group coordinating the schema-gate instances.
pub const CONSUMER_GROUP: &str = "schemagate-group";

const MAX_PROVIDER_WORKERS: usize = 16;
const MAX_ITEM_WORKERS: usize = 32;
const ITEM_BATCH_SIZE: usize = 100;

/// Provider-level validation. An invalid provider is discarded whole.
pub fn validate_provider(provider: &Provider) -> Result<(), &'static str> {
    if provider.id.is_empty() {
        return Err("provider.id missing");
    }
    if provider.descriptor.name.is_empty() {
        return Err("provider.descriptor.name missing");
    }
    if provider.categories.is_empty() {
        return Err("provider.categories empty");
    }
    Ok(())
}

/// Item-level validation. An invalid item is dropped, the provider
/// continues with its remaining items.
pub fn validate_item(item: &Item) -> Result<(), &'static str> {
    if item.id.is_empty() {
        return Err("item.id missing");
    }
    if item.descriptor.name.is_empty() {
        return Err("item.descriptor.name missing");
    }
    if item.category_id.is_empty() {
        return Err("item.category_id missing");
    }
    if item.price.currency.is_empty() {
        return Err("item.price.currency missing");
    }
    if item.price.value.is_empty() {
        return Err("item.price.value missing");
    }
    if let Some(quantity) = &item.quantity {
        if let Some(available) = &quantity.available {
            if available.count.is_empty() {
                return Err("item.quantity.available.count missing");
            }
        }
    }
    Ok(())
}

struct ProviderScreen {
    provider: Option<Provider>,
    rejections: Vec<Rejection>,
}

/// Validate all providers and items of one envelope with partial
/// acceptance. Providers are screened on a bounded pool; within each
/// provider, items are screened in batches on a second bounded pool.
/// Provider order is not preserved — downstream state is set-based and
/// last-writer-wins on timestamp.
pub async fn screen_catalog(
    context: &Arc<AppContext>,
    envelope: &OnSearchEnvelope,
) -> (Vec<Provider>, Vec<Rejection>) {
    let providers = &envelope.message.catalog.bpp_providers;
    if providers.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let workers = providers.len().min(MAX_PROVIDER_WORKERS);
    let semaphore = Arc::new(Semaphore::new(workers));
    let ctx_meta = Arc::new(envelope.context.clone());
    let mut set = JoinSet::new();

    for provider in providers.iter().cloned() {
        let semaphore = semaphore.clone();
        let context = context.clone();
        let ctx_meta = ctx_meta.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            screen_provider(&context, &ctx_meta, provider).await
        });
    }

    let mut valid = Vec::new();
    let mut rejections = Vec::new();
    while let Some(result) = set.join_next().await {
        match result {
            Ok(screen) => {
                valid.extend(screen.provider);
                rejections.extend(screen.rejections);
            }
            Err(err) => error!("provider screening task panicked: {err}"),
        }
    }

    (valid, rejections)
}

async fn screen_provider(
    context: &Arc<AppContext>,
    ctx_meta: &OnSearchContext,
    mut provider: Provider,
) -> ProviderScreen {
    if let Err(reason) = validate_provider(&provider) {
        debug!("rejected provider {}: {}", provider.id, reason);
        return ProviderScreen {
            rejections: vec![Rejection::provider(&provider.id, reason)],
            provider: None,
        };
    }

    // A provider with no items is still accepted so its descriptor and
    // category metadata reach the read side.
    if provider.items.is_empty() {
        return ProviderScreen {
            provider: Some(provider),
            rejections: Vec::new(),
        };
    }

    let items = std::mem::take(&mut provider.items);
    let (kept, rejections) = screen_items(context, ctx_meta, &provider.id, items).await;
    provider.items = kept;

    ProviderScreen {
        provider: Some(provider),
        rejections,
    }
}

async fn screen_items(
    context: &Arc<AppContext>,
    ctx_meta: &OnSearchContext,
    provider_id: &str,
    items: Vec<Item>,
) -> (Vec<Item>, Vec<Rejection>) {
    let batches: Vec<Vec<Item>> = items
        .chunks(ITEM_BATCH_SIZE)
        .map(|chunk| chunk.to_vec())
        .collect();

    let workers = batches.len().min(MAX_ITEM_WORKERS);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();

    for batch in batches {
        let semaphore = semaphore.clone();
        let context = context.clone();
        let domain = ctx_meta.domain.clone();
        let city = ctx_meta.city.clone();
        let provider_id = provider_id.to_string();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            screen_item_batch(&context, &domain, &city, &provider_id, batch).await
        });
    }

    let mut kept = Vec::new();
    let mut rejections = Vec::new();
    while let Some(result) = set.join_next().await {
        match result {
            Ok((batch_kept, batch_rejections)) => {
                kept.extend(batch_kept);
                rejections.extend(batch_rejections);
            }
            Err(err) => error!("item screening task panicked: {err}"),
        }
    }

    (kept, rejections)
}

async fn screen_item_batch(
    context: &AppContext,
    domain: &str,
    city: &str,
    provider_id: &str,
    batch: Vec<Item>,
) -> (Vec<Item>, Vec<Rejection>) {
    let mut kept = Vec::new();
    let mut rejections = Vec::new();

    for item in batch {
        if let Err(reason) = validate_item(&item) {
            debug!("rejected item {} in provider {provider_id}: {reason}", item.id);
            rejections.push(Rejection::item(provider_id, &item.id, reason));
            continue;
        }

        // A duplicate is dropped without a rejection record: it is already
        // in the curated log from an earlier envelope.
        if context
            .filters
            .seen_item(domain, city, provider_id, &item.id)
            .await
        {
            counter!("schemagate_duplicates_dropped_total").increment(1);
            debug!("duplicate item {} in provider {provider_id}, skipping", item.id);
            continue;
        }

        kept.push(item);
    }

    (kept, rejections)
}

/// Full schema-gate pass for one envelope: screen, audit rejections, write
/// accepted providers to the curated log, and emit one acceptance event
/// per (provider, category). Returns the number of events emitted.
pub async fn process_envelope(context: &Arc<AppContext>, envelope: &OnSearchEnvelope) -> usize {
    let (valid_providers, rejections) = screen_catalog(context, envelope).await;

    counter!("schemagate_rejections_total").increment(rejections.len() as u64);
    for rejection in &rejections {
        // Best-effort audit: a failed write must not block the pipeline
        if let Err(err) = context.rejections.append(&envelope.context, rejection).await {
            warn!("failed to write rejection audit record: {err}");
        }
    }

    // One commit timestamp for every event from this envelope
    let commit_timestamp = context.timesource.current_time();
    let mut emitted = 0;

    for provider in &valid_providers {
        // Curated write precedes publish: an event on the accepted topic
        // implies the corresponding curated append exists.
        if let Err(err) = context
            .curated
            .append(&envelope.context, provider, &commit_timestamp)
            .await
        {
            error!("curated write failed for provider {}: {err}", provider.id);
            continue;
        }

        let mut seen_categories: Vec<&str> = Vec::new();
        for category in &provider.categories {
            if seen_categories.contains(&category.id.as_str()) {
                continue;
            }
            seen_categories.push(&category.id);

            let event = CatalogAccepted {
                seller_id: envelope.context.bpp_id.clone(),
                city: envelope.context.city.clone(),
                category: category.id.clone(),
                timestamp: commit_timestamp.clone(),
                provider_id: provider.id.clone(),
                domain: envelope.context.domain.clone(),
            };
            match context.sink.publish_accepted(&event).await {
                Ok(()) => emitted += 1,
                Err(err) => error!("failed to publish accepted event: {err}"),
            }
        }
    }

    counter!("schemagate_events_emitted_total").increment(emitted as u64);
    emitted
}

/// Long-running schema-gate consumer on the ingest topic. Poison messages
/// are logged and skipped with their offset advanced; everything else is
/// at-least-once.
pub async fn run(context: Arc<AppContext>, consumer: SingleTopicConsumer, liveness: HealthHandle) {
    info!("schema-gate consuming from ingest topic");
    loop {
        match consumer.json_recv::<OnSearchEnvelope>().await {
            Ok((envelope, offset)) => {
                counter!("schemagate_envelopes_total").increment(1);
                process_envelope(&context, &envelope).await;
                if let Err(err) = offset.store() {
                    warn!("failed to store ingest offset: {err}");
                }
                liveness.report_healthy().await;
            }
            Err(RecvErr::Empty) | Err(RecvErr::Serde(_)) => {
                // Offset already stored by the consumer, skip the message
                counter!("schemagate_poison_messages_total").increment(1);
                warn!("skipping undecodable ingest message");
                liveness.report_healthy().await;
            }
            Err(RecvErr::Kafka(err)) => {
                error!("schema-gate consumer error: {err}");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}
