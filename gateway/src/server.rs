use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common_kafka::config::ConsumerConfig;
use common_kafka::kafka_consumer::SingleTopicConsumer;
use common_kafka::kafka_producer::create_kafka_producer;
use common_redis::RedisClient;
use health::HealthRegistry;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app_context::AppContext;
use crate::config::Config;
use crate::router::router;
use crate::sinks::kafka::KafkaSink;
use crate::sinks::{CatalogSink, PrintSink, ACCEPTED_TOPIC, INGEST_TOPIC};
use crate::time::SystemTime;
use crate::{projections, schemagate};

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let liveness = HealthRegistry::new("liveness");

    let redis = Arc::new(
        RedisClient::new(config.redis_url.clone())
            .await
            .expect("failed to create redis client"),
    );

    let sink: Arc<dyn CatalogSink + Send + Sync> = if config.print_sink {
        Arc::new(PrintSink {})
    } else {
        let producer_liveness = liveness
            .register("rdkafka".to_string(), Duration::from_secs(30))
            .await;
        let producer = create_kafka_producer(&config.kafka, producer_liveness)
            .await
            .expect("failed to create kafka producer");
        Arc::new(KafkaSink::new(producer))
    };

    let context = Arc::new(AppContext::new(
        sink,
        redis.clone(),
        Arc::new(SystemTime {}),
        Path::new(&config.data_dir),
        liveness.clone(),
    ));

    // Idempotent: exists-errors from a previous boot are ignored
    context.filters.init().await;

    let mut consumers: Vec<JoinHandle<()>> = Vec::new();
    if !config.print_sink {
        consumers.push(start_schemagate(&config, context.clone(), &liveness).await);
        consumers.push(start_projectors(&config, context.clone(), &liveness).await);
    }

    let app = router(context, config.export_prometheus);

    info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("server error");

    // In-flight worker pools drain before their consumer task yields back
    // to the read loop, so aborting here only interrupts blocked reads.
    for consumer in consumers {
        consumer.abort();
    }
}

async fn start_schemagate(
    config: &Config,
    context: Arc<AppContext>,
    liveness: &HealthRegistry,
) -> JoinHandle<()> {
    let consumer = SingleTopicConsumer::new(
        config.kafka.clone(),
        ConsumerConfig::new(schemagate::CONSUMER_GROUP, INGEST_TOPIC),
    )
    .expect("failed to create schema-gate consumer");
    let handle = liveness
        .register("schemagate".to_string(), Duration::from_secs(60))
        .await;
    handle.report_healthy().await;
    tokio::spawn(schemagate::run(context, consumer, handle))
}

async fn start_projectors(
    config: &Config,
    context: Arc<AppContext>,
    liveness: &HealthRegistry,
) -> JoinHandle<()> {
    let consumer = SingleTopicConsumer::new(
        config.kafka.clone(),
        ConsumerConfig::new(projections::CONSUMER_GROUP, ACCEPTED_TOPIC),
    )
    .expect("failed to create projectors consumer");
    let handle = liveness
        .register("projectors".to_string(), Duration::from_secs(60))
        .await;
    handle.report_healthy().await;
    tokio::spawn(projections::run(context.redis.clone(), consumer, handle))
}
