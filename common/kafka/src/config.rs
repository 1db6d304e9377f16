use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(from = "KAFKA_BROKER", default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds

    // Catalog envelopes can be very large; both sides of the pipeline must
    // accept up to 100 MiB per message.
    #[envconfig(default = "104857600")]
    pub kafka_message_max_bytes: u32,

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

/// Per-consumer settings. Unlike the producer config these are application
/// specific (the process runs two consumer groups), so they are built in
/// code rather than from the environment.
#[derive(Clone)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,
    pub kafka_consumer_topic: String,
    pub kafka_consumer_offset_reset: String, // earliest, latest
    pub kafka_fetch_min_bytes: u32,
    pub kafka_consumer_auto_commit_interval_ms: u32,
}

impl ConsumerConfig {
    pub fn new(group: &str, topic: &str) -> Self {
        Self {
            kafka_consumer_group: group.to_string(),
            kafka_consumer_topic: topic.to_string(),
            kafka_consumer_offset_reset: "earliest".to_string(),
            kafka_fetch_min_bytes: 10 * 1024,
            kafka_consumer_auto_commit_interval_ms: 1000,
        }
    }
}
