use envconfig::Envconfig;

use common_kafka::config::KafkaConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "GCR_HTTP_ADDR", default = "0.0.0.0:8080")]
    pub address: String,

    #[envconfig(from = "REDIS_ADDR", default = "redis://localhost:6379")]
    pub redis_url: String,

    #[envconfig(from = "DATA_DIR", default = "./data")]
    pub data_dir: String,

    /// Log published messages instead of producing to Kafka; local runs only.
    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested)]
    pub kafka: KafkaConfig,
}
