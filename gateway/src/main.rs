use envconfig::Envconfig;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gateway::config::Config;
use gateway::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutting down gracefully...");
}

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer();
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(log_layer)
        .init();
}

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::init_from_env().expect("failed to load configuration");

    let listener = TcpListener::bind(&config.address)
        .await
        .expect("failed to bind listen address");
    info!("catalog gateway listening on {}", config.address);

    serve(config, listener, shutdown()).await
}
