//! Embedded MQTT 3.1.1 broker entry point: reads `config.toml`, installs
//! the logger and runs the broker loop on a single-threaded cooperative
//! runtime.

use std::path::Path;

use log::{error, info};
use tokio::net::TcpListener;

use mqtt_broker::broker::Broker;
use mqtt_broker::config::BrokerConfig;
use mqtt_broker::logger::BrokerLogger;

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let config = BrokerConfig::try_from(Path::new("config.toml")).unwrap_or_else(|e| {
        eprintln!("failed to load config.toml, falling back to defaults: {e}");
        BrokerConfig::default()
    });

    let filter = BrokerLogger::level_filter(&config.logger);
    let logger = BrokerLogger::new(&config.logger, Path::new("logs").to_path_buf());
    if logger.install(filter).is_err() {
        eprintln!("a logger was already installed; continuing with it");
    }

    let addr = format!("{}:{}", config.connection.host, config.connection.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            return Err(e);
        }
    };
    info!("mqtt-broker listening on {addr}");

    let broker = Broker::new(config);
    broker.run(listener).await
}
