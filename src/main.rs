use std::{process, sync::Arc, sync::OnceLock, time::Duration};

use serde::Deserialize;
use tagrelay::{
    config::Config,
    core::{
        cache::ReadingCache,
        forwarder::{BrokerDialer, Forwarder},
        settings::{ForwardingSnapshot, SharedSettings},
    },
    logger::LoggerManager,
    print_error,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

/// One decoded sensor reading, as the scanner process writes it to our
/// stdin: one JSON object per line.
#[derive(Debug, Deserialize)]
struct ScanReading {
    /// Source sensor identifier (MAC form).
    mac: String,
    /// Received signal strength in dBm.
    rssi: i32,
    /// Raw advertisement payload, hex encoded.
    data: String,
}

/// Reads scan lines from stdin and hands each reading to the forwarder
/// until EOF or cancellation.
async fn run_reader(forwarder: Forwarder, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let reading: ScanReading = match serde_json::from_str(line) {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("Skipping malformed scan line: {}", e);
                        continue;
                    }
                };
                let payload = match hex::decode(&reading.data) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Skipping reading from {} with bad hex payload: {}", reading.mac, e);
                        continue;
                    }
                };
                forwarder.forward(&payload, reading.rssi, &reading.mac).await;
            }
            Ok(None) => {
                info!("Scan input closed");
                break;
            }
            Err(e) => {
                error!("Failed to read scan input: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting tagrelay version {}...", env!("CARGO_PKG_VERSION"));
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    debug!("{:#?}", cfg.transport);
    info!("Log level: {}", cfg.logger.level);

    let settings = SharedSettings::new(ForwardingSnapshot::from(&cfg.forwarding));
    let cache = ReadingCache::new(
        &cfg.forwarding.cache.state_dir,
        cfg.forwarding.cache.retention_hours,
        cfg.forwarding.cache.max_size_bytes,
    );
    info!(
        "Cache directory: {} (retention {} h, ceiling {} bytes)",
        cache.root().display(),
        cfg.forwarding.cache.retention_hours,
        cfg.forwarding.cache.max_size_bytes
    );

    let forwarder = Forwarder::new(
        Arc::new(settings),
        Arc::new(BrokerDialer::new(cfg.transport.clone())),
        cache,
        Duration::from_secs(cfg.forwarding.retry_interval_secs),
    );
    if cfg.forwarding.enabled {
        info!(
            "Forwarding enabled: broker {}:{}, gateway {}",
            cfg.forwarding.host, cfg.forwarding.port, cfg.forwarding.gateway_id
        );
    } else {
        info!("Forwarding disabled; readings will be dropped");
    }

    // Log status transitions for operators.
    {
        let mut status_rx = forwarder.status();
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = status_rx.borrow().clone();
                info!("Forwarder status: {}", status);
            }
        });
    }

    // Flush whatever a previous run left behind before new readings come in.
    forwarder.drain().await;

    let cancel = CancellationToken::new();
    let reader = tokio::spawn(run_reader(forwarder.clone(), cancel.clone()));

    tokio::select! {
        _ = reader => {
            info!("Scan input ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
            cancel.cancel();
        }
    }

    forwarder.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
