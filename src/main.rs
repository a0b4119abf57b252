//! vefd - Virtual Electronic Fiscal Device endpoint
//!
//! TCP server answering fiscal-terminal status checks and serving invoice
//! assignments from a replicated work queue, with optional heartbeat
//! reporting to a remote monitoring endpoint.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vefd_heartbeat::{
    DeviceReport, HeartbeatMonitor, HeartbeatRequest, JsonlAuditSink, PlainCipher,
};
use vefd_queue::{MonitorDirectory, ReplicatedQueue};
use vefd_server::{CommandHandler, Config, RetryPolicy, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if VEFD_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("VEFD_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("VEFD_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting vefd server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Queue monitors: {}", config.queue.monitors.join(", "));
    tracing::info!(
        "  Queue: {} (service {})",
        config.queue.queue,
        config.queue.service
    );

    if let Err(e) = config.heartbeat.validate() {
        tracing::error!("Heartbeat configuration error: {}", e);
        return Err(e.into());
    }

    // Work-queue client behind the monitor directory
    let monitors = config.queue.monitor_addrs()?;
    let directory = MonitorDirectory::new(monitors, &config.queue.service)
        .with_connect_timeout(config.queue.connect_timeout());
    let queue = Arc::new(
        ReplicatedQueue::new(directory, &config.queue.queue)
            .with_connect_timeout(config.queue.connect_timeout()),
    );

    let handler = CommandHandler::new(queue).with_retry(RetryPolicy {
        max_attempts: config.queue.pop_retry_max,
        backoff: config.queue.backoff(),
    });

    let mut server_config = ServerConfig::new(config.network.bind_addr);
    server_config.max_connections = config.network.max_connections;
    server_config.read_buffer_size = config.network.read_buffer_size;
    let server = Arc::new(Server::new(server_config, handler));

    // Heartbeat monitor (optional)
    let heartbeat = if config.heartbeat.enabled {
        if let Some(parent) = config.heartbeat.audit_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let cipher = Arc::new(PlainCipher);
        let report = DeviceReport {
            id: config.heartbeat.device_id.clone(),
            lon: config.heartbeat.longitude,
            lat: config.heartbeat.latitude,
            sw_version: config.heartbeat.sw_version.clone(),
        };
        let content = serde_json::to_string(&report)?;
        let request = HeartbeatRequest::build(
            &config.heartbeat.report_id,
            content,
            cipher.as_ref(),
            &config.heartbeat.key,
        );
        let audit = Arc::new(JsonlAuditSink::new(&config.heartbeat.audit_path));
        let monitor = Arc::new(HeartbeatMonitor::new(
            config.heartbeat.endpoint.clone(),
            request,
            cipher,
            audit,
            config.heartbeat.interval(),
        ));

        tracing::info!(
            "  Heartbeat: enabled ({}, every {}s)",
            config.heartbeat.endpoint,
            config.heartbeat.interval_secs
        );

        let handle = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                monitor.run().await;
            })
        };
        Some((monitor, handle))
    } else {
        tracing::info!("  Heartbeat: disabled");
        None
    };

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    let shutdown_heartbeat = heartbeat.as_ref().map(|(monitor, _)| monitor.clone());
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
        if let Some(monitor) = shutdown_heartbeat {
            monitor.shutdown();
        }
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    // Wait for the heartbeat monitor to stop
    if let Some((_, handle)) = heartbeat {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
