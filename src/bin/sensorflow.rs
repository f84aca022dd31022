//! Sensorflow Runtime
//!
//! Receives sensor readings over UDP, keeps a rolling window per sensor and
//! serves reports over HTTP.
//!
//! Usage:
//!   cargo run --release --bin sensorflow
//!
//! Environment variables:
//!   SENSORFLOW_DATA_ADDR - UDP listen address (default: 0.0.0.0:8093)
//!   SENSORFLOW_CONTROL_ADDR - HTTP control panel (default: 0.0.0.0:8093)
//!   SENSORFLOW_WINDOW_SIZE - Buckets per sensor (default: 7)
//!   SENSORFLOW_TICK_INTERVAL_SECS - Rotation interval (default: 86400)
//!   SENSORFLOW_SYNC_MODE - locked | best-effort (default: locked)
//!   SENSORFLOW_MAX_SOURCES - Sensor ceiling (default: unbounded)
//!   MODE_DEMO - 2s rotation plus built-in sensor mock (default: false)

use dotenv::dotenv;
use log::{error, info, warn};
use sensorflow::mock::SensorMock;
use sensorflow::pipeline::{
    rotation_scheduler_task, shutdown_channel, start_ingestion, EntityRegistry, IngestionStats,
    PipelineConfig, RegistryView,
};
use sensorflow::report::ControlPanel;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting Sensorflow...");

    let config = PipelineConfig::from_env()?;

    info!("📊 Configuration:");
    info!("   ├─ Data address (UDP): {}", config.data_addr);
    info!("   ├─ Control panel (HTTP): {}", config.control_addr);
    info!("   ├─ Window size: {} buckets", config.window_size);
    info!("   ├─ Tick interval: {:?}", config.tick_interval);
    info!("   ├─ Sync mode: {}", config.sync_mode);
    match config.max_sources {
        Some(limit) => info!("   ├─ Max sources: {}", limit),
        None => info!("   ├─ Max sources: unbounded"),
    }
    info!("   └─ Demo mode: {}", config.demo);

    let registry = Arc::new(EntityRegistry::new(config.registry_options()));
    let stats = Arc::new(IngestionStats::new());
    let (trigger, signal) = shutdown_channel();

    let socket = UdpSocket::bind(config.data_addr).await?;
    info!("✅ Listening for readings on {}", socket.local_addr()?);

    let panel = ControlPanel::new(RegistryView::new(registry.clone()), stats.clone(), trigger.clone());
    let panel_handle = panel.start(config.control_addr, signal.clone())?;

    info!("🚀 Spawning background tasks...");

    let ingestion_task = tokio::spawn(start_ingestion(socket, registry.clone(), stats.clone(), signal.clone()));
    info!("   ├─ ✅ Ingestion task spawned");

    let scheduler_task = tokio::spawn(rotation_scheduler_task(registry.clone(), config.tick_interval, signal.clone()));
    info!("   ├─ ✅ Rotation scheduler spawned");

    let mock_task = if config.demo {
        let target = mock_target(config.data_addr);
        let mock = SensorMock::new(target, config.mock_sensors, config.mock_interval);
        info!("   └─ ✅ Sensor mock spawned ({} sensors)", config.mock_sensors);
        Some(tokio::spawn(mock.run(signal.clone())))
    } else {
        info!("   └─ Sensor mock disabled");
        None
    };

    info!("🔄 Press CTRL+C or open /exit to shutdown gracefully");

    let mut waiter = signal.clone();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => warn!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
        _ = waiter.wait() => {
            warn!("⚠️  Shutdown requested, stopping...");
        }
    }
    trigger.trigger();

    match tokio::time::timeout(TASK_JOIN_TIMEOUT, ingestion_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("❌ Ingestion ended with error: {}", e),
        Ok(Err(e)) => error!("❌ Ingestion task panicked: {}", e),
        Err(_) => warn!("⚠️  Ingestion did not stop within {:?}", TASK_JOIN_TIMEOUT),
    }

    match tokio::time::timeout(TASK_JOIN_TIMEOUT, scheduler_task).await {
        Ok(Ok(rotations)) => info!("   ├─ Rotations performed: {}", rotations),
        Ok(Err(e)) => error!("❌ Scheduler task panicked: {}", e),
        Err(_) => warn!("⚠️  Scheduler did not stop within {:?}", TASK_JOIN_TIMEOUT),
    }

    if let Some(task) = mock_task {
        match tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await {
            Ok(Ok(Ok(sent))) => info!("   ├─ Mock readings sent: {}", sent),
            Ok(Ok(Err(e))) => error!("❌ Sensor mock failed: {}", e),
            Ok(Err(e)) => error!("❌ Sensor mock task panicked: {}", e),
            Err(_) => warn!("⚠️  Sensor mock did not stop within {:?}", TASK_JOIN_TIMEOUT),
        }
    }

    tokio::task::spawn_blocking(move || panel_handle.join()).await?;

    info!("✅ Sensorflow stopped ({} sensors tracked)", registry.len());
    Ok(())
}

// The mock sends to loopback when the listener is bound to the wildcard address
fn mock_target(data_addr: std::net::SocketAddr) -> std::net::SocketAddr {
    let mut target = data_addr;
    if target.ip().is_unspecified() {
        target.set_ip(if target.is_ipv4() {
            std::net::Ipv4Addr::LOCALHOST.into()
        } else {
            std::net::Ipv6Addr::LOCALHOST.into()
        });
    }
    target
}
