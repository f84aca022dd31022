//! Standalone sensor mock
//!
//! Usage:
//!   cargo run --bin sensor_mock -- [target] [sensors] [interval_ms]
//!
//! Defaults: 127.0.0.1:8093, 40 sensors, 1000ms

use dotenv::dotenv;
use log::{error, info};
use sensorflow::mock::SensorMock;
use sensorflow::pipeline::shutdown_channel;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let target: SocketAddr = args.get(1).map(|s| s.as_str()).unwrap_or("127.0.0.1:8093").parse()?;
    let sensors: usize = args.get(2).map(|s| s.parse::<usize>()).transpose()?.unwrap_or(40);
    let interval_ms: u64 = args.get(3).map(|s| s.parse::<u64>()).transpose()?.unwrap_or(1_000);

    if interval_ms == 0 {
        return Err("interval_ms must be at least 1".into());
    }

    let (trigger, signal) = shutdown_channel();
    let mock = SensorMock::new(target, sensors, Duration::from_millis(interval_ms));
    let task = tokio::spawn(mock.run(signal));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }
    trigger.trigger();

    let sent = task.await??;
    info!("✅ Sent {} readings", sent);
    Ok(())
}
