//! Simulated sensor fleet
//!
//! Each sensor owns a connected UDP socket, so every one shows up as a
//! distinct source address at the receiver.

use crate::pipeline::ingestion::encode_reading;
use crate::pipeline::ShutdownSignal;
use crate::report::units::celsius_to_millikelvin;
use log::{debug, info, warn};
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Highest simulated base temperature (Celsius)
pub const MAX_BASE_CELSIUS: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct SensorMock {
    pub target: SocketAddr,
    pub sensors: usize,
    pub interval: Duration,
}

impl SensorMock {
    pub fn new(target: SocketAddr, sensors: usize, interval: Duration) -> Self {
        Self {
            target,
            sensors,
            interval,
        }
    }

    /// Send one reading per sensor every `interval` until shutdown
    ///
    /// Sensor `i` reads `base` Celsius plus `i` millikelvin, `base` drawn once per round.
    /// Returns the number of datagrams sent.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> std::io::Result<u64> {
        let mut sockets = Vec::with_capacity(self.sensors);
        for _ in 0..self.sensors {
            let socket = UdpSocket::bind(bind_addr_for(self.target)).await?;
            socket.connect(self.target).await?;
            sockets.push(socket);
        }

        info!("🌡️  Sensor mock started: {} sensors → {} every {:?}", self.sensors, self.target, self.interval);

        let mut sent = 0u64;
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("✅ Sensor mock stopped after {} readings", sent);
                    return Ok(sent);
                }

                _ = interval.tick() => {
                    let base = rand::thread_rng().gen_range(0.0..MAX_BASE_CELSIUS);
                    for (offset, socket) in sockets.iter().enumerate() {
                        let reading = mock_reading(base, offset);
                        match socket.send(&encode_reading(reading)).await {
                            Ok(_) => sent += 1,
                            Err(e) => warn!("⚠️  Sensor mock send failed: {}", e),
                        }
                    }
                    debug!("Sensor mock round sent (base {:.1}°C)", base);
                }
            }
        }
    }
}

/// Reading in millikelvin for sensor `offset` at base temperature `base`
pub fn mock_reading(base: f64, offset: usize) -> u32 {
    celsius_to_millikelvin(base)
        .saturating_add(offset as u64)
        .min(u32::MAX as u64) as u32
}

fn bind_addr_for(target: SocketAddr) -> SocketAddr {
    if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    }
}
