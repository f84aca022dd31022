//! Datagram ingestion - decodes readings and feeds the registry
//!
//! Wire format: exactly 4 bytes, a big-endian `u32` reading in an offset
//! integer domain (millikelvin for temperature sensors). The source identity is
//! the sender's address and port. Anything that is not exactly 4 bytes is
//! dropped and counted before it reaches an accumulator.

use super::registry::EntityRegistry;
use super::shutdown::ShutdownSignal;
use super::types::SourceId;
use async_trait::async_trait;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Size of one encoded reading
pub const READING_LEN: usize = 4;

/// Receive buffer; anything longer is truncated and then rejected
const RECV_BUFFER_LEN: usize = 128;

/// Seconds between throughput log lines
const THROUGHPUT_LOG_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    WrongLength { len: usize },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::WrongLength { len } => {
                write!(f, "Expected {}-byte reading, got {} bytes", READING_LEN, len)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug)]
pub enum IngestionError {
    Transport(std::io::Error),
}

impl From<std::io::Error> for IngestionError {
    fn from(err: std::io::Error) -> Self {
        IngestionError::Transport(err)
    }
}

impl std::fmt::Display for IngestionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestionError::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for IngestionError {}

/// Decode one datagram payload into a reading
pub fn decode_reading(payload: &[u8]) -> Result<u32, DecodeError> {
    let bytes: [u8; READING_LEN] = payload
        .try_into()
        .map_err(|_| DecodeError::WrongLength { len: payload.len() })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Encode a reading for the wire (used by the sensor mock and tests)
pub fn encode_reading(reading: u32) -> [u8; READING_LEN] {
    reading.to_be_bytes()
}

/// Transport the ingestion loop reads from
#[async_trait]
pub trait DatagramSource: Send + Sync {
    /// Receive one datagram into `buf`, returning its length and sender
    async fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_datagram(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }
}

/// Counters shared between the ingestion loop and reporting
#[derive(Debug, Default)]
pub struct IngestionStats {
    accepted: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_registry_full: AtomicU64,
}

/// Plain copy of `IngestionStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionCounters {
    pub accepted: u64,
    pub dropped_malformed: u64,
    pub dropped_registry_full: u64,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> IngestionCounters {
        IngestionCounters {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_registry_full: self.dropped_registry_full.load(Ordering::Relaxed),
        }
    }
}

/// Handle one datagram: decode, resolve the source, add the reading
///
/// Returns `true` if the reading was accepted.
pub fn process_datagram(
    registry: &EntityRegistry,
    stats: &IngestionStats,
    peer: SocketAddr,
    payload: &[u8],
) -> bool {
    let reading = match decode_reading(payload) {
        Ok(reading) => reading,
        Err(e) => {
            stats.dropped_malformed.fetch_add(1, Ordering::Relaxed);
            log::debug!("Dropping datagram from {}: {}", peer, e);
            return false;
        }
    };

    match registry.try_resolve(SourceId::from(peer)) {
        Ok(accumulator) => {
            accumulator.add(u64::from(reading));
            stats.accepted.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(e) => {
            let dropped = stats.dropped_registry_full.fetch_add(1, Ordering::Relaxed);
            if dropped % 1_000 == 0 {
                log::warn!("⚠️  {} ({} readings dropped so far)", e, dropped + 1);
            }
            false
        }
    }
}

/// Ingestion loop - reads datagrams until shutdown or a transport failure
///
/// One datagram is processed at a time. The loop only waits on the transport
/// and on the shutdown signal, so shutdown is observed within one iteration.
pub async fn start_ingestion<S: DatagramSource>(
    source: S,
    registry: Arc<EntityRegistry>,
    stats: Arc<IngestionStats>,
    mut shutdown: ShutdownSignal,
) -> Result<(), IngestionError> {
    log::info!("🚀 Starting datagram ingestion");

    let mut buffer = [0u8; RECV_BUFFER_LEN];
    let mut window_accepted = 0u64;
    let mut last_log_time = std::time::Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => {
                break;
            }

            received = source.recv_datagram(&mut buffer) => {
                let (len, peer) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        log::error!("❌ Datagram receive failed: {}", e);
                        return Err(IngestionError::Transport(e));
                    }
                };

                if process_datagram(&registry, &stats, peer, &buffer[..len]) {
                    window_accepted += 1;
                }

                if last_log_time.elapsed().as_secs() >= THROUGHPUT_LOG_SECS {
                    let rate = window_accepted as f64 / last_log_time.elapsed().as_secs_f64();
                    let counters = stats.counters();
                    log::info!(
                        "📊 Ingestion rate: {:.1} readings/sec | sources: {} | dropped: {} malformed, {} over limit",
                        rate,
                        registry.len(),
                        counters.dropped_malformed,
                        counters.dropped_registry_full
                    );
                    last_log_time = std::time::Instant::now();
                    window_accepted = 0;
                }
            }
        }
    }

    let counters = stats.counters();
    log::info!(
        "✅ Ingestion stopped ({} accepted, {} malformed, {} over limit)",
        counters.accepted,
        counters.dropped_malformed,
        counters.dropped_registry_full
    );
    Ok(())
}
