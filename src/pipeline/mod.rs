//! # Windowed statistics pipeline
//!
//! Per-source rolling windows of time-bucketed statistics fed by a datagram
//! listener.
//!
//! ## Data flow
//!
//! ```text
//! UDP datagram (4-byte big-endian reading)
//!     ↓
//! ingestion::start_ingestion  (decode, drop malformed)
//!     ↓
//! EntityRegistry::try_resolve (one Accumulator per peer address)
//!     ↓
//! Accumulator::add            (open bucket of the WindowCounter)
//!
//! scheduler::rotation_scheduler_task (every tick interval)
//!     ↓
//! EntityRegistry::for_each → Accumulator::tick (close bucket, open next)
//!
//! RegistryView::snapshot      (read-only, used by reporting)
//! ```
//!
//! ## Module Organization
//!
//! - `types` - Bucket, SourceId, WindowResult
//! - `windows` - Circular bucket window (`WindowCounter`) and snapshot arithmetic
//! - `accumulator` - `Accumulator` with locked / best-effort synchronization
//! - `registry` - `EntityRegistry` and the read-only `RegistryView`
//! - `scheduler` - Rotation task
//! - `ingestion` - Datagram decoding and the ingestion loop
//! - `shutdown` - One-shot shutdown broadcast
//! - `config` - Environment-driven configuration

pub mod types;
pub mod windows;
pub mod accumulator;
pub mod registry;
pub mod scheduler;
pub mod ingestion;
pub mod shutdown;
pub mod config;

// Re-export commonly used types
pub use types::{Bucket, SourceId, ValueKind, WindowResult};
pub use windows::WindowCounter;
pub use accumulator::{Accumulator, SyncMode};
pub use registry::{EntityRegistry, RegistryError, RegistryOptions, RegistryView};
pub use scheduler::{rotate_all, rotation_scheduler_task, RotationSummary};
pub use ingestion::{start_ingestion, DatagramSource, IngestionCounters, IngestionError, IngestionStats};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use config::{ConfigError, PipelineConfig};
