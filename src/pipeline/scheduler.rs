//! Rotation scheduler
//!
//! One background task closes the open bucket of every registered source once
//! per rotation interval.
//!
//! Lifecycle: idle until the interval elapses, tick every entity, back to idle.
//! The task stops on the shutdown signal and never ticks afterwards.
//!
//! Each tick stands for one elapsed calendar period, so late wake-ups are never
//! coalesced: if the task was held up past several deadlines it fires one
//! catch-up rotation per missed interval (`MissedTickBehavior::Burst`). Buckets
//! then over-represent the period they covered, which is accepted.

use super::registry::EntityRegistry;
use super::shutdown::ShutdownSignal;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Outcome of one rotation over the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationSummary {
    /// Accumulators ticked
    pub entities: usize,
    /// Accumulators whose closed bucket held at least one sample
    pub active_entities: usize,
    /// Samples in the buckets that were closed
    pub closed_samples: u64,
}

/// Tick every accumulator in the registry once
pub fn rotate_all(registry: &EntityRegistry) -> RotationSummary {
    let mut summary = RotationSummary::default();
    registry.for_each(|_, accumulator| {
        let closed = accumulator.tick();
        summary.entities += 1;
        if !closed.is_empty() {
            summary.active_entities += 1;
            summary.closed_samples += closed.count;
        }
    });
    summary
}

/// Rotation task - ticks every source once per `tick_interval`
///
/// The first rotation happens one full interval after the task starts.
/// Returns the number of rotations performed once shutdown is observed.
pub async fn rotation_scheduler_task(
    registry: Arc<EntityRegistry>,
    tick_interval: Duration,
    mut shutdown: ShutdownSignal,
) -> u64 {
    log::info!("⏰ Starting rotation scheduler (interval: {:?})", tick_interval);

    let mut timer = interval_at(Instant::now() + tick_interval, tick_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let mut rotations = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => {
                break;
            }

            _ = timer.tick() => {
                let started = std::time::Instant::now();
                let summary = rotate_all(&registry);
                rotations += 1;

                log::info!(
                    "🔄 Rotation #{}: {} sources ticked, {} active, {} samples closed | {}ms",
                    rotations,
                    summary.entities,
                    summary.active_entities,
                    summary.closed_samples,
                    started.elapsed().as_millis()
                );

                if started.elapsed() > tick_interval {
                    log::warn!("⚠️  Rotation took longer than the interval ({:?})", tick_interval);
                }
            }
        }
    }

    log::info!("✅ Rotation scheduler stopped after {} rotations", rotations);
    rotations
}
