//! Prometheus exposition of the sensor windows
//!
//! Metrics are rebuilt from a `RegistryView` on every scrape, so sources and
//! buckets that rotated out never linger as stale series.
//!
//! **Gauges:**
//! - `<name>_bucket_average` - per-bucket average (millikelvin), labelled by
//!   source and bucket position (0 = oldest); empty buckets are skipped
//! - `<name>_window_average` - mean of the bucket averages, sources with data only
//! - `<name>_window_samples` - samples held in the window
//! - `<name>_sources` - sources registered
//!
//! **Counters:**
//! - `<name>_datagrams_total` - datagrams by outcome (accepted/malformed/over_limit)

use crate::pipeline::{IngestionCounters, RegistryView};
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Metric collection for one scrape
pub struct SensorMetrics {
    registry: Registry,
    bucket_average: IntGaugeVec,
    window_average: IntGaugeVec,
    window_samples: IntGaugeVec,
    sources: IntGauge,
    datagrams_total: IntCounterVec,
}

impl SensorMetrics {
    /// Create and register every metric family under the `name` prefix
    pub fn new(name: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bucket_average = IntGaugeVec::new(
            Opts::new(
                format!("{}_bucket_average", name),
                "Per-bucket average reading (millikelvin)",
            ),
            &["source", "bucket"],
        )?;
        registry.register(Box::new(bucket_average.clone()))?;

        let window_average = IntGaugeVec::new(
            Opts::new(
                format!("{}_window_average", name),
                "Mean of bucket averages (millikelvin)",
            ),
            &["source"],
        )?;
        registry.register(Box::new(window_average.clone()))?;

        let window_samples = IntGaugeVec::new(
            Opts::new(format!("{}_window_samples", name), "Samples held in the window"),
            &["source"],
        )?;
        registry.register(Box::new(window_samples.clone()))?;

        let sources = IntGauge::new(format!("{}_sources", name), "Sources registered")?;
        registry.register(Box::new(sources.clone()))?;

        let datagrams_total = IntCounterVec::new(
            Opts::new(format!("{}_datagrams_total", name), "Datagrams by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(datagrams_total.clone()))?;

        Ok(Self {
            registry,
            bucket_average,
            window_average,
            window_samples,
            sources,
            datagrams_total,
        })
    }

    /// Load the current window state and ingestion counters
    pub fn observe(&self, view: &RegistryView, counters: IngestionCounters) {
        let snapshots = view.sorted_snapshots();

        for (source, result) in &snapshots {
            let source = source.to_string();
            for (bucket, (&value, &count)) in result.values.iter().zip(&result.count).enumerate() {
                if count == 0 {
                    continue;
                }
                self.bucket_average
                    .with_label_values(&[source.as_str(), bucket.to_string().as_str()])
                    .set(gauge_value(value));
            }
            if result.nonzero {
                self.window_average
                    .with_label_values(&[source.as_str()])
                    .set(gauge_value(result.window_average));
            }
            self.window_samples
                .with_label_values(&[source.as_str()])
                .set(gauge_value(result.total_count()));
        }

        self.sources.set(gauge_value(snapshots.len() as u64));

        for (outcome, total) in [
            ("accepted", counters.accepted),
            ("malformed", counters.dropped_malformed),
            ("over_limit", counters.dropped_registry_full),
        ] {
            self.datagrams_total.with_label_values(&[outcome]).inc_by(total);
        }
    }

    /// Encode every registered family in the text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Prometheus text exposition of `view` under the `name` prefix
pub fn render_prometheus(
    view: &RegistryView,
    counters: IngestionCounters,
    name: &str,
) -> Result<String, prometheus::Error> {
    let metrics = SensorMetrics::new(name)?;
    metrics.observe(view, counters);
    metrics.encode()
}
