//! Integration tests for the sensorflow pipeline
//!
//! Readings travel over real loopback UDP sockets into the ingestion loop,
//! get rotated by the scheduler and are read back through the reporting
//! surface.
//!
//! Key integration points tested:
//! - One accumulator per sender address
//! - Malformed datagrams dropped without affecting state
//! - Rotation across every registered source
//! - Reports reflect ingested readings
//! - Shutdown stops every task

#[cfg(test)]
mod pipeline_integration_tests {
    use sensorflow::pipeline::ingestion::encode_reading;
    use sensorflow::pipeline::{
        rotate_all, rotation_scheduler_task, shutdown_channel, start_ingestion, EntityRegistry,
        IngestionStats, RegistryOptions, RegistryView, SyncMode,
    };
    use sensorflow::report::{celsius_to_millikelvin, ControlPanel};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn wait_for_accepted(stats: &IngestionStats, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.counters().accepted < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("readings were not ingested in time");
    }

    async fn sensor_socket(target: std::net::SocketAddr) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(target).await.unwrap();
        socket
    }

    async fn run_end_to_end(sync_mode: SyncMode) {
        let registry = Arc::new(EntityRegistry::new(RegistryOptions {
            window_size: 3,
            sync_mode,
            max_sources: None,
        }));
        let stats = Arc::new(IngestionStats::new());
        let (trigger, signal) = shutdown_channel();

        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        let ingestion = tokio::spawn(start_ingestion(listener, registry.clone(), stats.clone(), signal.clone()));

        let sensor_a = sensor_socket(target).await;
        let sensor_b = sensor_socket(target).await;

        // Day 1: A reads 20 and 22, B reads 10, plus one malformed datagram
        sensor_a.send(&encode_reading(celsius_to_millikelvin(20.0) as u32)).await.unwrap();
        sensor_a.send(&encode_reading(celsius_to_millikelvin(22.0) as u32)).await.unwrap();
        sensor_b.send(&encode_reading(celsius_to_millikelvin(10.0) as u32)).await.unwrap();
        sensor_b.send(&[1, 2, 3]).await.unwrap();
        wait_for_accepted(&stats, 3).await;

        let summary = rotate_all(&registry);
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.active_entities, 2);
        assert_eq!(summary.closed_samples, 3);

        // Day 2: only A reports
        sensor_a.send(&encode_reading(celsius_to_millikelvin(30.0) as u32)).await.unwrap();
        wait_for_accepted(&stats, 4).await;

        let view = RegistryView::new(registry.clone());
        let snapshots = view.sorted_snapshots();
        assert_eq!(snapshots.len(), 2);

        let a = view
            .snapshot(sensorflow::pipeline::SourceId::new(sensor_a.local_addr().unwrap()))
            .unwrap();
        assert!(a.nonzero);
        assert_eq!(a.count, vec![2, 1]);
        assert_eq!(a.values, vec![294_150, 303_150]);
        assert_eq!(a.window_max, 303_150);
        assert_eq!(a.window_min, 294_150);

        let b = view
            .snapshot(sensorflow::pipeline::SourceId::new(sensor_b.local_addr().unwrap()))
            .unwrap();
        assert_eq!(b.count, vec![1, 0]);
        assert_eq!(b.values, vec![283_150, 0]);

        let counters = stats.counters();
        assert_eq!(counters.accepted, 4);
        assert_eq!(counters.dropped_malformed, 1);

        // Reports served by the control panel see the same state
        let panel = ControlPanel::new(view, stats.clone(), trigger.clone());
        let metrics = panel.route("/metrics");
        assert!(metrics.body.contains("sensor_temperature_sources 2"));
        assert!(metrics.body.contains("sensor_temperature_datagrams_total{outcome=\"malformed\"} 1"));

        // /exit stops ingestion
        panel.route("/exit");
        let result = tokio::time::timeout(Duration::from_secs(5), ingestion)
            .await
            .expect("ingestion did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_end_to_end_locked() {
        // Test: Full datagram → window → report flow with locked accumulators
        run_end_to_end(SyncMode::Locked).await;
    }

    #[tokio::test]
    async fn test_end_to_end_best_effort() {
        // Test: Same flow with lock-free best-effort accumulators
        run_end_to_end(SyncMode::BestEffort).await;
    }

    #[tokio::test]
    async fn test_source_ceiling_drops_new_senders() {
        // Test: Readings from senders beyond the ceiling are counted and dropped
        let registry = Arc::new(EntityRegistry::new(RegistryOptions {
            max_sources: Some(1),
            ..RegistryOptions::default()
        }));
        let stats = Arc::new(IngestionStats::new());
        let (trigger, signal) = shutdown_channel();

        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        let ingestion = tokio::spawn(start_ingestion(listener, registry.clone(), stats.clone(), signal));

        let first = sensor_socket(target).await;
        first.send(&encode_reading(293_150)).await.unwrap();
        wait_for_accepted(&stats, 1).await;

        let second = sensor_socket(target).await;
        second.send(&encode_reading(293_150)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.counters().dropped_registry_full < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("over-limit datagram not observed");

        assert_eq!(registry.len(), 1);

        trigger.trigger();
        ingestion.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_rotates_ingested_sources() {
        // Test: Scheduler rotation runs while ingestion keeps writing
        let registry = Arc::new(EntityRegistry::new(RegistryOptions {
            window_size: 4,
            ..RegistryOptions::default()
        }));
        let stats = Arc::new(IngestionStats::new());
        let (trigger, signal) = shutdown_channel();

        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        let ingestion = tokio::spawn(start_ingestion(listener, registry.clone(), stats.clone(), signal.clone()));
        let scheduler = tokio::spawn(rotation_scheduler_task(
            registry.clone(),
            Duration::from_millis(50),
            signal,
        ));

        let sensor = sensor_socket(target).await;
        for _ in 0..5 {
            sensor.send(&encode_reading(300_000)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        wait_for_accepted(&stats, 5).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        trigger.trigger();
        let rotations = scheduler.await.unwrap();
        ingestion.await.unwrap().unwrap();

        assert!(rotations >= 2);
        let accumulator = registry
            .get(sensorflow::pipeline::SourceId::new(sensor.local_addr().unwrap()))
            .unwrap();
        assert!(accumulator.ticks() >= 1);
        assert!(accumulator.ticks() <= rotations);
        assert!(accumulator.snapshot_average(1).total_count() <= 5);
    }
}
