//! Source registry: one accumulator per observed source
//!
//! Structural changes (inserting a new source) and structural reads (lookup,
//! enumeration) share one `RwLock`. Each accumulator keeps its own lock for
//! bucket state, so `add` on one source never contends with another source.
//!
//! Entries are never removed. Without a ceiling, sustained traffic from new
//! addresses grows the map without bound.

use super::accumulator::{Accumulator, SyncMode};
use super::types::{SourceId, ValueKind, WindowResult};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Construction parameters, fixed for the registry's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Buckets per accumulator (N)
    pub window_size: usize,
    /// Synchronization policy for every accumulator created
    pub sync_mode: SyncMode,
    /// Optional ceiling on the number of distinct sources
    pub max_sources: Option<usize>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            window_size: 7,
            sync_mode: SyncMode::Locked,
            max_sources: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The source is new and the registry already holds `limit` sources
    CapacityReached { source: SourceId, limit: usize },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::CapacityReached { source, limit } => {
                write!(f, "Registry full ({} sources), rejecting {}", limit, source)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Concurrency-safe map from `SourceId` to its `Accumulator`
#[derive(Debug)]
pub struct EntityRegistry {
    entries: RwLock<HashMap<SourceId, Arc<Accumulator>>>,
    options: RegistryOptions,
}

impl EntityRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    /// Return the accumulator for `source`, creating it on first sight
    ///
    /// Ignores the ceiling. Two racing first-sight calls for the same source
    /// always return the same instance.
    pub fn resolve(&self, source: SourceId) -> Arc<Accumulator> {
        if let Some(existing) = self.get(source) {
            return existing;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(source)
            .or_insert_with(|| Arc::new(self.create(source)))
            .clone()
    }

    /// Like `resolve`, but refuses new sources once the ceiling is reached
    ///
    /// Known sources always resolve.
    pub fn try_resolve(&self, source: SourceId) -> Result<Arc<Accumulator>, RegistryError> {
        if let Some(existing) = self.get(source) {
            return Ok(existing);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the write lock: another writer may have inserted it
        if let Some(existing) = entries.get(&source) {
            return Ok(existing.clone());
        }
        if let Some(limit) = self.options.max_sources {
            if entries.len() >= limit {
                return Err(RegistryError::CapacityReached { source, limit });
            }
        }
        let created = Arc::new(self.create(source));
        entries.insert(source, created.clone());
        log::debug!("New source registered: {} (total: {})", source, entries.len());
        Ok(created)
    }

    /// Lookup without creation
    pub fn get(&self, source: SourceId) -> Option<Arc<Accumulator>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every entry
    ///
    /// Handles are cloned under the read lock and the callback runs after it
    /// is released, so a slow callback never blocks first-sight inserts.
    /// Sources inserted during the walk are not visited.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SourceId, &Accumulator),
    {
        for (source, accumulator) in self.entries_snapshot() {
            f(source, &accumulator);
        }
    }

    fn entries_snapshot(&self) -> Vec<(SourceId, Arc<Accumulator>)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(source, acc)| (*source, acc.clone()))
            .collect()
    }

    fn create(&self, source: SourceId) -> Accumulator {
        Accumulator::with_mode(source.to_string(), self.options.window_size, self.options.sync_mode)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(RegistryOptions::default())
    }
}

/// Read-only handle handed to reporting
///
/// Exposes snapshots only; there is no path from a view to `add`, `tick` or
/// `reset`.
#[derive(Debug, Clone)]
pub struct RegistryView {
    registry: Arc<EntityRegistry>,
}

impl RegistryView {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    pub fn window_size(&self) -> usize {
        self.registry.options().window_size
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Average snapshot of one source, `None` if it was never seen
    pub fn snapshot(&self, source: SourceId) -> Option<WindowResult> {
        self.registry
            .get(source)
            .map(|acc| acc.snapshot(1, ValueKind::Average))
    }

    /// Average snapshot of every source, in no particular order
    pub fn for_each_snapshot<F>(&self, mut f: F)
    where
        F: FnMut(SourceId, WindowResult),
    {
        self.registry
            .for_each(|source, acc| f(source, acc.snapshot(1, ValueKind::Average)));
    }

    /// Average snapshots sorted by source address
    pub fn sorted_snapshots(&self) -> Vec<(SourceId, WindowResult)> {
        let mut snapshots = Vec::with_capacity(self.len());
        self.for_each_snapshot(|source, result| snapshots.push((source, result)));
        snapshots.sort_by_key(|(source, _)| *source);
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Barrier;
    use std::thread;

    fn source(port: u16) -> SourceId {
        SourceId::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn test_resolve_creates_once() {
        let registry = EntityRegistry::default();
        let first = registry.resolve(source(1000));
        let second = registry.resolve(source(1000));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.label(), "127.0.0.1:1000");
        assert_eq!(first.window_size(), 7);
    }

    #[test]
    fn test_same_ip_different_port_is_different_source() {
        let registry = EntityRegistry::default();
        let a = registry.resolve(source(1000));
        let b = registry.resolve(source(1001));

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_first_sight_single_instance() {
        // Test: 100 threads resolve the same new source at once
        let registry = Arc::new(EntityRegistry::default());
        let barrier = Arc::new(Barrier::new(100));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let acc = registry.resolve(source(5555));
                    acc.add(1);
                    acc
                })
            })
            .collect();

        let resolved: Vec<Arc<Accumulator>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        assert!(resolved.iter().all(|acc| Arc::ptr_eq(acc, &resolved[0])));
        for acc in &resolved {
            assert_eq!(acc.snapshot_sum(1).count, vec![100]);
        }
    }

    #[test]
    fn test_concurrent_try_resolve_single_instance() {
        let registry = Arc::new(EntityRegistry::new(RegistryOptions {
            max_sources: Some(1),
            ..RegistryOptions::default()
        }));
        let barrier = Arc::new(Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry.try_resolve(source(7777)).unwrap()
                })
            })
            .collect();

        let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(registry.len(), 1);
        assert!(resolved.iter().all(|acc| Arc::ptr_eq(acc, &resolved[0])));
    }

    #[test]
    fn test_try_resolve_respects_ceiling() {
        let registry = EntityRegistry::new(RegistryOptions {
            max_sources: Some(2),
            ..RegistryOptions::default()
        });

        assert!(registry.try_resolve(source(1)).is_ok());
        assert!(registry.try_resolve(source(2)).is_ok());

        let err = registry.try_resolve(source(3)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::CapacityReached {
                source: source(3),
                limit: 2
            }
        );
        // Known sources still resolve at the ceiling
        assert!(registry.try_resolve(source(1)).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_for_each_during_inserts() {
        // Test: enumeration racing inserts never panics or skips existing entries
        let registry = Arc::new(EntityRegistry::default());
        for port in 0..50 {
            registry.resolve(source(port));
        }

        let inserter = {
            let registry = registry.clone();
            thread::spawn(move || {
                for port in 50..500 {
                    registry.resolve(source(port));
                }
            })
        };

        for _ in 0..20 {
            let mut seen = 0;
            registry.for_each(|_, acc| {
                acc.tick();
                seen += 1;
            });
            assert!(seen >= 50);
        }

        inserter.join().unwrap();
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn test_accumulators_follow_options() {
        let registry = EntityRegistry::new(RegistryOptions {
            window_size: 3,
            sync_mode: SyncMode::BestEffort,
            max_sources: None,
        });
        let acc = registry.resolve(source(9));

        assert_eq!(acc.window_size(), 3);
        assert_eq!(acc.sync_mode(), SyncMode::BestEffort);
    }

    #[test]
    fn test_view_is_read_only_snapshot() {
        let registry = Arc::new(EntityRegistry::default());
        let view = RegistryView::new(registry.clone());

        assert!(view.is_empty());
        assert_eq!(view.snapshot(source(1)), None);

        registry.resolve(source(2)).add(300);
        registry.resolve(source(1)).add(100);

        let snapshot = view.snapshot(source(1)).unwrap();
        assert_eq!(snapshot.values, vec![100]);

        // Snapshot is detached from the live accumulator
        registry.resolve(source(1)).add(500);
        assert_eq!(snapshot.values, vec![100]);

        let sorted = view.sorted_snapshots();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].0, source(1));
        assert_eq!(sorted[1].0, source(2));
        assert_eq!(view.window_size(), 7);
    }
}
