use std::ops::DerefMut;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use dashmap::{DashMap, DashSet};
use log::{debug, warn};
use thiserror::Error;

use cellstream_files::ParserError;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset {0:08X} could not be found")]
    NotFound(u32),

    #[error("Asset {id:08X} is malformed")]
    Malformed {
        id: u32,
        #[source]
        source: ParserError,
    },

    /// Short-circuit for IDs that failed before, the original error has been logged back then.
    #[error("Asset {0:08X} is known to be bad")]
    KnownBad(u32),
}

/// Read-through cache for assets that are shared between many cells (e.g. environments).
///
/// Resolutions of distinct IDs run in parallel, concurrent resolutions of the same ID generate it
/// once: the generator runs while holding the write lock of that ID's slot. IDs whose generation
/// failed are remembered and fail fast with [`AssetError::KnownBad`] afterward.
pub struct Resolver<G: GraphNodeGenerator<T>, T> {
    ref_cache: DashMap<u32, RwLock<Option<Arc<T>>>>,
    failures: DashSet<u32>,
    generator: G,
}

pub trait GraphNodeGenerator<T> {
    fn generate(&self, id: u32) -> Result<Arc<T>, AssetError>;
}

impl<G: GraphNodeGenerator<T>, T> Resolver<G, T> {
    pub fn new(generator: G) -> Self {
        Self {
            ref_cache: DashMap::with_capacity(100),
            failures: DashSet::new(),
            generator,
        }
    }

    pub fn resolve(&self, id: u32) -> Result<Arc<T>, AssetError> {
        if self.failures.contains(&id) {
            return Err(AssetError::KnownBad(id));
        }

        // Easy path: The cache contains the node already
        if let Some(slot_lock) = self.ref_cache.get(&id) {
            {
                let slot = slot_lock.read().expect("Slot Read Lock");
                if let Some(arc) = slot.as_ref() {
                    return Ok(arc.clone());
                }
            }
            {
                let mut slot = slot_lock.write().expect("Slot Write Lock");
                return self.generate(id, &mut slot);
            }
        }

        // Heavier path: Insert an empty slot first and downgrade, so the map shard is only locked
        // exclusively for the insert and not for the duration of the generator.
        let slot_lock = self
            .ref_cache
            .entry(id)
            .or_insert_with(|| RwLock::new(None))
            .downgrade();
        let mut slot = slot_lock.write().expect("Slot Write Lock");
        self.generate(id, &mut slot)
    }

    fn generate(&self, id: u32, slot: &mut RwLockWriteGuard<Option<Arc<T>>>) -> Result<Arc<T>, AssetError> {
        if let Some(arc) = slot.as_ref() {
            return Ok(arc.clone()); // maybe we have been raced
        }

        if self.failures.contains(&id) {
            return Err(AssetError::KnownBad(id));
        }

        match self.generator.generate(id) {
            Ok(arc) => {
                *slot.deref_mut() = Some(arc.clone());
                Ok(arc)
            }
            Err(err) => {
                warn!("Failed to resolve {:08X}: {}", id, err);
                self.failures.insert(id);
                Err(err)
            }
        }
    }

    pub fn is_known_bad(&self, id: u32) -> bool {
        self.failures.contains(&id)
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of successfully resolved nodes.
    pub fn len(&self) -> usize {
        self.ref_cache
            .iter()
            .filter(|entry| entry.value().read().expect("Slot Read Lock").is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all cached nodes and forgets the failures, e.g. after the asset source changed.
    pub fn clear(&self) {
        debug!(
            "Clearing {} cached nodes and {} failures",
            self.ref_cache.len(),
            self.failures.len()
        );
        self.ref_cache.clear();
        self.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    impl GraphNodeGenerator<String> for CountingGenerator {
        fn generate(&self, id: u32) -> Result<Arc<String>, AssetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id == 0xDEAD {
                return Err(AssetError::NotFound(id));
            }
            Ok(Arc::new(format!("{:08X}", id)))
        }
    }

    fn resolver() -> Resolver<CountingGenerator, String> {
        Resolver::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn resolves_once() {
        let resolver = resolver();
        let first = resolver.resolve(7).unwrap();
        let second = resolver.resolve(7).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn failures_short_circuit() {
        let resolver = resolver();
        assert!(matches!(resolver.resolve(0xDEAD), Err(AssetError::NotFound(0xDEAD))));
        assert!(matches!(resolver.resolve(0xDEAD), Err(AssetError::KnownBad(0xDEAD))));
        assert!(resolver.is_known_bad(0xDEAD));
        assert_eq!(resolver.generator.calls.load(Ordering::SeqCst), 1);
        assert!(resolver.is_empty());

        resolver.clear();
        assert!(matches!(resolver.resolve(0xDEAD), Err(AssetError::NotFound(0xDEAD))));
    }

    #[test]
    fn concurrent_resolution_generates_once() {
        let resolver = Arc::new(resolver());
        let handles = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    for id in 0..32 {
                        resolver.resolve(id).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(resolver.generator.calls.load(Ordering::SeqCst), 32);
        assert_eq!(resolver.len(), 32);
    }

    #[test]
    fn clearing_while_resolving() {
        let resolver = Arc::new(resolver());
        let clearer = {
            let resolver = resolver.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    resolver.clear();
                    std::thread::yield_now();
                }
            })
        };

        let resolvers = (0..4)
            .map(|_| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    for round in 0..200u32 {
                        let id = round % 16;
                        assert_eq!(*resolver.resolve(id).unwrap(), format!("{:08X}", id));
                    }
                })
            })
            .collect::<Vec<_>>();

        clearer.join().unwrap();
        for handle in resolvers {
            handle.join().unwrap();
        }
    }
}
