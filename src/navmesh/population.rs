use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bevy::prelude::*;
use rustc_hash::FxHashMap;

use super::error::NavmeshError;
use crate::navigation::WaypointSetData;

/// Cache of loaded navmesh resources keyed by resource path.
///
/// Chunks that reference the same resource share its `WaypointSetData`. The
/// cache only holds weak references; once every set of a resource has been
/// released the resource is evicted through a release hook. Reloading a
/// partially released resource keeps the sets that are still alive.
///
/// The lock is held for lookup and insertion only, never while parsing.
#[derive(Clone, Default)]
pub struct NavmeshPopulation {
    inner: Arc<Mutex<PopulationMap>>,
}

#[derive(Default)]
struct PopulationMap {
    entries: FxHashMap<String, PopulationEntry>,
    next_generation: u64,
}

struct PopulationEntry {
    generation: u64,
    sets: Vec<Weak<WaypointSetData>>,
}

fn lock(map: &Mutex<PopulationMap>) -> MutexGuard<'_, PopulationMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NavmeshPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live sets of a previously loaded resource.
    pub fn cached(&self, source: &str) -> Option<Vec<Arc<WaypointSetData>>> {
        let upgraded: Vec<Option<Arc<WaypointSetData>>> = {
            let map = lock(&self.inner);
            map.entries.get(source)?.sets.iter().map(Weak::upgrade).collect()
        };
        // Dropping partial upgrades may run release hooks, so the lock is
        // already released here.
        upgraded.into_iter().collect()
    }

    pub fn contains(&self, source: &str) -> bool {
        lock(&self.inner).entries.contains_key(source)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached sets for `source`, or run `load` and register them.
    ///
    /// Empty resources are returned as-is and never registered.
    pub fn load_with<F>(&self, source: &str, load: F) -> Result<Vec<Arc<WaypointSetData>>, NavmeshError>
    where
        F: FnOnce() -> Result<Vec<WaypointSetData>, NavmeshError>,
    {
        if let Some(sets) = self.cached(source) {
            debug!("[NAVMESH] Reusing {} cached sets for {}", sets.len(), source);
            return Ok(sets);
        }

        let mut loaded = load()?;
        if loaded.is_empty() {
            return Ok(Vec::new());
        }

        let mut kept: Vec<Option<Arc<WaypointSetData>>> = Vec::new();
        let mut reused_generation = None;
        let mut map = lock(&self.inner);
        if let Some(entry) = map.entries.get(source) {
            kept = entry.sets.iter().map(Weak::upgrade).collect();
            if kept.iter().all(Option::is_some) {
                drop(map);
                return Ok(kept.into_iter().flatten().collect());
            }
            if kept.len() == loaded.len() {
                reused_generation = Some(entry.generation);
            }
        }

        let generation = match reused_generation {
            Some(generation) => generation,
            None => {
                let generation = map.next_generation;
                map.next_generation += 1;
                generation
            }
        };

        let mut sets = Vec::with_capacity(loaded.len());
        for (i, mut data) in loaded.drain(..).enumerate() {
            let live = reused_generation.and_then(|_| kept.get(i).cloned().flatten());
            if let Some(live) = live {
                sets.push(live);
                continue;
            }
            let cache = Arc::downgrade(&self.inner);
            let key = source.to_string();
            data.set_release_hook(Box::new(move || evict(&cache, &key, generation)));
            sets.push(Arc::new(data));
        }
        map.entries.insert(
            source.to_string(),
            PopulationEntry { generation, sets: sets.iter().map(Arc::downgrade).collect() },
        );
        drop(map);
        drop(kept);

        info!("[NAVMESH] Registered {} sets for {}", sets.len(), source);
        Ok(sets)
    }
}

fn evict(cache: &Weak<Mutex<PopulationMap>>, source: &str, generation: u64) {
    let Some(cache) = cache.upgrade() else {
        return;
    };
    let mut map = lock(&cache);
    let released = map
        .entries
        .get(source)
        .is_some_and(|e| e.generation == generation && e.sets.iter().all(|w| w.strong_count() == 0));
    if released {
        map.entries.remove(source);
        debug!("[NAVMESH] Evicted {}", source);
    }
}
