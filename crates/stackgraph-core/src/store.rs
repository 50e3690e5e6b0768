use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{Component, Components};

/// Thread-safe identity map for components, keyed by canonical path.
///
/// `ensure_component` is the single mutation primitive: concurrent phases
/// discovering the same path race through it and all end up holding the
/// same canonical instance. Snapshots come back in first-insert order.
pub struct ComponentStore {
    by_path: DashMap<PathBuf, Arc<Component>>,
    order: Mutex<Components>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self {
            by_path: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Seeds a store with an already-deduplicated component list.
    pub fn from_components(components: &Components) -> Self {
        let store = Self::new();
        for component in components {
            store.ensure_component(Arc::clone(component));
        }
        store
    }

    pub fn find_by_path(&self, path: &Path) -> Option<Arc<Component>> {
        self.by_path.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Atomically inserts `component` unless an entry already exists for
    /// its path. Returns the canonical instance and whether this call
    /// performed the insert.
    pub fn ensure_component(&self, component: Arc<Component>) -> (Arc<Component>, bool) {
        match self.by_path.entry(component.path().to_path_buf()) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&component));
                self.order.lock().push(Arc::clone(&component));
                (component, true)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Snapshot of every stored component, in first-insert order.
    pub fn to_components(&self) -> Components {
        self.order.lock().clone()
    }
}

impl Default for ComponentStore {
    fn default() -> Self {
        Self::new()
    }
}
