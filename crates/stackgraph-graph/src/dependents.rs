use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stackgraph_core::Components;

/// Reverse-edge index: maps a component path to the paths of components
/// that depend on it. Built per run instead of storing reverse edges on
/// the components themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependentsIndex {
    index: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependentsIndex {
    /// Direct dependents only, keyed by the components' own paths.
    pub fn build(components: &Components) -> Self {
        Self::build_with_key(components, |path| path.to_path_buf())
    }

    /// Direct dependents with a caller-chosen path normalization, so
    /// symlink-resolved comparisons can share the same machinery.
    pub fn build_with_key<F>(components: &Components, key: F) -> Self
    where
        F: Fn(&Path) -> PathBuf,
    {
        let mut index: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();
        for component in components {
            let from = key(component.path());
            for dep in component.dependencies() {
                let to = key(dep.path());
                let entry = index.entry(to).or_default();
                if !entry.contains(&from) {
                    entry.push(from.clone());
                }
            }
        }
        Self { index }
    }

    /// Propagates the direct index to its transitive fixed point.
    /// Iterations are bounded by the node count, which guarantees
    /// termination even on cyclic input.
    pub fn propagated(mut self) -> Self {
        let bound = self.index.len();
        let keys: Vec<PathBuf> = self.index.keys().cloned().collect();

        for _ in 0..bound {
            let mut changed = false;
            for node in &keys {
                let current = match self.index.get(node) {
                    Some(entries) => entries.clone(),
                    None => continue,
                };
                let mut merged = current.clone();
                for dependent in &current {
                    if let Some(transitive) = self.index.get(dependent) {
                        for path in transitive {
                            if path != node && !merged.contains(path) {
                                merged.push(path.clone());
                            }
                        }
                    }
                }
                if merged.len() != current.len() {
                    changed = true;
                    self.index.insert(node.clone(), merged);
                }
            }
            if !changed {
                break;
            }
        }

        self
    }

    pub fn dependents_of(&self, path: &Path) -> &[PathBuf] {
        self.index
            .get(path)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
