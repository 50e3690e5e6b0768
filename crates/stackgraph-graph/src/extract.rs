use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use stackgraph_core::{Component, DiscoveryError};

use crate::paths::join_clean;

/// Extracts the dependency directory paths referenced by a component's
/// parsed configuration.
///
/// Dependency blocks with `enabled = false` are skipped; a block whose
/// `config_path` did not evaluate to a string yields a
/// `DependencyPathError` while the remaining entries survive. Relative
/// paths are joined with the component directory and cleaned, and the
/// result is de-duplicated in declaration order.
pub fn config_dependency_paths(
    component: &Arc<Component>,
) -> (Vec<PathBuf>, Vec<DiscoveryError>) {
    let mut paths = Vec::new();
    let mut errors = Vec::new();

    let Some(config) = component.config() else {
        return (paths, errors);
    };

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut push = |raw: &str, paths: &mut Vec<PathBuf>| {
        let resolved = join_clean(component.path(), raw.as_ref());
        if seen.insert(resolved.clone()) {
            paths.push(resolved);
        }
    };

    for block in &config.dependency_blocks {
        if !block.is_enabled() {
            debug!(
                component = %component.path().display(),
                dependency = %block.name,
                "skipping disabled dependency block"
            );
            continue;
        }
        match &block.config_path {
            Value::String(raw) => push(raw, &mut paths),
            _ => errors.push(DiscoveryError::DependencyPath {
                path: component.path().to_path_buf(),
                name: block.name.clone(),
            }),
        }
    }

    if let Some(dependencies) = &config.dependencies {
        for raw in &dependencies.paths {
            push(raw, &mut paths);
        }
    }

    (paths, errors)
}
