use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info};

use stackgraph_core::{Component, ComponentStore, DiscoveryError, DiscoveryOrigin};
use stackgraph_graph::config_dependency_paths;

use crate::discovery::DEFAULT_CONFIG_FILENAME;
use crate::phase::parse::ensure_parsed;
use crate::phase::{
    DiscoveryPhase, DiscoveryResult, PhaseContext, PhaseKind, PhaseOutput, PhaseSet,
};

/// Resolves dependency edges between an already-fixed component set and
/// to transient externals, producing a closed relationship graph for
/// execution ordering without a graph filter having run.
///
/// Transients live in their own store so concurrent walks converge on
/// one instance per path without touching the main identity map.
pub struct RelationshipPhase;

#[async_trait]
impl DiscoveryPhase for RelationshipPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Relationship
    }

    async fn run(&self, ctx: &PhaseContext, set: &PhaseSet) -> PhaseOutput {
        let components: Vec<Arc<Component>> = set
            .discovered
            .iter()
            .map(|result| Arc::clone(&result.component))
            .collect();
        if components.is_empty() {
            return PhaseOutput::empty();
        }

        info!(components = components.len(), "discovering relationships");

        let by_path: Arc<HashMap<PathBuf, Arc<Component>>> = Arc::new(
            components
                .iter()
                .map(|c| (c.path().to_path_buf(), Arc::clone(c)))
                .collect(),
        );
        let transients = Arc::new(ComponentStore::new());

        let error_batches: Vec<Vec<DiscoveryError>> = stream::iter(components.iter().cloned())
            .map(|component| {
                let by_path = Arc::clone(&by_path);
                let transients = Arc::clone(&transients);
                async move { link_component(ctx, component, &by_path, &transients).await }
            })
            .buffer_unordered(ctx.num_workers)
            .collect()
            .await;

        let results = transients
            .to_components()
            .into_iter()
            .map(|transient| DiscoveryResult::discovered(transient, PhaseKind::Relationship))
            .collect();

        PhaseOutput {
            results,
            errors: error_batches.into_iter().flatten().collect(),
        }
    }
}

/// Follows one component's dependencies level by level. Known paths
/// attach edges to the existing components and shrink the terminal set;
/// unknown paths materialize transients. The walk stops when depth runs
/// out, when every other component was reached, or when a level creates
/// no new work.
async fn link_component(
    ctx: &PhaseContext,
    component: Arc<Component>,
    by_path: &HashMap<PathBuf, Arc<Component>>,
    transients: &Arc<ComponentStore>,
) -> Vec<DiscoveryError> {
    let terminal: Mutex<HashSet<PathBuf>> = Mutex::new(
        by_path
            .keys()
            .filter(|path| path.as_path() != component.path())
            .cloned()
            .collect(),
    );

    let root_path = component.path().to_path_buf();
    let mut errors = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    visited.insert(root_path.clone());
    let mut level: Vec<Arc<Component>> = vec![component];

    let mut depth = 0;
    loop {
        if level.is_empty() {
            break;
        }
        // The component's own dependencies are always expanded; deeper
        // levels only run while unlinked components remain.
        if depth > 0 && terminal.lock().is_empty() {
            break;
        }
        if depth >= ctx.max_dependency_depth {
            errors.push(DiscoveryError::MaxDepthReached(root_path.clone()));
            break;
        }
        if ctx.cancel.is_cancelled() {
            errors.push(DiscoveryError::Canceled);
            break;
        }

        // One errgroup per level; errors join before the next level runs.
        let batches: Vec<(Vec<Arc<Component>>, Vec<DiscoveryError>)> =
            stream::iter(level.drain(..))
                .map(|node| {
                    let terminal = &terminal;
                    async move {
                        let mut errors = Vec::new();
                        ensure_parsed(ctx, &node, &mut errors).await;
                        let (paths, extract_errors) = config_dependency_paths(&node);
                        errors.extend(extract_errors);

                        let mut created = Vec::new();
                        for dep_path in paths {
                            if let Some(existing) = by_path.get(&dep_path) {
                                node.add_dependency(existing);
                                terminal.lock().remove(&dep_path);
                            } else {
                                let transient = Arc::new(Component::unit(
                                    dep_path.clone(),
                                    DEFAULT_CONFIG_FILENAME,
                                    ctx.discovery_context
                                        .with_origin(DiscoveryOrigin::Relationship),
                                ));
                                let (stored, newly_created) =
                                    transients.ensure_component(transient);
                                node.add_dependency(&stored);
                                if newly_created {
                                    debug!(
                                        component = %stored.path().display(),
                                        "materialized transient dependency"
                                    );
                                }
                                created.push(stored);
                            }
                        }
                        (created, errors)
                    }
                })
                .buffer_unordered(ctx.num_workers)
                .collect()
                .await;

        let mut next = Vec::new();
        for (created, batch_errors) in batches {
            errors.extend(batch_errors);
            for dep in created {
                if visited.insert(dep.path().to_path_buf()) {
                    next.push(dep);
                }
            }
        }
        level = next;
        depth += 1;
    }

    errors
}
