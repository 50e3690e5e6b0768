use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use stackgraph_core::{Component, Components, DiscoveryError, DiscoveryOrigin};
use stackgraph_graph::{config_dependency_paths, DependentsIndex};

use crate::discovery::DEFAULT_CONFIG_FILENAME;
use crate::filter::{GraphDirection, GraphSpec};
use crate::phase::parse::ensure_parsed;
use crate::phase::{
    CandidateReason, DiscoveryPhase, DiscoveryResult, PhaseContext, PhaseKind, PhaseOutput,
    PhaseSet,
};

/// Expands graph filter seeds along dependency or dependent edges up to
/// the requested depth, materializing referenced components through the
/// component store as it goes.
pub struct GraphPhase;

#[async_trait]
impl DiscoveryPhase for GraphPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Graph
    }

    async fn run(&self, ctx: &PhaseContext, set: &PhaseSet) -> PhaseOutput {
        let seeds: Vec<(Arc<Component>, usize)> = set
            .candidates
            .iter()
            .filter(|result| result.reason == Some(CandidateReason::GraphTarget))
            .map(|result| {
                (
                    Arc::clone(&result.component),
                    result.graph_expression_index.unwrap_or(0),
                )
            })
            .collect();
        if seeds.is_empty() {
            return PhaseOutput::empty();
        }

        info!(seeds = seeds.len(), "expanding graph filter seeds");

        // Backward traversal runs over a reverse index of the edges
        // `build_dependency_graph` populated beforehand.
        let dependents = if ctx.classifier.has_dependent_filters() {
            DependentsIndex::build(&ctx.store.to_components())
        } else {
            DependentsIndex::default()
        };
        let dependents = Arc::new(dependents);

        let outputs: Vec<PhaseOutput> = stream::iter(seeds)
            .map(|(seed, index)| {
                let dependents = Arc::clone(&dependents);
                async move {
                    let spec = ctx.classifier.graph_spec(index).unwrap_or(GraphSpec {
                        direction: GraphDirection::Dependencies,
                        depth: None,
                    });
                    let depth_limit = spec
                        .depth
                        .unwrap_or(ctx.max_dependency_depth)
                        .min(ctx.max_dependency_depth);
                    match spec.direction {
                        GraphDirection::Dependencies => {
                            traverse_dependencies(ctx, seed, depth_limit).await
                        }
                        GraphDirection::Dependents => {
                            traverse_dependents(ctx, seed, depth_limit, &dependents)
                        }
                    }
                }
            })
            .buffer_unordered(ctx.num_workers)
            .collect()
            .await;

        let mut output = PhaseOutput::empty();
        for sub in outputs {
            output.merge(sub);
        }
        output
    }
}

/// Follows forward edges from the seed, lazily parsing along the way.
/// Referenced paths resolve through the store: a known path reuses the
/// canonical instance, an unknown one materializes a new external-aware
/// unit with graph origin.
async fn traverse_dependencies(
    ctx: &PhaseContext,
    seed: Arc<Component>,
    depth_limit: usize,
) -> PhaseOutput {
    let mut output = PhaseOutput::empty();
    output
        .results
        .push(DiscoveryResult::discovered(Arc::clone(&seed), PhaseKind::Graph));

    let mut visited: HashSet<PathBuf> = HashSet::new();
    visited.insert(seed.path().to_path_buf());
    let mut frontier: Vec<(Arc<Component>, usize)> = vec![(seed, 0)];

    while let Some((component, depth)) = frontier.pop() {
        if ctx.cancel.is_cancelled() {
            output.errors.push(DiscoveryError::Canceled);
            break;
        }
        if component.is_stack() {
            continue;
        }

        ensure_parsed(ctx, &component, &mut output.errors).await;
        let (paths, extract_errors) = config_dependency_paths(&component);
        output.errors.extend(extract_errors);
        if paths.is_empty() {
            continue;
        }
        if depth >= depth_limit {
            // An expression-requested depth truncates silently; running
            // into the driver's safety bound is an error for this branch.
            if depth_limit >= ctx.max_dependency_depth {
                output
                    .errors
                    .push(DiscoveryError::MaxDepthReached(component.path().to_path_buf()));
            }
            continue;
        }

        for dep_path in paths {
            let dep = materialize(ctx, &dep_path);
            component.add_dependency(&dep);
            if visited.insert(dep.path().to_path_buf()) {
                output
                    .results
                    .push(DiscoveryResult::discovered(Arc::clone(&dep), PhaseKind::Graph));
                frontier.push((dep, depth + 1));
            }
        }
    }

    output
}

/// Follows reverse edges from the seed over the pre-built dependents
/// index. Components whose paths escape the git root are not followed.
fn traverse_dependents(
    ctx: &PhaseContext,
    seed: Arc<Component>,
    depth_limit: usize,
    dependents: &DependentsIndex,
) -> PhaseOutput {
    let mut output = PhaseOutput::empty();
    output
        .results
        .push(DiscoveryResult::discovered(Arc::clone(&seed), PhaseKind::Graph));

    let mut visited: HashSet<PathBuf> = HashSet::new();
    visited.insert(seed.path().to_path_buf());
    let mut frontier: Vec<(PathBuf, usize)> = vec![(seed.path().to_path_buf(), 0)];

    while let Some((path, depth)) = frontier.pop() {
        if depth >= depth_limit {
            continue;
        }
        for dependent_path in dependents.dependents_of(&path) {
            if let Some(root) = &ctx.git_root {
                if !dependent_path.starts_with(root) {
                    debug!(
                        dependent = %dependent_path.display(),
                        git_root = %root.display(),
                        "dependent outside git root, not following"
                    );
                    continue;
                }
            }
            if !visited.insert(dependent_path.clone()) {
                continue;
            }
            if let Some(component) = ctx.store.find_by_path(dependent_path) {
                output
                    .results
                    .push(DiscoveryResult::discovered(component, PhaseKind::Graph));
            }
            frontier.push((dependent_path.clone(), depth + 1));
        }
    }

    output
}

/// Looks the referenced path up in the store, creating a graph-origin
/// unit if nothing is there yet. `ensure_component` keeps the identity
/// invariant under concurrent traversals.
fn materialize(ctx: &PhaseContext, dep_path: &Path) -> Arc<Component> {
    if let Some(existing) = ctx.store.find_by_path(dep_path) {
        return existing;
    }
    let created = Arc::new(Component::unit(
        dep_path.to_path_buf(),
        DEFAULT_CONFIG_FILENAME,
        ctx.discovery_context.with_origin(DiscoveryOrigin::Graph),
    ));
    let (stored, newly_created) = ctx.store.ensure_component(created);
    if newly_created {
        debug!(component = %stored.path().display(), "materialized graph dependency");
    }
    stored
}

/// Parses every component in parallel and populates forward edges, so a
/// reverse index over the set is complete. Run before backward traversal.
pub(crate) async fn build_dependency_graph(
    ctx: &PhaseContext,
    components: &Components,
) -> Vec<DiscoveryError> {
    info!(components = components.len(), "building dependency graph");

    let parse_errors: Vec<Vec<DiscoveryError>> = stream::iter(components.iter().cloned())
        .map(|component| async move {
            let mut errors = Vec::new();
            if ctx.cancel.is_cancelled() {
                errors.push(DiscoveryError::Canceled);
                return errors;
            }
            if !component.is_stack() {
                ensure_parsed(ctx, &component, &mut errors).await;
            }
            errors
        })
        .buffer_unordered(ctx.num_workers)
        .collect()
        .await;
    let mut errors: Vec<DiscoveryError> = parse_errors.into_iter().flatten().collect();

    for component in components {
        if component.is_stack() {
            continue;
        }
        let (paths, extract_errors) = config_dependency_paths(component);
        errors.extend(extract_errors);
        for dep_path in paths {
            let dep = materialize(ctx, &dep_path);
            component.add_dependency(&dep);
        }
    }

    errors
}
