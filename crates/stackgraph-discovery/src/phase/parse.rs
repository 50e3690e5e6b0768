use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use stackgraph_core::{Component, DiscoveryError, UnitConfig};

use crate::phase::{
    CandidateReason, DiscoveryPhase, DiscoveryResult, PhaseContext, PhaseKind, PhaseOutput,
    PhaseSet,
};

/// Parses the configuration of every component a parse-requiring filter
/// needs, plus everything when a forced parse was requested. Stacks are
/// short-circuited; they are never parsed.
pub struct ParsePhase;

#[async_trait]
impl DiscoveryPhase for ParsePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Parse
    }

    async fn run(&self, ctx: &PhaseContext, set: &PhaseSet) -> PhaseOutput {
        let mut seen = std::collections::HashSet::new();
        let mut targets: Vec<Arc<Component>> = Vec::new();
        let mut deferred: Vec<&DiscoveryResult> = Vec::new();

        for result in &set.candidates {
            if result.reason == Some(CandidateReason::RequiresParse) {
                if seen.insert(result.component.path().to_path_buf()) {
                    targets.push(Arc::clone(&result.component));
                }
                deferred.push(result);
            }
        }
        if ctx.requires_parse {
            for result in set.discovered.iter().chain(&set.candidates) {
                if result.component.needs_parse()
                    && seen.insert(result.component.path().to_path_buf())
                {
                    targets.push(Arc::clone(&result.component));
                }
            }
        }
        if targets.is_empty() {
            return PhaseOutput::empty();
        }

        info!(components = targets.len(), "parsing configurations");

        let semaphore = Arc::new(Semaphore::new(ctx.num_workers));
        let errors: Vec<DiscoveryError> = stream::iter(targets)
            .map(|component| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return vec![DiscoveryError::Canceled];
                    };
                    if ctx.cancel.is_cancelled() {
                        return vec![DiscoveryError::Canceled];
                    }
                    let mut errors = Vec::new();
                    ensure_parsed(ctx, &component, &mut errors).await;
                    errors
                }
            })
            .buffer_unordered(ctx.num_workers)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        // Re-route the candidates that were deferred on parsing: either a
        // parse-dependent expression matches now, or they stay around for
        // dependent traversal, or they are out.
        let mut results = Vec::new();
        for result in deferred {
            let component = &result.component;
            let routed = if ctx.classifier.matches_parsed(component) {
                DiscoveryResult::discovered(Arc::clone(component), PhaseKind::Parse)
            } else if ctx.classifier.has_dependent_filters() {
                DiscoveryResult::candidate(
                    Arc::clone(component),
                    PhaseKind::Parse,
                    CandidateReason::PotentialDependent,
                    None,
                )
            } else {
                DiscoveryResult::excluded(Arc::clone(component), PhaseKind::Parse)
            };
            results.push(routed);
        }

        PhaseOutput { results, errors }
    }
}

/// Lazily parses a component through the external parser, honoring the
/// lazy-parse state machine and the suppression policy. Include-only
/// configurations are treated as "nothing to add" and never fail.
pub(crate) async fn ensure_parsed(
    ctx: &PhaseContext,
    component: &Arc<Component>,
    errors: &mut Vec<DiscoveryError>,
) {
    if !component.needs_parse() {
        return;
    }
    let Some(parser) = &ctx.parser else {
        debug!(
            component = %component.path().display(),
            "no parser configured; leaving component unparsed"
        );
        return;
    };

    match parser.parse(component.path(), &ctx.parser_options).await {
        Ok(parsed) => {
            component.set_config(parsed.config, parsed.files_read);
        }
        Err(DiscoveryError::IncludeOnlyConfig(path)) => {
            debug!(config = %path.display(), "include-only configuration, nothing to add");
            component.set_config(UnitConfig::default(), Vec::new());
        }
        Err(err) if ctx.suppress_parse_errors => {
            debug!(
                component = %component.path().display(),
                error = %err,
                "suppressed parse error"
            );
            component.mark_parse_failed();
        }
        Err(err) => {
            component.mark_parse_failed();
            errors.push(err);
        }
    }
}
