use std::sync::Arc;

use stackgraph_core::{Component, DiscoveryError, Result};

use crate::filter::{Filters, GraphDirection, GraphSpec};
use crate::phase::{CandidateReason, DiscoveryResult, PhaseKind};

/// Static analysis of the filter query, performed once at the start of a
/// discovery run. Decides which phases must run and routes components to
/// definite results or candidates. Read-only after `analyze`.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    filters: Option<Filters>,
    has_positive: bool,
    has_parse_required: bool,
    has_graph: bool,
    has_dependent: bool,
}

impl Classifier {
    pub fn analyze(filters: Option<&Filters>) -> Result<Classifier> {
        let Some(filters) = filters else {
            return Ok(Classifier::default());
        };

        for expr in filters.exprs() {
            if let Some(GraphSpec {
                depth: Some(0), ..
            }) = expr.graph()
            {
                return Err(DiscoveryError::Filter(
                    "graph expression with depth 0 selects nothing".into(),
                ));
            }
        }

        let has_graph = filters.exprs().iter().any(|expr| expr.graph().is_some());
        let has_dependent = filters.exprs().iter().any(|expr| {
            matches!(
                expr.graph(),
                Some(GraphSpec {
                    direction: GraphDirection::Dependents,
                    ..
                })
            )
        });

        Ok(Classifier {
            has_positive: filters.has_positive_filter(),
            has_parse_required: filters.requires_parse(),
            has_graph,
            has_dependent,
            filters: Some(filters.clone()),
        })
    }

    pub fn has_parse_required_filters(&self) -> bool {
        self.has_parse_required
    }

    pub fn has_graph_filters(&self) -> bool {
        self.has_graph
    }

    pub fn has_dependent_filters(&self) -> bool {
        self.has_dependent
    }

    pub fn has_git_filters(&self) -> bool {
        self.filters
            .as_ref()
            .map(|filters| !filters.unique_git_filters().is_empty())
            .unwrap_or(false)
    }

    /// The traversal spec of the graph expression at `index`.
    pub fn graph_spec(&self, index: usize) -> Option<GraphSpec> {
        self.filters
            .as_ref()
            .and_then(|filters| filters.expr(index))
            .and_then(|expr| expr.graph())
    }

    /// Whether a parsed component now matches a parse-dependent
    /// expression; consulted by the parse phase to upgrade candidates.
    pub fn matches_parsed(&self, component: &Arc<Component>) -> bool {
        self.filters
            .as_ref()
            .map(|filters| filters.matches_parsed(component))
            .unwrap_or(false)
    }

    /// Routes a freshly created component.
    ///
    /// Graph seeds come first so a path that is both a plain match and a
    /// seed still gets its traversal; the graph phase re-emits the seed
    /// as discovered. Unmatched components stay around as candidates when
    /// a later phase could still include them.
    pub fn classify(&self, component: &Arc<Component>, phase: PhaseKind) -> DiscoveryResult {
        let Some(filters) = &self.filters else {
            return DiscoveryResult::discovered(Arc::clone(component), phase);
        };
        if filters.is_empty() {
            return DiscoveryResult::discovered(Arc::clone(component), phase);
        }

        if let Some(index) = filters.graph_seed_index(component) {
            return DiscoveryResult::candidate(
                Arc::clone(component),
                phase,
                CandidateReason::GraphTarget,
                Some(index),
            );
        }

        if filters.matches_static(component) {
            return DiscoveryResult::discovered(Arc::clone(component), phase);
        }

        if self.has_parse_required && !component.is_stack() {
            return DiscoveryResult::candidate(
                Arc::clone(component),
                phase,
                CandidateReason::RequiresParse,
                None,
            );
        }

        if self.has_dependent {
            return DiscoveryResult::candidate(
                Arc::clone(component),
                phase,
                CandidateReason::PotentialDependent,
                None,
            );
        }

        if !self.has_positive {
            // Exclusion-only queries include everything up front; the
            // final evaluation subtracts.
            return DiscoveryResult::discovered(Arc::clone(component), phase);
        }

        DiscoveryResult::excluded(Arc::clone(component), phase)
    }
}
