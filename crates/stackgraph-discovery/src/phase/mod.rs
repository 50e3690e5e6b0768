use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use stackgraph_core::{
    Component, ComponentStore, ConfigParser, DiscoveryContext, DiscoveryError, ParserOptions,
    ReportSink, WorktreeProvider,
};

use crate::classifier::Classifier;
use crate::filter::Filters;
use crate::walk::HiddenDirMemo;

pub mod filesystem;
pub mod graph;
pub mod parse;
pub mod relationship;
pub mod worktree;

pub use filesystem::FilesystemPhase;
pub use graph::GraphPhase;
pub use parse::ParsePhase;
pub use relationship::RelationshipPhase;
pub use worktree::WorktreePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Filesystem,
    Worktree,
    Parse,
    Graph,
    Relationship,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Filesystem => "filesystem",
            PhaseKind::Worktree => "worktree",
            PhaseKind::Parse => "parse",
            PhaseKind::Graph => "graph",
            PhaseKind::Relationship => "relationship",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStatus {
    /// Definitely part of the result set.
    Discovered,
    /// Pending further evaluation by a later phase.
    Candidate,
    /// Definitely not part of the result set.
    Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateReason {
    /// Seed of a graph filter expression; the graph phase expands it.
    GraphTarget,
    /// A parse-dependent filter may match once the unit is parsed.
    RequiresParse,
    /// Dependent filters exist; this component may sit on a reverse path.
    PotentialDependent,
}

/// Per-component classification emitted by phases.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub component: Arc<Component>,
    pub status: DiscoveryStatus,
    pub reason: Option<CandidateReason>,
    pub phase: PhaseKind,
    pub graph_expression_index: Option<usize>,
}

impl DiscoveryResult {
    pub fn discovered(component: Arc<Component>, phase: PhaseKind) -> Self {
        Self {
            component,
            status: DiscoveryStatus::Discovered,
            reason: None,
            phase,
            graph_expression_index: None,
        }
    }

    pub fn candidate(
        component: Arc<Component>,
        phase: PhaseKind,
        reason: CandidateReason,
        graph_expression_index: Option<usize>,
    ) -> Self {
        Self {
            component,
            status: DiscoveryStatus::Candidate,
            reason: Some(reason),
            phase,
            graph_expression_index,
        }
    }

    pub fn excluded(component: Arc<Component>, phase: PhaseKind) -> Self {
        Self {
            component,
            status: DiscoveryStatus::Excluded,
            reason: None,
            phase,
            graph_expression_index: None,
        }
    }
}

/// Shared state every phase sees. Built once per `discover` call; only
/// the driver mutates it between phases (`git_root`).
pub struct PhaseContext {
    pub working_dir: PathBuf,
    pub config_filenames: Vec<String>,
    pub discovery_context: DiscoveryContext,
    pub num_workers: usize,
    pub max_dependency_depth: usize,
    pub no_hidden: bool,
    pub requires_parse: bool,
    pub suppress_parse_errors: bool,
    pub parser_options: ParserOptions,
    pub parser: Option<Arc<dyn ConfigParser>>,
    pub worktrees: Option<Arc<dyn WorktreeProvider>>,
    pub report: Option<Arc<dyn ReportSink>>,
    pub filters: Option<Filters>,
    pub classifier: Classifier,
    pub git_root: Option<PathBuf>,
    pub store: Arc<ComponentStore>,
    pub hidden_memo: Arc<HiddenDirMemo>,
    pub cancel: CancellationToken,
}

/// The evolving pipeline state a phase receives: definite results so far
/// and candidates pending evaluation.
#[derive(Debug, Default)]
pub struct PhaseSet {
    pub discovered: Vec<DiscoveryResult>,
    pub candidates: Vec<DiscoveryResult>,
}

impl PhaseSet {
    /// Union of discovered and candidate components, first-seen order.
    pub fn all_components(&self) -> Vec<Arc<Component>> {
        self.discovered
            .iter()
            .chain(self.candidates.iter())
            .map(|result| Arc::clone(&result.component))
            .collect()
    }
}

/// What a phase hands back: newly discovered components, new candidates,
/// and the errors it collected along the way.
#[derive(Debug, Default)]
pub struct PhaseOutput {
    pub results: Vec<DiscoveryResult>,
    pub errors: Vec<DiscoveryError>,
}

impl PhaseOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: PhaseOutput) {
        self.results.extend(other.results);
        self.errors.extend(other.errors);
    }
}

/// Uniform contract for every discovery stage.
#[async_trait]
pub trait DiscoveryPhase: Send + Sync {
    fn kind(&self) -> PhaseKind;

    async fn run(&self, ctx: &PhaseContext, set: &PhaseSet) -> PhaseOutput;
}
