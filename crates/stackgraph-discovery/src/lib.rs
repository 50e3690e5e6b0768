pub mod classifier;
pub mod discovery;
pub mod filter;
pub mod git;
pub mod parser;
pub mod phase;
pub mod queue;
pub mod walk;

pub use classifier::Classifier;
pub use discovery::{
    Discovery, DEFAULT_CONFIG_FILENAME, DEFAULT_DISCOVERY_WORKERS, DEFAULT_MAX_DEPENDENCY_DEPTH,
    MAX_DISCOVERY_WORKERS, STACK_CONFIG_FILENAME,
};
pub use filter::{Filters, FiltersBuilder, GraphDirection, GraphSpec};
pub use git::{LibGitResolver, LibGitWorktrees};
pub use parser::{FailingParser, StaticParser};
pub use phase::{
    CandidateReason, DiscoveryPhase, DiscoveryResult, DiscoveryStatus, PhaseContext, PhaseKind,
    PhaseOutput, PhaseSet,
};
pub use queue::apply_queue_filters;
pub use walk::HiddenDirMemo;
