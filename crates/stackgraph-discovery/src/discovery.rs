use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stackgraph_core::{
    ComponentStore, Components, ConfigParser, DiscoveryContext, DiscoveryError, GitResolver,
    ParserOptions, ReportSink, Result, WorktreeProvider,
};
use stackgraph_graph::{canonicalize_permissive, check_cycles, prune_to_target, remove_cycles};

use crate::classifier::Classifier;
use crate::filter::Filters;
use crate::git::LibGitResolver;
use crate::phase::graph::build_dependency_graph;
use crate::phase::{
    DiscoveryPhase, DiscoveryStatus, FilesystemPhase, GraphPhase, ParsePhase, PhaseContext,
    PhaseOutput, PhaseSet, RelationshipPhase, WorktreePhase,
};
use crate::queue::apply_queue_filters;
use crate::walk::HiddenDirMemo;

pub const DEFAULT_CONFIG_FILENAME: &str = "terragrunt.hcl";
pub const STACK_CONFIG_FILENAME: &str = "terragrunt.stack.hcl";

pub const DEFAULT_MAX_DEPENDENCY_DEPTH: usize = 1000;
pub const DEFAULT_DISCOVERY_WORKERS: usize = 4;
/// Values above this are silently clamped.
pub const MAX_DISCOVERY_WORKERS: usize = 2 * DEFAULT_DISCOVERY_WORKERS;

/// The discovery driver: owns the phase pipeline and exposes the single
/// `discover` operation. Options are independent builder-style mutators.
pub struct Discovery {
    working_dir: PathBuf,
    config_filenames: Vec<String>,
    filters: Option<Filters>,
    parser: Option<Arc<dyn ConfigParser>>,
    parser_options: ParserOptions,
    worktrees: Option<Arc<dyn WorktreeProvider>>,
    git: Option<Arc<dyn GitResolver>>,
    report: Option<Arc<dyn ReportSink>>,
    max_dependency_depth: usize,
    num_workers: usize,
    no_hidden: bool,
    requires_parse: bool,
    parse_exclude: bool,
    read_files: bool,
    suppress_parse_errors: bool,
    break_cycles: bool,
    discover_relationships: bool,
    git_root: Option<PathBuf>,
    graph_target: Option<PathBuf>,
    discovery_context: Option<DiscoveryContext>,
    command: String,
}

impl Discovery {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            config_filenames: Vec::new(),
            filters: None,
            parser: None,
            parser_options: ParserOptions::default(),
            worktrees: None,
            git: Some(Arc::new(LibGitResolver)),
            report: None,
            max_dependency_depth: DEFAULT_MAX_DEPENDENCY_DEPTH,
            num_workers: DEFAULT_DISCOVERY_WORKERS,
            no_hidden: false,
            requires_parse: false,
            parse_exclude: false,
            read_files: false,
            suppress_parse_errors: false,
            break_cycles: false,
            discover_relationships: false,
            git_root: None,
            graph_target: None,
            discovery_context: None,
            command: String::new(),
        }
    }

    pub fn with_config_filenames<I, S>(mut self, filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_filenames = filenames.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ConfigParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser_options = options;
        self
    }

    pub fn with_worktrees(mut self, worktrees: Arc<dyn WorktreeProvider>) -> Self {
        self.worktrees = Some(worktrees);
        self
    }

    pub fn with_git_resolver(mut self, git: Arc<dyn GitResolver>) -> Self {
        self.git = Some(git);
        self
    }

    pub fn with_report(mut self, report: Arc<dyn ReportSink>) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_max_dependency_depth(mut self, depth: usize) -> Self {
        self.max_dependency_depth = depth;
        self
    }

    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers.clamp(1, MAX_DISCOVERY_WORKERS);
        self
    }

    pub fn with_no_hidden(mut self, no_hidden: bool) -> Self {
        self.no_hidden = no_hidden;
        self
    }

    /// Forces the parse phase regardless of what the classifier decides.
    pub fn with_requires_parse(mut self, requires_parse: bool) -> Self {
        self.requires_parse = requires_parse;
        self
    }

    /// Parse exclude blocks; implies a forced parse.
    pub fn with_parse_exclude(mut self, parse_exclude: bool) -> Self {
        self.parse_exclude = parse_exclude;
        self
    }

    /// Track files read during parsing; implies a forced parse.
    pub fn with_read_files(mut self, read_files: bool) -> Self {
        self.read_files = read_files;
        self
    }

    pub fn with_suppress_parse_errors(mut self, suppress: bool) -> Self {
        self.suppress_parse_errors = suppress;
        self
    }

    pub fn with_break_cycles(mut self, break_cycles: bool) -> Self {
        self.break_cycles = break_cycles;
        self
    }

    pub fn with_discover_relationships(mut self, discover: bool) -> Self {
        self.discover_relationships = discover;
        self
    }

    /// Boundary for backward (dependent) traversal. When unset and
    /// dependent filters exist, the git resolver is consulted.
    pub fn with_git_root(mut self, git_root: impl Into<PathBuf>) -> Self {
        self.git_root = Some(git_root.into());
        self
    }

    /// Prune the final set to this target plus its transitive dependents.
    pub fn with_graph_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.graph_target = Some(target.into());
        self
    }

    pub fn with_discovery_context(mut self, context: DiscoveryContext) -> Self {
        self.discovery_context = Some(context);
        self
    }

    /// The operation the runner is about to execute; drives the
    /// exclude-block queue filters. Empty skips queue filtering.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Runs the discovery pipeline:
    /// filesystem ∥ worktree, then parse, graph and relationship as the
    /// classifier demands, then the final filter evaluation, cycle
    /// handling, graph-target pruning and queue filters.
    pub async fn discover(&self, cancel: CancellationToken) -> Result<Components> {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Canceled);
        }

        let config_filenames = if self.config_filenames.is_empty() {
            vec![
                DEFAULT_CONFIG_FILENAME.to_string(),
                STACK_CONFIG_FILENAME.to_string(),
            ]
        } else {
            self.config_filenames.clone()
        };
        // Component identity is the canonical path; resolving the root up
        // front keeps every path the walk produces comparable.
        let working_dir = canonicalize_permissive(&self.working_dir);
        let discovery_context = self
            .discovery_context
            .clone()
            .unwrap_or_else(|| DiscoveryContext::new(&working_dir));

        let classifier = Classifier::analyze(self.filters.as_ref())?;
        let requires_parse = self.requires_parse
            || self.parse_exclude
            || self.read_files
            || classifier.has_parse_required_filters();

        let mut ctx = PhaseContext {
            working_dir: working_dir.clone(),
            config_filenames,
            discovery_context,
            num_workers: self.num_workers,
            max_dependency_depth: self.max_dependency_depth,
            no_hidden: self.no_hidden,
            requires_parse,
            suppress_parse_errors: self.suppress_parse_errors,
            parser_options: self.parser_options.clone(),
            parser: self.parser.clone(),
            worktrees: self.worktrees.clone(),
            report: self.report.clone(),
            filters: self.filters.clone(),
            classifier: classifier.clone(),
            git_root: self.git_root.clone(),
            store: Arc::new(ComponentStore::new()),
            hidden_memo: Arc::new(HiddenDirMemo::new()),
            cancel,
        };

        let mut errors: Vec<DiscoveryError> = Vec::new();
        let mut results = ResultSet::default();

        // Filesystem and worktree walk concurrently; nothing else runs
        // until both finish.
        let filesystem = FilesystemPhase;
        let worktree = WorktreePhase;
        let (fs_output, wt_output) = tokio::join!(
            filesystem.run(&ctx, &results.set),
            worktree.run(&ctx, &results.set)
        );
        results.absorb(fs_output, &mut errors);
        results.absorb(wt_output, &mut errors);

        if requires_parse {
            let output = ParsePhase.run(&ctx, &results.set).await;
            results.absorb(output, &mut errors);
        }

        if classifier.has_graph_filters() {
            if classifier.has_dependent_filters() && ctx.git_root.is_none() {
                if let Some(git) = &self.git {
                    match git.top_level_dir(&working_dir).await {
                        Ok(root) => ctx.git_root = Some(root),
                        Err(err) => {
                            // Non-fatal: dependent traversal just runs
                            // without the repository boundary.
                            debug!(error = %err, "git top-level dir unavailable");
                        }
                    }
                }
            }

            for component in results.set.all_components() {
                ctx.store.ensure_component(component);
            }
            if classifier.has_dependent_filters() {
                let union = ctx.store.to_components();
                errors.extend(build_dependency_graph(&ctx, &union).await);
            }

            let output = GraphPhase.run(&ctx, &results.set).await;
            results.absorb(output, &mut errors);
        }

        if self.discover_relationships {
            let output = RelationshipPhase.run(&ctx, &results.set).await;
            results.absorb(output, &mut errors);
        }

        let mut components: Components = results
            .set
            .discovered
            .iter()
            .map(|result| Arc::clone(&result.component))
            .collect();

        if let Some(joined) = DiscoveryError::join(errors) {
            if joined.is_canceled() || !self.suppress_parse_errors {
                return Err(joined);
            }
            debug!(error = %joined, "continuing discovery with partial results");
        }

        if let Some(filters) = &self.filters {
            if !filters.is_empty() {
                components = filters.evaluate(components);
            }
        }

        if let Err(cycle) = check_cycles(&components) {
            if !self.break_cycles {
                return Err(cycle);
            }
            let removed = remove_cycles(&mut components);
            debug!(removed = removed.len(), "broke dependency cycles");
        }

        if let Some(target) = &self.graph_target {
            components = prune_to_target(components, target, &working_dir)?;
        }

        apply_queue_filters(&components, &self.command, self.report.as_ref());

        info!(components = components.len(), "discovery complete");
        Ok(components)
    }
}

/// Accumulates phase outputs, deduplicating by path with first-seen
/// order. A later definite result upgrades an earlier candidate; an
/// exclusion retires one.
#[derive(Default)]
struct ResultSet {
    set: PhaseSet,
    discovered_paths: HashSet<PathBuf>,
    candidate_paths: HashSet<PathBuf>,
}

impl ResultSet {
    fn absorb(&mut self, output: PhaseOutput, errors: &mut Vec<DiscoveryError>) {
        errors.extend(output.errors);
        for result in output.results {
            let path = result.component.path().to_path_buf();
            match result.status {
                DiscoveryStatus::Discovered => {
                    if self.candidate_paths.remove(&path) {
                        self.set
                            .candidates
                            .retain(|candidate| candidate.component.path() != path);
                    }
                    if self.discovered_paths.insert(path) {
                        self.set.discovered.push(result);
                    }
                }
                DiscoveryStatus::Candidate => {
                    if !self.discovered_paths.contains(&path)
                        && self.candidate_paths.insert(path)
                    {
                        self.set.candidates.push(result);
                    }
                }
                DiscoveryStatus::Excluded => {
                    if self.candidate_paths.remove(&path) {
                        self.set
                            .candidates
                            .retain(|candidate| candidate.component.path() != path);
                    }
                }
            }
        }
    }
}
