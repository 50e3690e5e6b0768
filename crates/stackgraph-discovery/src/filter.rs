use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobMatcher};

use stackgraph_core::{Component, ComponentKind, Components, DiscoveryError, Result};
use stackgraph_graph::DependentsIndex;

/// Direction of a graph filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphDirection {
    /// Follow forward edges from the seeds.
    Dependencies,
    /// Follow reverse edges from the seeds.
    Dependents,
}

/// Traversal request attached to a filter expression. A `depth` of `None`
/// defers to the driver's `max_dependency_depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSpec {
    pub direction: GraphDirection,
    pub depth: Option<usize>,
}

#[derive(Debug, Clone)]
enum Matcher {
    Path(GlobMatcher),
    Kind(ComponentKind),
    ReadsFile(PathBuf),
    SourceContains(String),
}

impl Matcher {
    fn requires_parse(&self) -> bool {
        matches!(self, Matcher::ReadsFile(_) | Matcher::SourceContains(_))
    }

    /// Evaluates without config access; parse-dependent matchers answer
    /// `false` until the component is parsed.
    fn matches(&self, component: &Arc<Component>) -> bool {
        match self {
            Matcher::Path(glob) => {
                if glob.is_match(component.path()) {
                    return true;
                }
                // Relative patterns resolve against the working directory
                // and against the root the component was discovered under
                // (a worktree root for worktree-discovered components).
                let context = component.context();
                for base in [&context.working_dir, &context.discovery_root] {
                    if let Ok(relative) = component.path().strip_prefix(base) {
                        if glob.is_match(relative) {
                            return true;
                        }
                    }
                }
                false
            }
            Matcher::Kind(kind) => component.kind() == *kind,
            Matcher::ReadsFile(path) => component.reads_file(path),
            Matcher::SourceContains(needle) => component
                .config()
                .and_then(|config| config.terraform_source.clone())
                .map(|source| source.contains(needle))
                .unwrap_or(false),
        }
    }
}

/// One compiled expression of the filter query.
#[derive(Debug, Clone)]
pub struct FilterExpr {
    matcher: Matcher,
    negated: bool,
    graph: Option<GraphSpec>,
    git_ref: Option<String>,
}

impl FilterExpr {
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn graph(&self) -> Option<GraphSpec> {
        self.graph
    }

    pub fn git_ref(&self) -> Option<&str> {
        self.git_ref.as_deref()
    }

    pub fn requires_parse(&self) -> bool {
        self.matcher.requires_parse()
    }

    pub fn matches(&self, component: &Arc<Component>) -> bool {
        self.matcher.matches(component)
    }
}

/// A pre-compiled filter query. The query language itself lives outside
/// the discovery core; callers hand over this compiled form, built
/// programmatically through [`FiltersBuilder`].
#[derive(Debug, Clone, Default)]
pub struct Filters {
    exprs: Vec<FilterExpr>,
}

impl Filters {
    pub fn builder() -> FiltersBuilder {
        FiltersBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn exprs(&self) -> &[FilterExpr] {
        &self.exprs
    }

    pub fn expr(&self, index: usize) -> Option<&FilterExpr> {
        self.exprs.get(index)
    }

    /// Whether any expression includes components (as opposed to a query
    /// that only carves exclusions out of the full set).
    pub fn has_positive_filter(&self) -> bool {
        self.exprs.iter().any(|expr| !expr.negated)
    }

    /// Whether any expression needs parsed configuration to evaluate.
    pub fn requires_parse(&self) -> bool {
        self.exprs.iter().any(|expr| expr.requires_parse())
    }

    /// Distinct git refs referenced by git-scoped expressions, in
    /// first-appearance order.
    pub fn unique_git_filters(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();
        for expr in &self.exprs {
            if let Some(git_ref) = &expr.git_ref {
                if seen.insert(git_ref.clone()) {
                    refs.push(git_ref.clone());
                }
            }
        }
        refs
    }

    /// Index of the first graph expression whose seed matcher matches the
    /// component; used by the classifier for candidate routing.
    pub fn graph_seed_index(&self, component: &Arc<Component>) -> Option<usize> {
        self.exprs
            .iter()
            .position(|expr| expr.graph.is_some() && !expr.negated && expr.matches(component))
    }

    /// Whether the component matches a positive non-graph expression that
    /// needs no parsed configuration.
    pub fn matches_static(&self, component: &Arc<Component>) -> bool {
        self.exprs.iter().any(|expr| {
            !expr.negated
                && expr.graph.is_none()
                && !expr.requires_parse()
                && expr.matches(component)
        })
    }

    /// Whether the component matches a positive parse-dependent
    /// expression. Meaningful only after the component was parsed.
    pub fn matches_parsed(&self, component: &Arc<Component>) -> bool {
        self.exprs.iter().any(|expr| {
            !expr.negated && expr.graph.is_none() && expr.requires_parse() && expr.matches(component)
        })
    }

    /// Applies the full query to an already-discovered set. Called once
    /// by the driver; graph expressions evaluate reachability over the
    /// edges materialized by earlier phases. Preserves input order.
    pub fn evaluate(&self, components: Components) -> Components {
        if self.exprs.is_empty() {
            return components;
        }

        let needs_dependents = self.exprs.iter().any(|expr| {
            matches!(
                expr.graph,
                Some(GraphSpec {
                    direction: GraphDirection::Dependents,
                    ..
                })
            )
        });
        let dependents = if needs_dependents {
            DependentsIndex::build(&components)
        } else {
            DependentsIndex::default()
        };

        let mut selected: HashSet<PathBuf> = if self.has_positive_filter() {
            HashSet::new()
        } else {
            components.iter().map(|c| c.path().to_path_buf()).collect()
        };

        for expr in self.exprs.iter().filter(|expr| !expr.negated) {
            let matched = self.reach(expr, &components, &dependents);
            selected.extend(matched);
        }
        for expr in self.exprs.iter().filter(|expr| expr.negated) {
            for path in self.reach(expr, &components, &dependents) {
                selected.remove(&path);
            }
        }

        components
            .into_iter()
            .filter(|component| selected.contains(component.path()))
            .collect()
    }

    /// Paths selected by one expression: the matching components, widened
    /// along the requested graph direction when the expression carries a
    /// traversal.
    fn reach(
        &self,
        expr: &FilterExpr,
        components: &Components,
        dependents: &DependentsIndex,
    ) -> HashSet<PathBuf> {
        let mut reached: HashSet<PathBuf> = HashSet::new();
        let mut frontier: VecDeque<(Arc<Component>, usize)> = VecDeque::new();

        for component in components {
            if expr.matches(component) {
                reached.insert(component.path().to_path_buf());
                frontier.push_back((Arc::clone(component), 0));
            }
        }

        let Some(spec) = expr.graph else {
            return reached;
        };
        let depth_limit = spec.depth.unwrap_or(usize::MAX);
        let members: HashSet<&Path> = components.iter().map(|c| c.path()).collect();

        while let Some((component, depth)) = frontier.pop_front() {
            if depth >= depth_limit {
                continue;
            }
            let next: Vec<PathBuf> = match spec.direction {
                GraphDirection::Dependencies => component
                    .dependencies()
                    .iter()
                    .map(|dep| dep.path().to_path_buf())
                    .collect(),
                GraphDirection::Dependents => {
                    dependents.dependents_of(component.path()).to_vec()
                }
            };
            for path in next {
                if !members.contains(path.as_path()) || !reached.insert(path.clone()) {
                    continue;
                }
                if let Some(found) = components.iter().find(|c| c.path() == path) {
                    frontier.push_back((Arc::clone(found), depth + 1));
                }
            }
        }

        reached
    }
}

/// Builds a compiled filter query expression by expression.
#[derive(Debug, Clone, Default)]
pub struct FiltersBuilder {
    exprs: Vec<FilterExpr>,
}

impl FiltersBuilder {
    fn push(mut self, matcher: Matcher, negated: bool, graph: Option<GraphSpec>) -> Self {
        self.exprs.push(FilterExpr {
            matcher,
            negated,
            graph,
            git_ref: None,
        });
        self
    }

    fn glob(pattern: &str) -> Result<GlobMatcher> {
        Glob::new(pattern)
            .map(|glob| glob.compile_matcher())
            .map_err(|err| DiscoveryError::Filter(format!("invalid glob {pattern:?}: {err}")))
    }

    /// Include components whose path matches the glob.
    pub fn path(self, pattern: &str) -> Result<Self> {
        Ok(self.push(Matcher::Path(Self::glob(pattern)?), false, None))
    }

    /// Exclude components whose path matches the glob.
    pub fn exclude_path(self, pattern: &str) -> Result<Self> {
        Ok(self.push(Matcher::Path(Self::glob(pattern)?), true, None))
    }

    /// Include components of the given kind.
    pub fn kind(self, kind: ComponentKind) -> Self {
        self.push(Matcher::Kind(kind), false, None)
    }

    /// Include units whose parse recorded a read of the given file.
    pub fn reads_file(self, path: impl Into<PathBuf>) -> Self {
        self.push(Matcher::ReadsFile(path.into()), false, None)
    }

    /// Include units whose terraform source contains the needle.
    pub fn source_contains(self, needle: impl Into<String>) -> Self {
        self.push(Matcher::SourceContains(needle.into()), false, None)
    }

    /// Include path-matched seeds plus their dependencies.
    pub fn dependencies_of(self, pattern: &str, depth: Option<usize>) -> Result<Self> {
        Ok(self.push(
            Matcher::Path(Self::glob(pattern)?),
            false,
            Some(GraphSpec {
                direction: GraphDirection::Dependencies,
                depth,
            }),
        ))
    }

    /// Include path-matched seeds plus their dependents.
    pub fn dependents_of(self, pattern: &str, depth: Option<usize>) -> Result<Self> {
        Ok(self.push(
            Matcher::Path(Self::glob(pattern)?),
            false,
            Some(GraphSpec {
                direction: GraphDirection::Dependents,
                depth,
            }),
        ))
    }

    /// Include path-matched components within the worktree of `git_ref`.
    pub fn path_in_git_ref(mut self, pattern: &str, git_ref: impl Into<String>) -> Result<Self> {
        self.exprs.push(FilterExpr {
            matcher: Matcher::Path(Self::glob(pattern)?),
            negated: false,
            graph: None,
            git_ref: Some(git_ref.into()),
        });
        Ok(self)
    }

    pub fn build(self) -> Filters {
        Filters { exprs: self.exprs }
    }
}
