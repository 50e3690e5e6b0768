use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::UnitConfig;

/// What kind of thing a matched configuration file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// An executable deployment unit.
    Unit,
    /// A composition construct; never parsed for dependencies.
    Stack,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Unit => write!(f, "unit"),
            ComponentKind::Stack => write!(f, "stack"),
        }
    }
}

/// Which part of the pipeline first produced a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryOrigin {
    Path,
    Graph,
    Relationship,
}

/// How a component was discovered: the working directory of the run, the
/// filesystem root the component was actually found under (the working
/// directory itself, or a Git worktree root), and the origin of the
/// discovery. Every created component gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryContext {
    pub working_dir: PathBuf,
    pub discovery_root: PathBuf,
    pub origin: DiscoveryOrigin,
}

impl DiscoveryContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            discovery_root: working_dir.clone(),
            working_dir,
            origin: DiscoveryOrigin::Path,
        }
    }

    pub fn with_origin(&self, origin: DiscoveryOrigin) -> Self {
        Self {
            working_dir: self.working_dir.clone(),
            discovery_root: self.discovery_root.clone(),
            origin,
        }
    }

    /// Copy scoped to another traversal root, e.g. a worktree.
    pub fn with_discovery_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: self.working_dir.clone(),
            discovery_root: root.into(),
            origin: self.origin,
        }
    }
}

/// Lazy-parse state machine for a unit's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParseState {
    Unparsed = 0,
    Parsed = 1,
    ParseFailed = 2,
}

impl ParseState {
    fn from_u8(raw: u8) -> ParseState {
        match raw {
            1 => ParseState::Parsed,
            2 => ParseState::ParseFailed,
            _ => ParseState::Unparsed,
        }
    }
}

/// The atomic unit of discovery. Identity is the canonical path; the
/// store guarantees at most one instance per path, so components are
/// always handled as `Arc<Component>` and mutated through interior locks.
pub struct Component {
    kind: ComponentKind,
    path: PathBuf,
    config_file: String,
    external: bool,
    context: DiscoveryContext,
    config: RwLock<Option<Arc<UnitConfig>>>,
    parse_state: AtomicU8,
    dependencies: RwLock<Vec<Arc<Component>>>,
    excluded: AtomicBool,
    reading: RwLock<HashSet<PathBuf>>,
}

pub type Components = Vec<Arc<Component>>;

impl Component {
    pub fn new(
        kind: ComponentKind,
        path: impl Into<PathBuf>,
        config_file: impl Into<String>,
        context: DiscoveryContext,
    ) -> Self {
        let path = path.into();
        let external = !path.starts_with(&context.working_dir);
        Self {
            kind,
            path,
            config_file: config_file.into(),
            external,
            context,
            config: RwLock::new(None),
            parse_state: AtomicU8::new(ParseState::Unparsed as u8),
            dependencies: RwLock::new(Vec::new()),
            excluded: AtomicBool::new(false),
            reading: RwLock::new(HashSet::new()),
        }
    }

    pub fn unit(
        path: impl Into<PathBuf>,
        config_file: impl Into<String>,
        context: DiscoveryContext,
    ) -> Self {
        Self::new(ComponentKind::Unit, path, config_file, context)
    }

    pub fn stack(
        path: impl Into<PathBuf>,
        config_file: impl Into<String>,
        context: DiscoveryContext,
    ) -> Self {
        Self::new(ComponentKind::Stack, path, config_file, context)
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn is_stack(&self) -> bool {
        self.kind == ComponentKind::Stack
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn context(&self) -> &DiscoveryContext {
        &self.context
    }

    /// True when the component lies outside the run's working directory.
    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn config(&self) -> Option<Arc<UnitConfig>> {
        self.config.read().clone()
    }

    pub fn parse_state(&self) -> ParseState {
        ParseState::from_u8(self.parse_state.load(Ordering::Acquire))
    }

    /// Whether a parse is still required before config-dependent phases
    /// can look at this component. Stacks never need one.
    pub fn needs_parse(&self) -> bool {
        self.kind == ComponentKind::Unit && self.parse_state() == ParseState::Unparsed
    }

    pub fn set_config(&self, config: UnitConfig, files_read: Vec<PathBuf>) {
        *self.config.write() = Some(Arc::new(config));
        if !files_read.is_empty() {
            self.reading.write().extend(files_read);
        }
        self.parse_state
            .store(ParseState::Parsed as u8, Ordering::Release);
    }

    pub fn mark_parse_failed(&self) {
        self.parse_state
            .store(ParseState::ParseFailed as u8, Ordering::Release);
    }

    pub fn dependencies(&self) -> Components {
        self.dependencies.read().clone()
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.read().is_empty()
    }

    /// Appends an edge to `dep`. Self-loops and duplicate edges are
    /// rejected; returns whether the edge was added.
    pub fn add_dependency(self: &Arc<Self>, dep: &Arc<Component>) -> bool {
        if Arc::ptr_eq(self, dep) || self.path == dep.path {
            return false;
        }
        let mut deps = self.dependencies.write();
        if deps.iter().any(|existing| existing.path == dep.path) {
            return false;
        }
        deps.push(Arc::clone(dep));
        true
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded.load(Ordering::Acquire)
    }

    pub fn set_excluded(&self, excluded: bool) {
        self.excluded.store(excluded, Ordering::Release);
    }

    /// File paths read while parsing this component's configuration.
    pub fn reads(&self) -> HashSet<PathBuf> {
        self.reading.read().clone()
    }

    pub fn reads_file(&self, path: &Path) -> bool {
        self.reading.read().contains(path)
    }

    pub fn record_reads<I>(&self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.reading.write().extend(paths);
    }
}

// Manual Debug: dependency edges can be cyclic mid-pipeline, so only
// identity fields are printed.
impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("config_file", &self.config_file)
            .field("external", &self.external)
            .field("parse_state", &self.parse_state())
            .field("excluded", &self.is_excluded())
            .finish()
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Component {}

impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
