use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// The configuration exists but carries no discoverable settings
    /// (include-only file). Never fatal during discovery.
    #[error("{} contains no discoverable settings", .0.display())]
    IncludeOnlyConfig(PathBuf),

    #[error("dependency {name:?} of {} has a non-string config_path", .path.display())]
    DependencyPath { path: PathBuf, name: String },

    #[error("max dependency depth reached while traversing from {}", .0.display())]
    MaxDepthReached(PathBuf),

    #[error("dependency cycle detected at {}", .0.display())]
    Cycle(PathBuf),

    #[error("cannot resolve graph target {}", .0.display())]
    GraphTargetResolution(PathBuf),

    #[error("invalid filter: {0}")]
    Filter(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("discovery canceled")]
    Canceled,

    #[error("{}", render_joined(.0))]
    Joined(Vec<DiscoveryError>),
}

impl DiscoveryError {
    /// Collapses a collected error list: empty becomes `None`, a single
    /// error is returned as itself, anything more is `Joined`.
    pub fn join(mut errors: Vec<DiscoveryError>) -> Option<DiscoveryError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(DiscoveryError::Joined(errors)),
        }
    }

    pub fn is_canceled(&self) -> bool {
        match self {
            DiscoveryError::Canceled => true,
            DiscoveryError::Joined(errors) => errors.iter().any(|e| e.is_canceled()),
            _ => false,
        }
    }
}

fn render_joined(errors: &[DiscoveryError]) -> String {
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    rendered.join("\n")
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
