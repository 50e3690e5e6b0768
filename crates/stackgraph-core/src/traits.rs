use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{ParsedConfig, ParserOptions, Result};

/// External configuration parser. The discovery core never parses
/// configuration text itself; it hands a component path to this
/// collaborator and consumes the decoded value.
#[async_trait]
pub trait ConfigParser: Send + Sync {
    async fn parse(&self, path: &Path, options: &ParserOptions) -> Result<ParsedConfig>;
}

/// Resolves the top-level directory of the repository containing `path`.
/// Consulted before backward (dependent) traversal; failure is non-fatal.
#[async_trait]
pub trait GitResolver: Send + Sync {
    async fn top_level_dir(&self, path: &Path) -> Result<PathBuf>;
}

/// Supplies additional filesystem roots from Git's worktree facility,
/// one per git-scoped filter expression.
pub trait WorktreeProvider: Send + Sync {
    fn roots(&self) -> Vec<PathBuf>;
}

/// Sink for dependencies that were discovered outside the working
/// directory and then excluded from the final set.
pub trait ReportSink: Send + Sync {
    fn excluded_external(&self, path: &Path, reason: &str);
}

/// A `ReportSink` that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReport;

impl ReportSink for NoopReport {
    fn excluded_external(&self, _path: &Path, _reason: &str) {}
}
