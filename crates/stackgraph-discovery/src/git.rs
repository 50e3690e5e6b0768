use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::Repository;
use tracing::warn;

use stackgraph_core::{DiscoveryError, GitResolver, Result, WorktreeProvider};

/// Resolves the repository top-level directory through libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibGitResolver;

#[async_trait]
impl GitResolver for LibGitResolver {
    async fn top_level_dir(&self, path: &Path) -> Result<PathBuf> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::discover(&path)
                .map_err(|err| DiscoveryError::Git(err.message().to_string()))?;
            repo.workdir()
                .map(Path::to_path_buf)
                .ok_or_else(|| DiscoveryError::Git("repository has no working directory".into()))
        })
        .await
        .map_err(|err| DiscoveryError::Git(format!("git resolution task failed: {err}")))?
    }
}

/// Lists the linked worktrees of the repository containing `repo_dir`.
#[derive(Debug, Clone)]
pub struct LibGitWorktrees {
    repo_dir: PathBuf,
}

impl LibGitWorktrees {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

impl WorktreeProvider for LibGitWorktrees {
    fn roots(&self) -> Vec<PathBuf> {
        let repo = match Repository::discover(&self.repo_dir) {
            Ok(repo) => repo,
            Err(err) => {
                warn!(
                    dir = %self.repo_dir.display(),
                    error = %err.message(),
                    "cannot discover repository for worktree listing"
                );
                return Vec::new();
            }
        };
        let names = match repo.worktrees() {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err.message(), "cannot list worktrees");
                return Vec::new();
            }
        };
        names
            .iter()
            .flatten()
            .filter_map(|name| {
                repo.find_worktree(name)
                    .ok()
                    .map(|worktree| worktree.path().to_path_buf())
            })
            .collect()
    }
}
