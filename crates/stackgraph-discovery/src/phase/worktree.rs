use async_trait::async_trait;
use tracing::{debug, warn};

use crate::phase::filesystem::walk_root;
use crate::phase::{DiscoveryPhase, PhaseContext, PhaseKind, PhaseOutput, PhaseSet};

/// Same contract as the filesystem phase, but each traversal root is a
/// Git worktree supplied by the worktrees collaborator, one per unique
/// git-scoped filter expression. Runs concurrently with the filesystem
/// phase; the driver merges the two result sets.
pub struct WorktreePhase;

#[async_trait]
impl DiscoveryPhase for WorktreePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Worktree
    }

    async fn run(&self, ctx: &PhaseContext, _set: &PhaseSet) -> PhaseOutput {
        if !ctx.classifier.has_git_filters() {
            return PhaseOutput::empty();
        }
        let Some(provider) = &ctx.worktrees else {
            debug!("git filters present but no worktree provider configured");
            return PhaseOutput::empty();
        };

        let refs = ctx
            .filters
            .as_ref()
            .map(|filters| filters.unique_git_filters())
            .unwrap_or_default();
        let roots = provider.roots();
        if roots.len() < refs.len() {
            warn!(
                worktrees = roots.len(),
                git_filters = refs.len(),
                "fewer worktree roots than git filter expressions"
            );
        }

        let mut output = PhaseOutput::empty();
        for root in roots {
            if ctx.cancel.is_cancelled() {
                break;
            }
            if !root.is_dir() {
                warn!(root = %root.display(), "skipping missing worktree root");
                continue;
            }
            output.merge(walk_root(ctx, &root, PhaseKind::Worktree).await);
        }
        output
    }
}
