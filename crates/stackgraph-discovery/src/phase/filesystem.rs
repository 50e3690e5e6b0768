use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use stackgraph_core::{Component, ComponentKind, DiscoveryError, DiscoveryOrigin};

use crate::discovery::STACK_CONFIG_FILENAME;
use crate::phase::{DiscoveryPhase, DiscoveryResult, PhaseContext, PhaseKind, PhaseOutput, PhaseSet};
use crate::walk::{spawn_walker, WalkRequest};

/// Walks the working directory and emits a component per matched
/// configuration filename. One blocking producer traverses the tree;
/// `num_workers` consumers turn file paths into classified components.
pub struct FilesystemPhase;

#[async_trait]
impl DiscoveryPhase for FilesystemPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Filesystem
    }

    async fn run(&self, ctx: &PhaseContext, _set: &PhaseSet) -> PhaseOutput {
        walk_root(ctx, &ctx.working_dir, PhaseKind::Filesystem).await
    }
}

/// Shared walk-and-classify used by the filesystem and worktree phases.
pub(crate) async fn walk_root(ctx: &PhaseContext, root: &Path, phase: PhaseKind) -> PhaseOutput {
    debug!(root = %root.display(), %phase, "walking for configuration files");

    let (rx, producer) = spawn_walker(
        WalkRequest {
            root: root.to_path_buf(),
            config_filenames: ctx.config_filenames.clone(),
            no_hidden: ctx.no_hidden,
            num_workers: ctx.num_workers,
            cancel: ctx.cancel.clone(),
        },
        Arc::clone(&ctx.hidden_memo),
    );

    let mut rx = rx;
    let results: Vec<DiscoveryResult> = stream::poll_fn(move |cx| rx.poll_recv(cx))
        .map(|file| async move {
            if ctx.cancel.is_cancelled() {
                return None;
            }
            component_for_file(ctx, &file, root, phase)
        })
        .buffer_unordered(ctx.num_workers)
        .filter_map(|result| async move { result })
        .collect()
        .await;

    let mut errors = match producer.await {
        Ok(errors) => errors,
        Err(join_err) => vec![DiscoveryError::Filesystem(std::io::Error::other(join_err))],
    };
    if ctx.cancel.is_cancelled() && !errors.iter().any(|e| e.is_canceled()) {
        errors.push(DiscoveryError::Canceled);
    }

    PhaseOutput { results, errors }
}

fn component_for_file(
    ctx: &PhaseContext,
    file: &Path,
    root: &Path,
    phase: PhaseKind,
) -> Option<DiscoveryResult> {
    let dir = file.parent()?;
    let name = file.file_name()?.to_string_lossy().into_owned();
    let kind = if name == STACK_CONFIG_FILENAME {
        ComponentKind::Stack
    } else {
        ComponentKind::Unit
    };

    // Record which root produced the component so relative filter
    // patterns resolve against the worktree it actually came from.
    let context = ctx
        .discovery_context
        .with_origin(DiscoveryOrigin::Path)
        .with_discovery_root(root);
    let component = Arc::new(Component::new(kind, dir, name, context));
    Some(ctx.classifier.classify(&component, phase))
}
