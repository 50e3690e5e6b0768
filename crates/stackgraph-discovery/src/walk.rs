use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::{DirEntry, WalkBuilder};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use stackgraph_core::DiscoveryError;

/// Directory names whose subtrees are never traversed.
pub const SKIP_DIRS: &[&str] = &[".git", ".terraform", ".terragrunt-cache"];

/// Hidden directory that is traversed even under `no_hidden`.
pub const STACK_DIR: &str = ".terragrunt-stack";

const HIDDEN_MEMO_CAPACITY: usize = 1000;

/// Bounded cache of directory prefixes known to be hidden. Lookups are
/// prefix matches, so one entry answers for a whole subtree. Once full,
/// new prefixes are dropped and callers recompute on miss.
#[derive(Debug, Default)]
pub struct HiddenDirMemo {
    prefixes: RwLock<Vec<PathBuf>>,
}

impl HiddenDirMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` lies under a recorded hidden directory.
    pub fn covers(&self, path: &Path) -> bool {
        self.prefixes
            .read()
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    pub fn record(&self, dir: &Path) {
        let mut prefixes = self.prefixes.write();
        if prefixes.len() >= HIDDEN_MEMO_CAPACITY {
            return;
        }
        if prefixes.iter().any(|prefix| dir.starts_with(prefix)) {
            return;
        }
        prefixes.push(dir.to_path_buf());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.prefixes.read().len()
    }
}

/// Parameters for one traversal root.
pub struct WalkRequest {
    pub root: PathBuf,
    pub config_filenames: Vec<String>,
    pub no_hidden: bool,
    pub num_workers: usize,
    pub cancel: CancellationToken,
}

/// Spawns the producer side of the walk: a blocking task that traverses
/// the tree and sends every matched configuration file into a bounded
/// channel. The channel closes when traversal finishes; the handle yields
/// the filesystem errors hit along the way.
pub fn spawn_walker(
    request: WalkRequest,
    memo: Arc<HiddenDirMemo>,
) -> (mpsc::Receiver<PathBuf>, JoinHandle<Vec<DiscoveryError>>) {
    let (tx, rx) = mpsc::channel(request.num_workers * 4);

    let handle = tokio::task::spawn_blocking(move || {
        let WalkRequest {
            root,
            config_filenames,
            no_hidden,
            cancel,
            ..
        } = request;

        let mut errors = Vec::new();
        let filter_memo = Arc::clone(&memo);
        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| keep_entry(entry, no_hidden, &filter_memo))
            .build();

        for entry in walker {
            if cancel.is_cancelled() {
                debug!(root = %root.display(), "walk canceled");
                errors.push(DiscoveryError::Canceled);
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    errors.push(DiscoveryError::Filesystem(std::io::Error::other(err)));
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !config_filenames.iter().any(|filename| filename == name.as_ref()) {
                continue;
            }
            // A full channel blocks here; the receiver side dropping the
            // channel (e.g. on cancellation) unblocks us with an error.
            if tx.blocking_send(entry.into_path()).is_err() {
                break;
            }
        }

        errors
    });

    (rx, handle)
}

fn keep_entry(entry: &DirEntry, no_hidden: bool, memo: &HiddenDirMemo) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
    if !is_dir {
        return !memo.covers(entry.path());
    }

    let name = entry.file_name().to_string_lossy();
    if SKIP_DIRS.iter().any(|skip| *skip == name.as_ref()) {
        return false;
    }
    if no_hidden && name.starts_with('.') && name.as_ref() != STACK_DIR {
        if !memo.covers(entry.path()) {
            memo.record(entry.path());
            debug!(dir = %entry.path().display(), "skipping hidden directory");
        }
        return false;
    }
    true
}
