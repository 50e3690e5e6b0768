use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use stackgraph_core::{Components, DiscoveryError, Result};

use crate::dependents::DependentsIndex;
use crate::paths::{canonicalize_permissive, clean_path};

/// Restricts `components` to the target plus all of its transitive
/// dependents, preserving input order. All comparisons run over
/// symlink-resolved paths; resolution failures fall back to the cleaned
/// absolute path.
pub fn prune_to_target(
    components: Components,
    target: &Path,
    working_dir: &Path,
) -> Result<Components> {
    let resolved_target = resolve_target(target, working_dir)?;
    debug!(target = %resolved_target.display(), "pruning to graph target");

    let index =
        DependentsIndex::build_with_key(&components, canonicalize_permissive).propagated();

    let mut allowed: HashSet<PathBuf> = index
        .dependents_of(&resolved_target)
        .iter()
        .cloned()
        .collect();
    allowed.insert(resolved_target);

    Ok(components
        .into_iter()
        .filter(|component| allowed.contains(&canonicalize_permissive(component.path())))
        .collect())
}

/// Makes the target absolute: already-absolute targets are cleaned,
/// relative ones are joined with the canonical working directory (falling
/// back to the plain join, then to the process working directory).
fn resolve_target(target: &Path, working_dir: &Path) -> Result<PathBuf> {
    let absolute = if target.is_absolute() {
        clean_path(target)
    } else {
        match working_dir.canonicalize() {
            Ok(canonical) => clean_path(&canonical.join(target)),
            Err(_) => {
                let joined = working_dir.join(target);
                if joined.is_absolute() {
                    clean_path(&joined)
                } else {
                    let cwd = std::env::current_dir().map_err(|_| {
                        DiscoveryError::GraphTargetResolution(target.to_path_buf())
                    })?;
                    clean_path(&cwd.join(joined))
                }
            }
        }
    };

    Ok(canonicalize_permissive(&absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stackgraph_core::{Component, DiscoveryContext};

    fn unit(path: &str) -> Arc<Component> {
        Arc::new(Component::unit(
            path,
            "terragrunt.hcl",
            DiscoveryContext::new("/work"),
        ))
    }

    fn fixture() -> Components {
        let root = unit("/work/root");
        let child1 = unit("/work/child1");
        let child2 = unit("/work/child2");
        child1.add_dependency(&root);
        child2.add_dependency(&child1);
        vec![root, child1, child2]
    }

    #[test]
    fn target_keeps_itself_and_transitive_dependents() {
        let pruned =
            prune_to_target(fixture(), Path::new("/work/root"), Path::new("/work")).unwrap();
        let paths: Vec<_> = pruned.iter().map(|c| c.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/work/root"),
                PathBuf::from("/work/child1"),
                PathBuf::from("/work/child2"),
            ]
        );
    }

    #[test]
    fn mid_chain_target_drops_its_dependencies() {
        let pruned =
            prune_to_target(fixture(), Path::new("/work/child1"), Path::new("/work")).unwrap();
        let paths: Vec<_> = pruned.iter().map(|c| c.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/work/child1"),
                PathBuf::from("/work/child2"),
            ]
        );
    }

    #[test]
    fn relative_target_joins_the_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path();
        std::fs::create_dir_all(work.join("root")).unwrap();

        let root_path = canonicalize_permissive(&work.join("root"));
        let child_path = canonicalize_permissive(&work.join("child"));
        let root = unit(root_path.to_str().unwrap());
        let child = unit(child_path.to_str().unwrap());
        child.add_dependency(&root);

        let pruned = prune_to_target(vec![root, child], Path::new("root"), work).unwrap();
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn unknown_target_prunes_everything() {
        let pruned =
            prune_to_target(fixture(), Path::new("/work/absent"), Path::new("/work")).unwrap();
        assert!(pruned.is_empty());
    }
}
