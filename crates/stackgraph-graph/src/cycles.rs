use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use stackgraph_core::{Component, Components, DiscoveryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

enum Step {
    Visit(Arc<Component>),
    Retreat,
}

/// Three-color DFS over the component set. Returns the first component a
/// back edge points at, i.e. a participant of the first cycle found.
///
/// Edges leading outside the given set are not followed; the set is the
/// graph under inspection.
pub fn find_cycle(components: &Components) -> Option<Arc<Component>> {
    let members: HashSet<&Path> = components.iter().map(|c| c.path()).collect();
    let mut colors: HashMap<PathBuf, Color> = HashMap::new();

    for root in components {
        if color_of(&colors, root.path()) != Color::White {
            continue;
        }

        let mut stack: Vec<(Arc<Component>, Components, usize)> = Vec::new();
        colors.insert(root.path().to_path_buf(), Color::Gray);
        let root_deps = root.dependencies();
        stack.push((Arc::clone(root), root_deps, 0));

        while !stack.is_empty() {
            let step = {
                let (_, deps, next) = stack.last_mut().unwrap();
                if *next < deps.len() {
                    let dep = Arc::clone(&deps[*next]);
                    *next += 1;
                    Step::Visit(dep)
                } else {
                    Step::Retreat
                }
            };

            match step {
                Step::Retreat => {
                    let (node, _, _) = stack.pop().unwrap();
                    colors.insert(node.path().to_path_buf(), Color::Black);
                }
                Step::Visit(dep) => {
                    if !members.contains(dep.path()) {
                        continue;
                    }
                    match color_of(&colors, dep.path()) {
                        Color::Gray => return Some(dep),
                        Color::Black => {}
                        Color::White => {
                            colors.insert(dep.path().to_path_buf(), Color::Gray);
                            let dep_deps = dep.dependencies();
                            stack.push((dep, dep_deps, 0));
                        }
                    }
                }
            }
        }
    }

    None
}

fn color_of(colors: &HashMap<PathBuf, Color>, path: &Path) -> Color {
    colors.get(path).copied().unwrap_or(Color::White)
}

/// Errors with `CycleError` if the set contains a dependency cycle.
pub fn check_cycles(components: &Components) -> Result<()> {
    match find_cycle(components) {
        Some(offender) => Err(DiscoveryError::Cycle(offender.path().to_path_buf())),
        None => Ok(()),
    }
}

/// Repeatedly removes one participant of each detected cycle until the
/// set is cycle-free. Each removal shrinks the set, so the loop is
/// bounded by the component count at entry. Returns the removed
/// components.
pub fn remove_cycles(components: &mut Components) -> Components {
    let max_attempts = components.len();
    let mut removed = Vec::new();

    for _ in 0..max_attempts {
        let Some(offender) = find_cycle(components) else {
            break;
        };
        warn!(
            component = %offender.path().display(),
            "breaking dependency cycle"
        );
        components.retain(|c| c.path() != offender.path());
        removed.push(offender);
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph_core::DiscoveryContext;

    fn unit(path: &str) -> Arc<Component> {
        Arc::new(Component::unit(
            path,
            "terragrunt.hcl",
            DiscoveryContext::new("/work"),
        ))
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let a = unit("/work/a");
        let b = unit("/work/b");
        let c = unit("/work/c");
        a.add_dependency(&b);
        b.add_dependency(&c);

        let components = vec![a, b, c];
        assert!(find_cycle(&components).is_none());
        assert!(check_cycles(&components).is_ok());
    }

    #[test]
    fn two_cycle_is_detected_and_broken() {
        let a = unit("/work/a");
        let b = unit("/work/b");
        a.add_dependency(&b);
        b.add_dependency(&a);

        let mut components = vec![Arc::clone(&a), Arc::clone(&b)];
        assert!(check_cycles(&components).is_err());

        let removed = remove_cycles(&mut components);
        assert_eq!(removed.len(), 1);
        assert_eq!(components.len(), 1);
        assert!(find_cycle(&components).is_none());
    }

    #[test]
    fn edges_leaving_the_set_are_ignored() {
        let a = unit("/work/a");
        let b = unit("/work/b");
        a.add_dependency(&b);
        b.add_dependency(&a);

        // Only `a` is in the set; the cycle runs through a node outside it.
        let components = vec![a];
        assert!(find_cycle(&components).is_none());
    }

    #[test]
    fn overlapping_cycles_are_all_broken() {
        let a = unit("/work/a");
        let b = unit("/work/b");
        let c = unit("/work/c");
        a.add_dependency(&b);
        b.add_dependency(&a);
        b.add_dependency(&c);
        c.add_dependency(&b);

        let mut components = vec![a, b, c];
        remove_cycles(&mut components);
        assert!(find_cycle(&components).is_none());
        assert!(!components.is_empty());
    }
}
