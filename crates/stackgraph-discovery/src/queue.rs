use std::sync::Arc;

use tracing::debug;

use stackgraph_core::{Components, ReportSink};

/// Applies exclude blocks for the current command. Exclusion is a marker
/// only: excluded components stay in the set so the runner can report
/// them. External dependencies excluded this way are forwarded to the
/// report sink.
pub fn apply_queue_filters(
    components: &Components,
    command: &str,
    report: Option<&Arc<dyn ReportSink>>,
) {
    if command.is_empty() {
        return;
    }

    for component in components {
        if component.is_stack() {
            continue;
        }
        let Some(config) = component.config() else {
            continue;
        };
        let Some(exclude) = &config.exclude else {
            continue;
        };
        if !exclude.applies_to(command) {
            continue;
        }
        if !exclude.condition {
            continue;
        }

        debug!(
            component = %component.path().display(),
            command,
            "excluding unit via exclude block"
        );
        component.set_excluded(true);

        if exclude.exclude_dependencies || exclude.no_run {
            for dep in component.dependencies() {
                if dep.is_stack() {
                    continue;
                }
                dep.set_excluded(true);
                debug!(
                    component = %dep.path().display(),
                    "excluding direct dependency via exclude block"
                );
                if dep.is_external() {
                    if let Some(sink) = report {
                        sink.excluded_external(dep.path(), "excluded by dependent exclude block");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use stackgraph_core::{Component, DiscoveryContext, ExcludeBlock, UnitConfig};

    fn unit_with_exclude(path: &str, exclude: Option<ExcludeBlock>) -> Arc<Component> {
        let component = Arc::new(Component::unit(
            path,
            "terragrunt.hcl",
            DiscoveryContext::new("/work"),
        ));
        component.set_config(
            UnitConfig {
                exclude,
                ..Default::default()
            },
            Vec::new(),
        );
        component
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl ReportSink for RecordingSink {
        fn excluded_external(&self, path: &Path, _reason: &str) {
            self.seen.lock().unwrap().push(path.to_path_buf());
        }
    }

    #[test]
    fn matching_action_excludes_unit_and_dependencies() {
        let a = unit_with_exclude(
            "/work/a",
            Some(ExcludeBlock {
                condition: true,
                actions: vec!["apply".into()],
                exclude_dependencies: true,
                no_run: false,
            }),
        );
        let b = unit_with_exclude("/work/b", None);
        a.add_dependency(&b);

        apply_queue_filters(&vec![Arc::clone(&a), Arc::clone(&b)], "apply", None);
        assert!(a.is_excluded());
        assert!(b.is_excluded());
    }

    #[test]
    fn non_matching_action_is_skipped() {
        let a = unit_with_exclude(
            "/work/a",
            Some(ExcludeBlock {
                condition: true,
                actions: vec!["plan".into()],
                exclude_dependencies: true,
                no_run: false,
            }),
        );

        apply_queue_filters(&vec![Arc::clone(&a)], "apply", None);
        assert!(!a.is_excluded());
    }

    #[test]
    fn false_condition_is_skipped() {
        let a = unit_with_exclude(
            "/work/a",
            Some(ExcludeBlock {
                condition: false,
                actions: vec!["apply".into()],
                exclude_dependencies: false,
                no_run: false,
            }),
        );

        apply_queue_filters(&vec![Arc::clone(&a)], "apply", None);
        assert!(!a.is_excluded());
    }

    #[test]
    fn external_dependency_exclusions_reach_the_report_sink() {
        let a = unit_with_exclude(
            "/work/a",
            Some(ExcludeBlock {
                condition: true,
                actions: vec!["all".into()],
                exclude_dependencies: true,
                no_run: false,
            }),
        );
        let external = unit_with_exclude("/elsewhere/shared", None);
        a.add_dependency(&external);

        let sink: Arc<RecordingSink> = Arc::new(RecordingSink::default());
        let as_sink: Arc<dyn ReportSink> = Arc::clone(&sink) as Arc<dyn ReportSink>;
        apply_queue_filters(&vec![Arc::clone(&a)], "destroy", Some(&as_sink));

        assert!(external.is_excluded());
        assert_eq!(
            sink.seen.lock().unwrap().as_slice(),
            &[PathBuf::from("/elsewhere/shared")]
        );
    }
}
