use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use stackgraph_core::{
    ComponentKind, DependencyBlock, ExcludeBlock, ParseState, UnitConfig, WorktreeProvider,
};
use stackgraph_discovery::{Discovery, FailingParser, Filters, StaticParser};

fn tree(entries: &[&str]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    for entry in entries {
        let path = dir.path().join(entry);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn unit_config(dependency_paths: &[&str]) -> UnitConfig {
    UnitConfig {
        dependency_blocks: dependency_paths
            .iter()
            .enumerate()
            .map(|(i, path)| DependencyBlock::new(format!("dep{i}"), *path))
            .collect(),
        ..Default::default()
    }
}

fn sorted_relative(components: &stackgraph_core::Components, root: &Path) -> Vec<String> {
    let mut paths: Vec<String> = components
        .iter()
        .map(|component| {
            component
                .path()
                .strip_prefix(root)
                .unwrap_or(component.path())
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    paths.sort();
    paths
}

#[tokio::test]
async fn flat_discovery_prunes_cache_dirs() {
    let (_guard, root) = tree(&[
        "a/terragrunt.hcl",
        "b/terragrunt.hcl",
        "c/.terragrunt-cache/x/terragrunt.hcl",
    ]);

    let components = Discovery::new(&root)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sorted_relative(&components, &root), vec!["a", "b"]);
}

#[tokio::test]
async fn stack_configs_discover_as_stacks() {
    let (_guard, root) = tree(&["app/terragrunt.hcl", "platform/terragrunt.stack.hcl"]);

    let components = Discovery::new(&root)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    let stack = components
        .iter()
        .find(|c| c.path().ends_with("platform"))
        .unwrap();
    assert_eq!(stack.kind(), ComponentKind::Stack);
    assert!(stack.dependencies().is_empty());

    let unit = components.iter().find(|c| c.path().ends_with("app")).unwrap();
    assert_eq!(unit.kind(), ComponentKind::Unit);
}

#[tokio::test]
async fn dependency_resolution_links_graph_discovered_units() {
    let (_guard, root) = tree(&["a/terragrunt.hcl", "b/terragrunt.hcl"]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(root.join("a"), unit_config(&["../b"]));

    let filters = Filters::builder().dependencies_of("**/a", None).unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sorted_relative(&components, &root), vec!["a", "b"]);

    let a = components.iter().find(|c| c.path().ends_with("a")).unwrap();
    let b = components.iter().find(|c| c.path().ends_with("b")).unwrap();
    let a_deps: Vec<PathBuf> = a
        .dependencies()
        .iter()
        .map(|dep| dep.path().to_path_buf())
        .collect();
    assert_eq!(a_deps, vec![b.path().to_path_buf()]);
    assert!(b.dependencies().is_empty());
}

#[tokio::test]
async fn graph_discovery_materializes_external_dependencies() {
    let (_outside_guard, outside) = tree(&["shared/terragrunt.hcl"]);
    let (_guard, root) = tree(&["a/terragrunt.hcl"]);

    let shared = outside.join("shared");
    let parser = Arc::new(StaticParser::new());
    parser.insert(
        root.join("a"),
        unit_config(&[shared.to_str().unwrap()]),
    );

    let filters = Filters::builder().dependencies_of("**/a", None).unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    let external = components
        .iter()
        .find(|c| c.path() == shared.as_path())
        .expect("external dependency discovered");
    assert!(external.is_external());
}

#[tokio::test]
async fn cycles_error_by_default_and_break_when_asked() {
    let (_guard, root) = tree(&["a/terragrunt.hcl", "b/terragrunt.hcl"]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(root.join("a"), unit_config(&["../b"]));
    parser.insert(root.join("b"), unit_config(&["../a"]));

    let base = || {
        let parser = Arc::clone(&parser);
        Discovery::new(&root)
            .with_parser(parser)
            .with_discover_relationships(true)
    };

    let err = base().discover(CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("cycle"));

    let components = base()
        .with_break_cycles(true)
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(components.len(), 1);
}

#[tokio::test]
async fn graph_target_prunes_to_target_and_dependents() {
    let (_guard, root) = tree(&[
        "root/terragrunt.hcl",
        "child1/terragrunt.hcl",
        "child2/terragrunt.hcl",
    ]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(root.join("child1"), unit_config(&["../root"]));
    parser.insert(root.join("child2"), unit_config(&["../child1"]));

    let base = || {
        let parser = Arc::clone(&parser);
        Discovery::new(&root)
            .with_parser(parser)
            .with_discover_relationships(true)
    };

    let all = base()
        .with_graph_target(root.join("root"))
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        sorted_relative(&all, &root),
        vec!["child1", "child2", "root"]
    );

    let children = base()
        .with_graph_target(root.join("child1"))
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sorted_relative(&children, &root), vec!["child1", "child2"]);
}

#[tokio::test]
async fn hidden_directories_honor_no_hidden() {
    let (_guard, root) = tree(&[".hidden/x/terragrunt.hcl", "visible/terragrunt.hcl"]);

    let with_hidden = Discovery::new(&root)
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        sorted_relative(&with_hidden, &root),
        vec![".hidden/x", "visible"]
    );

    let without_hidden = Discovery::new(&root)
        .with_no_hidden(true)
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sorted_relative(&without_hidden, &root), vec!["visible"]);
}

#[tokio::test]
async fn exclude_blocks_mark_unit_and_dependencies() {
    let (_guard, root) = tree(&["a/terragrunt.hcl", "b/terragrunt.hcl"]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(
        root.join("a"),
        UnitConfig {
            exclude: Some(ExcludeBlock {
                condition: true,
                actions: vec!["apply".into()],
                exclude_dependencies: true,
                no_run: false,
            }),
            dependency_blocks: vec![DependencyBlock::new("b", "../b")],
            ..Default::default()
        },
    );

    let components = Discovery::new(&root)
        .with_parser(parser)
        .with_parse_exclude(true)
        .with_discover_relationships(true)
        .with_command("apply")
        .discover(CancellationToken::new())
        .await
        .unwrap();

    let a = components.iter().find(|c| c.path().ends_with("a")).unwrap();
    let b = components.iter().find(|c| c.path().ends_with("b")).unwrap();
    assert!(a.is_excluded());
    assert!(b.is_excluded());
    // Exclusion is a marker; both stay in the set.
    assert_eq!(components.len(), 2);
}

#[tokio::test]
async fn dependents_filter_includes_reverse_closure() {
    let (_guard, root) = tree(&[
        "root/terragrunt.hcl",
        "child1/terragrunt.hcl",
        "child2/terragrunt.hcl",
        "unrelated/terragrunt.hcl",
    ]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(root.join("child1"), unit_config(&["../root"]));
    parser.insert(root.join("child2"), unit_config(&["../child1"]));

    let filters = Filters::builder().dependents_of("**/root", None).unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .with_git_root(&root)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        sorted_relative(&components, &root),
        vec!["child1", "child2", "root"]
    );
}

#[tokio::test]
async fn dependents_outside_git_root_are_not_followed() {
    let (_guard, root) = tree(&[
        "work/root/terragrunt.hcl",
        "other/app/terragrunt.hcl",
    ]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(
        root.join("other/app"),
        unit_config(&["../../work/root"]),
    );

    let filters = Filters::builder().dependents_of("**/root", None).unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .with_git_root(root.join("work"))
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sorted_relative(&components, &root), vec!["work/root"]);
}

#[tokio::test]
async fn dependency_depth_is_bounded() {
    let (_guard, root) = tree(&[
        "a/terragrunt.hcl",
        "b/terragrunt.hcl",
        "c/terragrunt.hcl",
    ]);

    let parser = Arc::new(StaticParser::new());
    parser.insert(root.join("a"), unit_config(&["../b"]));
    parser.insert(root.join("b"), unit_config(&["../c"]));

    let filters = Filters::builder()
        .dependencies_of("**/a", Some(1))
        .unwrap()
        .build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sorted_relative(&components, &root), vec!["a", "b"]);
}

#[tokio::test]
async fn relationship_discovery_closes_over_transients() {
    let (_outside_guard, outside) = tree(&["shared/terragrunt.hcl"]);
    let (_guard, root) = tree(&["a/terragrunt.hcl"]);

    let shared = outside.join("shared");
    let parser = Arc::new(StaticParser::new());
    parser.insert(root.join("a"), unit_config(&[shared.to_str().unwrap()]));

    let components = Discovery::new(&root)
        .with_parser(parser)
        .with_discover_relationships(true)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    // Every edge target is itself in the set.
    for component in &components {
        for dep in component.dependencies() {
            assert!(
                components.iter().any(|c| c.path() == dep.path()),
                "edge target {} missing from set",
                dep.path().display()
            );
        }
    }
    let transient = components
        .iter()
        .find(|c| c.path() == shared.as_path())
        .expect("transient external in set");
    assert!(transient.is_external());
}

#[tokio::test]
async fn path_filters_select_subsets() {
    let (_guard, root) = tree(&[
        "apps/web/terragrunt.hcl",
        "apps/api/terragrunt.hcl",
        "libs/dns/terragrunt.hcl",
    ]);

    let filters = Filters::builder().path("apps/*").unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        sorted_relative(&components, &root),
        vec!["apps/api", "apps/web"]
    );

    let excludes = Filters::builder().exclude_path("**/dns").unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(excludes)
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        sorted_relative(&components, &root),
        vec!["apps/api", "apps/web"]
    );
}

#[tokio::test]
async fn reads_file_filter_requires_parse() {
    let (_guard, root) = tree(&["a/terragrunt.hcl", "b/terragrunt.hcl"]);

    let common = root.join("common.hcl");
    let parser = Arc::new(StaticParser::new());
    parser.insert_with_reads(root.join("a"), UnitConfig::default(), vec![common.clone()]);
    parser.insert(root.join("b"), UnitConfig::default());

    let filters = Filters::builder().reads_file(common).build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sorted_relative(&components, &root), vec!["a"]);
}

struct StaticWorktrees(Vec<PathBuf>);

impl WorktreeProvider for StaticWorktrees {
    fn roots(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

#[tokio::test]
async fn worktree_roots_are_walked_for_git_filters() {
    let (_wt_guard, wt_root) = tree(&["feature/terragrunt.hcl"]);
    let (_guard, root) = tree(&["main/terragrunt.hcl"]);

    let filters = Filters::builder()
        .path_in_git_ref("**", "feature-branch")
        .unwrap()
        .build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_worktrees(Arc::new(StaticWorktrees(vec![wt_root.clone()])))
        .discover(CancellationToken::new())
        .await
        .unwrap();

    let from_worktree = components
        .iter()
        .find(|c| c.path().starts_with(&wt_root))
        .expect("component from worktree root");
    assert!(from_worktree.is_external());
    assert!(components.iter().any(|c| c.path().starts_with(&root)));
}

#[tokio::test]
async fn worktree_relative_patterns_match_worktree_components() {
    let (_wt_guard, wt_root) = tree(&[
        "apps/web/terragrunt.hcl",
        "libs/dns/terragrunt.hcl",
    ]);
    let (_guard, root) = tree(&["main/terragrunt.hcl"]);

    // The pattern is relative to the worktree root, which lies outside
    // the working directory.
    let filters = Filters::builder()
        .path_in_git_ref("apps/*", "feature-branch")
        .unwrap()
        .build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_worktrees(Arc::new(StaticWorktrees(vec![wt_root.clone()])))
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(components.len(), 1);
    assert_eq!(components[0].path(), wt_root.join("apps/web").as_path());
    assert!(components[0].is_external());
}

#[tokio::test]
async fn parse_errors_abort_unless_suppressed() {
    let (_guard, root) = tree(&["a/terragrunt.hcl"]);

    let err = Discovery::new(&root)
        .with_parser(Arc::new(FailingParser))
        .with_requires_parse(true)
        .discover(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to parse"));

    let components = Discovery::new(&root)
        .with_parser(Arc::new(FailingParser))
        .with_requires_parse(true)
        .with_suppress_parse_errors(true)
        .discover(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].parse_state(), ParseState::ParseFailed);
}

#[tokio::test]
async fn canceled_context_short_circuits() {
    let (_guard, root) = tree(&["a/terragrunt.hcl"]);

    let token = CancellationToken::new();
    token.cancel();

    let err = Discovery::new(&root)
        .discover(token)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
}

#[tokio::test]
async fn discovery_is_idempotent_on_an_unchanged_tree() {
    let (_guard, root) = tree(&[
        "a/terragrunt.hcl",
        "b/terragrunt.hcl",
        "nested/deep/c/terragrunt.hcl",
    ]);

    let driver = Discovery::new(&root);
    let first = driver.discover(CancellationToken::new()).await.unwrap();
    let second = driver.discover(CancellationToken::new()).await.unwrap();

    assert_eq!(
        sorted_relative(&first, &root),
        sorted_relative(&second, &root)
    );
}

#[tokio::test]
async fn path_identity_holds_across_phases() {
    let (_guard, root) = tree(&["a/terragrunt.hcl", "b/terragrunt.hcl"]);

    let parser = Arc::new(StaticParser::new());
    // Both a and b point at b's directory through different spellings.
    parser.insert(root.join("a"), unit_config(&["../b", "../b/../b"]));

    let filters = Filters::builder().dependencies_of("**/a", None).unwrap().build();
    let components = Discovery::new(&root)
        .with_filters(filters)
        .with_parser(parser)
        .discover(CancellationToken::new())
        .await
        .unwrap();

    let mut paths: Vec<&Path> = components.iter().map(|c| c.path()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), components.len(), "duplicate canonical path");
}

#[tokio::test]
async fn custom_config_filenames_override_defaults() {
    let (_guard, root) = tree(&["a/custom.hcl", "b/terragrunt.hcl"]);

    let components = Discovery::new(&root)
        .with_config_filenames(["custom.hcl"])
        .discover(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sorted_relative(&components, &root), vec!["a"]);
}
