// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the dependency ordering engine

use super::*;

fn spec(name: &str) -> DepSpec {
    DepSpec::new(name)
}

fn names(list: &[WorkerName]) -> Vec<&str> {
    list.iter().map(WorkerName::as_str).collect()
}

#[test]
fn independent_workers_keep_registration_order() {
    let graph =
        DependencyGraph::resolve(&[spec("a"), spec("b"), spec("c")]).unwrap();
    assert_eq!(names(graph.start_order()), ["a", "b", "c"]);
}

#[test]
fn require_and_after_order_dependencies_first() {
    let mut b = spec("b");
    b.require = vec!["a".to_string()];
    let mut c = spec("c");
    c.after = vec!["b".to_string()];

    // Registration order deliberately reversed
    let graph = DependencyGraph::resolve(&[c, b, spec("a")]).unwrap();
    assert_eq!(names(graph.start_order()), ["a", "b", "c"]);
}

#[test]
fn start_indices_are_unique_and_total() {
    let mut b = spec("b");
    b.require = vec!["a".to_string()];
    let mut d = spec("d");
    d.after = vec!["b".to_string(), "c".to_string()];

    let graph = DependencyGraph::resolve(&[spec("a"), b, spec("c"), d]).unwrap();
    let mut indices: Vec<usize> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| graph.start_index(&WorkerName::new(*n)).unwrap())
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, [0, 1, 2, 3]);
}

#[test]
fn before_is_stored_as_reverse_dependency() {
    let mut logger = spec("logger");
    logger.before = vec!["web".to_string()];

    let graph = DependencyGraph::resolve(&[spec("web"), logger]).unwrap();
    assert_eq!(names(graph.start_order()), ["logger", "web"]);
    assert_eq!(
        names(graph.prestarted_workers(&WorkerName::new("web"))),
        ["logger"]
    );
}

#[test]
fn tags_expand_to_every_tagged_worker() {
    let mut storage1 = spec("storage1");
    storage1.tags = vec!["storage".to_string()];
    let mut storage2 = spec("storage2");
    storage2.tags = vec!["storage".to_string()];
    let mut web = spec("web");
    web.require = vec!["tag:storage".to_string()];

    let graph = DependencyGraph::resolve(&[web, storage1, storage2]).unwrap();
    assert_eq!(
        names(graph.required_workers(&WorkerName::new("web"))),
        ["storage1", "storage2"]
    );
    assert_eq!(names(graph.start_order()), ["storage1", "storage2", "web"]);
}

#[test]
fn unknown_references_are_dropped_and_reported() {
    let mut web = spec("web");
    web.require = vec!["ghost".to_string()];

    let graph = DependencyGraph::resolve(&[web]).unwrap();
    assert!(graph
        .required_workers(&WorkerName::new("web"))
        .is_empty());
    assert_eq!(graph.missing.len(), 1);
    assert_eq!(graph.missing[0].worker, "web");
    assert_eq!(graph.missing[0].reference, "ghost");
    // The worker itself is still ordered
    assert_eq!(graph.start_index(&WorkerName::new("web")), Some(0));
}

#[test]
fn cycle_reports_every_unresolved_node_with_blockers() {
    let mut a = spec("a");
    a.require = vec!["b".to_string()];
    let mut b = spec("b");
    b.after = vec!["a".to_string()];
    let mut c = spec("c");
    c.require = vec!["a".to_string()];

    let err = DependencyGraph::resolve(&[a, b, c]).unwrap_err();
    let DependencyError::Cycle(unresolved) = err;
    let mut cycle_names: Vec<&str> = unresolved.iter().map(|n| n.name.as_str()).collect();
    cycle_names.sort_unstable();
    assert_eq!(cycle_names, ["a", "b", "c"]);

    let node_a = unresolved.iter().find(|n| n.name == "a").unwrap();
    assert_eq!(names(&node_a.blockers), ["b"]);
}

#[test]
fn required_view_excludes_after_and_before() {
    let mut c = spec("c");
    c.require = vec!["a".to_string()];
    c.after = vec!["b".to_string()];

    let graph = DependencyGraph::resolve(&[spec("a"), spec("b"), c]).unwrap();
    let name = WorkerName::new("c");
    assert_eq!(names(graph.required_workers(&name)), ["a"]);
    assert_eq!(names(graph.prestarted_workers(&name)), ["a", "b"]);
}

#[test]
fn self_references_are_ignored() {
    let mut a = spec("a");
    a.tags = vec!["solo".to_string()];
    a.require = vec!["tag:solo".to_string()];

    let graph = DependencyGraph::resolve(&[a]).unwrap();
    assert!(graph.required_workers(&WorkerName::new("a")).is_empty());
}
