// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency ordering engine.
//!
//! Assigns every worker a unique start index from its `require`, `after`
//! and `before` lists (`tag:<t>` entries expand to every worker carrying
//! the tag). Start order is the index order; stop order is its reverse.

use crate::worker::WorkerName;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Ordering input for one worker.
#[derive(Debug, Clone)]
pub struct DepSpec {
    pub name: WorkerName,
    pub tags: Vec<String>,
    /// Names this worker needs online before it can start.
    pub require: Vec<String>,
    /// Names that must be started first but are not required online.
    pub after: Vec<String>,
    /// Names this worker must precede (reverse dependency).
    pub before: Vec<String>,
}

impl DepSpec {
    pub fn new(name: impl Into<WorkerName>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            require: Vec::new(),
            after: Vec::new(),
            before: Vec::new(),
        }
    }
}

/// A worker left unordered by a cyclic configuration, with the names
/// still blocking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedNode {
    pub name: WorkerName,
    pub blockers: Vec<WorkerName>,
}

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("dependency cycle, unresolved: {}", describe_unresolved(.0))]
    Cycle(Vec<UnresolvedNode>),
}

fn describe_unresolved(nodes: &[UnresolvedNode]) -> String {
    nodes
        .iter()
        .map(|n| {
            let blockers = n
                .blockers
                .iter()
                .map(WorkerName::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} (blocked by {})", n.name, blockers)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// A reference in a dependency list that names no known worker.
///
/// Such entries are dropped; the worker may still start. The caller is
/// expected to log these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDep {
    pub worker: WorkerName,
    pub reference: String,
}

/// Resolved dependency graph: the canonical start order plus the two
/// derived per-worker views the supervisor dispatch uses.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Worker names in start order; position is the start index.
    order: Vec<WorkerName>,
    index: HashMap<WorkerName, usize>,
    /// Subset of `require` that exists in the collection.
    required: HashMap<WorkerName, Vec<WorkerName>>,
    /// `require` plus `after` plus the reverse of `before`.
    prestarted: HashMap<WorkerName, Vec<WorkerName>>,
    /// References that named no known worker or tag.
    pub missing: Vec<MissingDep>,
}

impl DependencyGraph {
    /// Order the given workers, failing on any cycle.
    pub fn resolve(specs: &[DepSpec]) -> Result<Self, DependencyError> {
        let known: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        let mut by_tag: HashMap<&str, Vec<&WorkerName>> = HashMap::new();
        for spec in specs {
            for tag in &spec.tags {
                by_tag.entry(tag.as_str()).or_default().push(&spec.name);
            }
        }

        let mut missing = Vec::new();
        let mut expand = |owner: &WorkerName, list: &[String]| -> Vec<WorkerName> {
            let mut out: Vec<WorkerName> = Vec::new();
            for entry in list {
                if let Some(tag) = entry.strip_prefix("tag:") {
                    for name in by_tag.get(tag).into_iter().flatten() {
                        if *name != owner && !out.contains(*name) {
                            out.push((*name).clone());
                        }
                    }
                    continue;
                }
                if !known.contains(entry.as_str()) {
                    missing.push(MissingDep {
                        worker: owner.clone(),
                        reference: entry.clone(),
                    });
                    continue;
                }
                let name = WorkerName::new(entry.clone());
                if name != *owner && !out.contains(&name) {
                    out.push(name);
                }
            }
            out
        };

        let mut required = HashMap::new();
        let mut after_of = HashMap::new();
        let mut before_of = HashMap::new();
        for spec in specs {
            required.insert(spec.name.clone(), expand(&spec.name, &spec.require));
            after_of.insert(spec.name.clone(), expand(&spec.name, &spec.after));
            before_of.insert(spec.name.clone(), expand(&spec.name, &spec.before));
        }

        // prestarted(W) = require(W) + after(W) + {X | W lists X in before}
        let mut prestarted: HashMap<WorkerName, Vec<WorkerName>> = specs
            .iter()
            .map(|spec| {
                let mut deps = required[&spec.name].clone();
                for name in &after_of[&spec.name] {
                    if !deps.contains(name) {
                        deps.push(name.clone());
                    }
                }
                (spec.name.clone(), deps)
            })
            .collect();
        for spec in specs {
            for target in &before_of[&spec.name] {
                let deps = prestarted.entry(target.clone()).or_default();
                if !deps.contains(&spec.name) {
                    deps.push(spec.name.clone());
                }
            }
        }

        // Edge X -> W for each X in require(W) or after(W); edge W -> Y for
        // each Y in before(W).
        // prestarted already holds exactly the incoming-edge sources per node.
        let blockers: HashMap<&WorkerName, Vec<WorkerName>> = specs
            .iter()
            .map(|spec| (&spec.name, prestarted[&spec.name].clone()))
            .collect();

        let mut order: Vec<WorkerName> = Vec::with_capacity(specs.len());
        let mut assigned: HashSet<WorkerName> = HashSet::new();
        while assigned.len() < specs.len() {
            let next = specs.iter().find(|spec| {
                !assigned.contains(&spec.name)
                    && blockers[&spec.name].iter().all(|b| assigned.contains(b))
            });
            match next {
                Some(spec) => {
                    assigned.insert(spec.name.clone());
                    order.push(spec.name.clone());
                }
                None => {
                    let unresolved = specs
                        .iter()
                        .filter(|spec| !assigned.contains(&spec.name))
                        .map(|spec| UnresolvedNode {
                            name: spec.name.clone(),
                            blockers: blockers[&spec.name]
                                .iter()
                                .filter(|b| !assigned.contains(*b))
                                .cloned()
                                .collect(),
                        })
                        .collect();
                    return Err(DependencyError::Cycle(unresolved));
                }
            }
        }

        let index = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self {
            order,
            index,
            required,
            prestarted,
            missing,
        })
    }

    /// Names in canonical start order.
    pub fn start_order(&self) -> &[WorkerName] {
        &self.order
    }

    pub fn start_index(&self, name: &WorkerName) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// The subset of the worker's `require` list that exists.
    pub fn required_workers(&self, name: &WorkerName) -> &[WorkerName] {
        self.required.get(name).map_or(&[], Vec::as_slice)
    }

    /// Everything that must be started before this worker.
    pub fn prestarted_workers(&self, name: &WorkerName) -> &[WorkerName] {
        self.prestarted.get(name).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
#[path = "deps_tests.rs"]
mod tests;
