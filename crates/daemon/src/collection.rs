// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of known workers plus their resolved start order.

use crate::error::ProcmanError;
use procman_core::{DepSpec, DependencyGraph, Worker, WorkerName};
use std::collections::HashMap;

#[derive(Default)]
pub struct WorkerCollection {
    workers: HashMap<WorkerName, Worker>,
    graph: DependencyGraph,
}

impl WorkerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. Double registration is an error.
    pub fn insert(&mut self, worker: Worker) -> Result<(), ProcmanError> {
        if self.workers.contains_key(&worker.name) {
            return Err(ProcmanError::AlreadyRegistered(worker.name));
        }
        self.workers.insert(worker.name.clone(), worker);
        Ok(())
    }

    pub fn get(&self, name: &WorkerName) -> Option<&Worker> {
        self.workers.get(name)
    }

    pub fn get_mut(&mut self, name: &WorkerName) -> Option<&mut Worker> {
        self.workers.get_mut(name)
    }

    pub fn require(&self, name: &WorkerName) -> Result<&Worker, ProcmanError> {
        self.workers
            .get(name)
            .ok_or_else(|| ProcmanError::UnknownWorker(name.clone()))
    }

    pub fn contains(&self, name: &WorkerName) -> bool {
        self.workers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.values_mut()
    }

    /// Run the dependency engine and stamp each worker's start index.
    ///
    /// Cyclic configurations fail startup; references to unknown names are
    /// logged and dropped.
    pub fn resolve_order(&mut self) -> Result<(), ProcmanError> {
        let mut specs: Vec<DepSpec> = self
            .workers
            .values()
            .map(|w| DepSpec {
                name: w.name.clone(),
                tags: w.tags.clone(),
                require: w.require.clone(),
                after: w.after.clone(),
                before: w.before.clone(),
            })
            .collect();
        // Registration order is a HashMap artifact; make tie-breaking stable.
        specs.sort_by(|a, b| a.name.cmp(&b.name));

        let graph = DependencyGraph::resolve(&specs)?;
        for missing in &graph.missing {
            tracing::warn!(
                worker = %missing.worker,
                reference = %missing.reference,
                "dependency references unknown worker, ignoring"
            );
        }
        for worker in self.workers.values_mut() {
            worker.start_index = graph.start_index(&worker.name);
        }
        self.graph = graph;
        Ok(())
    }

    /// Names in canonical start order.
    pub fn start_order(&self) -> Vec<WorkerName> {
        let mut names: Vec<&Worker> = self.workers.values().collect();
        names.sort_by_key(|w| (w.start_index.unwrap_or(usize::MAX), w.name.clone()));
        names.into_iter().map(|w| w.name.clone()).collect()
    }

    /// The existing subset of the worker's `require` list.
    pub fn required_workers(&self, name: &WorkerName) -> &[WorkerName] {
        self.graph.required_workers(name)
    }

    /// Everything that must be started before this worker.
    pub fn prestarted_workers(&self, name: &WorkerName) -> &[WorkerName] {
        self.graph.prestarted_workers(name)
    }

    /// Workers whose `require` list (after expansion) contains `name`.
    pub fn dependents_of(&self, name: &WorkerName) -> Vec<WorkerName> {
        self.workers
            .keys()
            .filter(|candidate| self.graph.required_workers(candidate).contains(name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "collection_tests.rs"]
mod tests;
