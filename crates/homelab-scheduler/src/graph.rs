//! Step dependency graph

use homelab_core::{LabError, LabResult};
use rustworkx_core::dag_algo::lexicographical_topological_sort;
use rustworkx_core::petgraph::graph::{DiGraph, NodeIndex};
use rustworkx_core::petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use crate::step::Step;

/// Directed acyclic graph of steps; an edge `a -> b` means `b` depends on `a`
#[derive(Default)]
pub struct StepGraph {
    graph: DiGraph<Arc<dyn Step>, ()>,
    id_to_index: HashMap<String, NodeIndex>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with no dependencies
    pub fn add_step(&mut self, step: Arc<dyn Step>) -> LabResult<()> {
        let id = step.id().to_string();
        if self.id_to_index.contains_key(&id) {
            return Err(LabError::Graph(format!("duplicate step '{}'", id)));
        }
        let index = self.graph.add_node(step);
        self.id_to_index.insert(id, index);
        Ok(())
    }

    /// Declare that `step` must run after `dependency`
    pub fn add_dependency(&mut self, step: &str, dependency: &str) -> LabResult<()> {
        if step == dependency {
            return Err(LabError::Graph(format!("step '{}' depends on itself", step)));
        }
        let to = self.index_of(step)?;
        let from = self.index_of(dependency)?;
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
        Ok(())
    }

    /// Add a step that runs after every step in `dependencies`
    pub fn add_step_after(&mut self, step: Arc<dyn Step>, dependencies: &[&str]) -> LabResult<()> {
        for dependency in dependencies {
            self.index_of(dependency)?;
        }
        let id = step.id().to_string();
        self.add_step(step)?;
        for dependency in dependencies {
            self.add_dependency(&id, dependency)?;
        }
        Ok(())
    }

    fn index_of(&self, id: &str) -> LabResult<NodeIndex> {
        self.id_to_index
            .get(id)
            .copied()
            .ok_or_else(|| LabError::Graph(format!("unknown step '{}'", id)))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Step>> {
        self.id_to_index
            .get(id)
            .map(|index| self.graph[*index].clone())
    }

    /// Direct dependencies of `id`, in declaration order
    pub fn dependencies(&self, id: &str) -> LabResult<Vec<String>> {
        let index = self.index_of(id)?;
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .collect();
        deps.sort();
        Ok(deps
            .into_iter()
            .map(|dep| self.graph[dep].id().to_string())
            .collect())
    }

    /// Topological order; ties resolve in declaration order
    pub fn execution_order(&self) -> LabResult<Vec<Arc<dyn Step>>> {
        let sorted = lexicographical_topological_sort(
            &self.graph,
            |index| Ok::<_, Infallible>(index),
            false,
            None,
        )
        .map_err(|e| LabError::Graph(format!("cannot order steps: {}", e)))?;

        // Steps on a cycle never reach in-degree zero and are left out
        if sorted.len() != self.graph.node_count() {
            let placed: HashSet<NodeIndex> = sorted.iter().copied().collect();
            let names: Vec<&str> = self
                .graph
                .node_indices()
                .filter(|index| !placed.contains(index))
                .map(|index| self.graph[index].id())
                .collect();
            return Err(LabError::Graph(format!(
                "dependency cycle among steps: {}",
                names.join(", ")
            )));
        }

        Ok(sorted
            .into_iter()
            .map(|index| self.graph[index].clone())
            .collect())
    }

    /// Step ids in execution order
    pub fn order(&self) -> LabResult<Vec<String>> {
        Ok(self
            .execution_order()?
            .iter()
            .map(|step| step.id().to_string())
            .collect())
    }
}
