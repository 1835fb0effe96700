//! Target dependency graph.
//!
//! Nodes are declaration indices into the project. An edge `a -> b` means
//! "a depends on b", so b must be built first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::project::Project;
use crate::core::target::Target;
use crate::util::errors::MixDownError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Build-before relation over a project's targets.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
    names: Vec<String>,
}

impl DependencyGraph {
    /// Graph of the dependencies written in the project file.
    pub fn declared(project: &Project) -> Result<Self, MixDownError> {
        Self::from_project(project, |t| t.declared_dependencies().to_vec())
    }

    /// Graph of declared plus discovered dependencies.
    pub fn discovered(project: &Project) -> Result<Self, MixDownError> {
        Self::from_project(project, Target::dependency_names)
    }

    fn from_project<F>(project: &Project, deps_of: F) -> Result<Self, MixDownError>
    where
        F: Fn(&Target) -> Vec<String>,
    {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..project.len()).map(|i| graph.add_node(i)).collect();

        for (i, target) in project.targets().iter().enumerate() {
            for dep in deps_of(target) {
                let j = project.index_of(&dep).ok_or_else(|| {
                    MixDownError::UnresolvedDependency {
                        target: target.name().to_string(),
                        dependency: dep.clone(),
                    }
                })?;
                if !graph.contains_edge(nodes[i], nodes[j]) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        Ok(DependencyGraph {
            graph,
            nodes,
            names: project.targets().iter().map(|t| t.name().to_string()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Direct dependencies of `index`, in declaration order.
    pub fn dependencies(&self, index: usize) -> Vec<usize> {
        self.neighbors(index, Direction::Outgoing)
    }

    /// Targets that depend directly on `index`, in declaration order.
    pub fn dependents(&self, index: usize) -> Vec<usize> {
        self.neighbors(index, Direction::Incoming)
    }

    /// Everything that depends on `index`, directly or not, in declaration
    /// order.
    pub fn transitive_dependents(&self, index: usize) -> Vec<usize> {
        let mut visited = HashSet::new();
        let mut stack = vec![index];

        while let Some(current) = stack.pop() {
            for dependent in self.dependents(current) {
                if visited.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }

        visited.remove(&index);
        let mut result: Vec<usize> = visited.into_iter().collect();
        result.sort_unstable();
        result
    }

    fn neighbors(&self, index: usize, dir: Direction) -> Vec<usize> {
        let mut result: Vec<usize> = self
            .graph
            .neighbors_directed(self.nodes[index], dir)
            .map(|n| self.graph[n])
            .collect();
        result.sort_unstable();
        result
    }

    /// Fail with the participants of the first cycle found.
    ///
    /// Depth-first search from each target in declaration order; reaching a
    /// target that is still on the stack closes a cycle.
    pub fn check_acyclic(&self) -> Result<(), MixDownError> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut stack = Vec::new();

        for start in 0..self.len() {
            if marks[start] == Mark::Unvisited {
                if let Some(cycle) = self.visit(start, &mut marks, &mut stack) {
                    return Err(MixDownError::DependencyCycle {
                        cycle: cycle.into_iter().map(|i| self.names[i].clone()).collect(),
                    });
                }
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        index: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[index] = Mark::InProgress;
        stack.push(index);

        for dep in self.dependencies(index) {
            match marks[dep] {
                Mark::InProgress => {
                    let start = stack.iter().position(|&i| i == dep).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(dep, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[index] = Mark::Done;
        None
    }

    /// Dependencies before dependents; among targets free to go next, the
    /// one declared first goes first.
    pub fn build_order(&self) -> Result<Vec<usize>, MixDownError> {
        self.check_acyclic()?;

        let mut pending: Vec<usize> = (0..self.len())
            .map(|i| self.dependencies(i).len())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(next)) = ready.pop() {
            order.push(next);
            for dependent in self.dependents(next) {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
        Ok(order)
    }

    /// Names in build order.
    pub fn build_order_names(&self) -> Result<Vec<String>, MixDownError> {
        Ok(self
            .build_order()?
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect())
    }
}
