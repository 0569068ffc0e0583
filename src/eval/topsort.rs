//! Topological ordering of the term dependency graph (Kahn's algorithm).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::InterpreterError;

/// Directed graph keyed by name; an edge `a -> b` means `a` must come before `b`.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        self.edges.entry(node.into()).or_default();
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let to = to.into();
        self.add_node(to.clone());
        self.edges.entry(from.into()).or_default().insert(to);
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Every node, each after all of its predecessors. Among nodes that are
    /// ready at the same time the smallest key goes first.
    pub fn topsort(&self) -> Result<Vec<String>, InterpreterError> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.edges.keys().map(|k| (k.as_str(), 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for target in self.edges.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(target.as_str());
                    }
                }
            }
        }

        if order.len() != self.edges.len() {
            let nodes = in_degree
                .into_iter()
                .filter(|(_, d)| *d > 0)
                .map(|(k, _)| k.to_string())
                .collect();
            return Err(InterpreterError::DependencyCycle { nodes });
        }
        Ok(order)
    }
}
