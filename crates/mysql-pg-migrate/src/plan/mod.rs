//! Dependency ordering of tables by foreign key references.
//!
//! Parents come before children so tables can be created and filled in
//! order. Foreign keys are added in the reverse of the same order.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::warn;

use crate::core::ForeignKeyEdge;

/// Parent to children adjacency over the source table names.
///
/// Self-references are never stored, so a table cannot block on itself.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    children: HashMap<String, Vec<String>>,
    in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph from the table list and foreign key edges.
    ///
    /// Duplicate table names and duplicate child/parent pairs collapse.
    /// Edges naming tables outside the list are ignored.
    pub fn build(tables: &[String], edges: &[ForeignKeyEdge]) -> Self {
        let mut graph = DependencyGraph::default();

        for table in tables {
            if graph.in_degree.contains_key(table) {
                continue;
            }
            graph.nodes.push(table.clone());
            graph.in_degree.insert(table.clone(), 0);
            graph.children.insert(table.clone(), Vec::new());
        }

        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for edge in edges {
            let (child, parent) = (edge.child_table.as_str(), edge.parent_table.as_str());
            if child == parent {
                continue;
            }
            if !graph.in_degree.contains_key(child) || !graph.in_degree.contains_key(parent) {
                continue;
            }
            if !seen.insert((child, parent)) {
                continue;
            }
            if let Some(children) = graph.children.get_mut(parent) {
                children.push(child.to_string());
            }
            if let Some(degree) = graph.in_degree.get_mut(child) {
                *degree += 1;
            }
        }

        graph
    }

    /// Tables in listing order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Number of distinct child to parent edges.
    pub fn edge_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    /// Parents of a table.
    pub fn parents_of(&self, table: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|p| {
                self.children
                    .get(p.as_str())
                    .is_some_and(|c| c.iter().any(|c| c == table))
            })
            .map(String::as_str)
            .collect()
    }

    /// Topologically order the tables (Kahn's algorithm, FIFO queue).
    ///
    /// Tables left over because of a cycle are appended in listing order.
    pub fn resolve(&self) -> MigrationPlan {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .filter(|t| in_degree.get(t.as_str()) == Some(&0))
            .map(String::as_str)
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while let Some(table) = queue.pop_front() {
            order.push(table.to_string());
            placed.insert(table);

            for child in self.children.get(table).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        let cycle_members: Vec<String> = self
            .nodes
            .iter()
            .filter(|t| !placed.contains(t.as_str()))
            .cloned()
            .collect();

        if !cycle_members.is_empty() {
            warn!(
                "Circular foreign key dependencies among {:?}; appending them in listing order",
                cycle_members
            );
            order.extend(cycle_members.iter().cloned());
        }

        MigrationPlan {
            order,
            cycle_members,
        }
    }
}

/// Total order of tables for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Creation order; foreign keys use the reverse.
    pub order: Vec<String>,
    /// Tables that could not be ordered because of a cycle.
    pub cycle_members: Vec<String>,
}

impl MigrationPlan {
    /// Whether some tables were appended without a valid ordering.
    pub fn has_cycles(&self) -> bool {
        !self.cycle_members.is_empty()
    }

    /// Number of tables in the plan.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the plan has no tables.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Build the graph and resolve it in one step.
pub fn resolve(tables: &[String], edges: &[ForeignKeyEdge]) -> MigrationPlan {
    DependencyGraph::build(tables, edges).resolve()
}
