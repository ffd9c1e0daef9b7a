//! The import relation between schemas as an incrementally built acyclic graph.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::algo::{astar, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::names::SchemaIdentifier;

/// An edge insertion that was refused because it would have closed a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleRejected {
    /// Shortest existing path from the rejected edge's target back to its source.
    pub path: Vec<SchemaIdentifier>,
}

/// A directed acyclic graph over schema identifiers; an edge `a -> b` means `a` imports `b`.
#[derive(Clone, Default)]
pub struct ImportGraph {
    graph: StableDiGraph<SchemaIdentifier, ()>,
    vertices: HashMap<SchemaIdentifier, NodeIndex>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &SchemaIdentifier) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn contains_edge(&self, from: &SchemaIdentifier, to: &SchemaIdentifier) -> bool {
        match (self.vertices.get(from), self.vertices.get(to)) {
            (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
            _ => false,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Adds a vertex if it is not yet present. Returns whether it was added.
    pub fn add_vertex(&mut self, id: &SchemaIdentifier) -> bool {
        if self.vertices.contains_key(id) {
            return false;
        }
        let index = self.graph.add_node(id.clone());
        self.vertices.insert(id.clone(), index);
        true
    }

    /// Adds both vertices (if absent) and the edge `from -> to`. If the edge would close a cycle
    /// nothing is changed: vertices added by this call are removed again.
    pub fn add_edge(
        &mut self,
        from: &SchemaIdentifier,
        to: &SchemaIdentifier,
    ) -> Result<(), CycleRejected> {
        let from_added = self.add_vertex(from);
        let to_added = self.add_vertex(to);
        let from_index = self.vertices[from];
        let to_index = self.vertices[to];

        if let Some(path) = self.shortest_path_between(to_index, from_index) {
            if from_added {
                self.remove_vertex(from);
            }
            if to_added {
                self.remove_vertex(to);
            }
            return Err(CycleRejected { path });
        }

        self.graph.update_edge(from_index, to_index, ());
        Ok(())
    }

    fn remove_vertex(&mut self, id: &SchemaIdentifier) {
        if let Some(index) = self.vertices.remove(id) {
            self.graph.remove_node(index);
        }
    }

    fn shortest_path_between(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<SchemaIdentifier>> {
        let (_, path) = astar(&self.graph, from, |n| n == to, |_| 1usize, |_| 0)?;
        Some(path.into_iter().map(|n| self.graph[n].clone()).collect())
    }

    /// Shortest path from `from` to `to`, both included.
    pub fn shortest_path(
        &self,
        from: &SchemaIdentifier,
        to: &SchemaIdentifier,
    ) -> Option<Vec<SchemaIdentifier>> {
        self.shortest_path_between(*self.vertices.get(from)?, *self.vertices.get(to)?)
    }

    /// The schemas directly imported by `id`, sorted.
    pub fn imports_of(&self, id: &SchemaIdentifier) -> Vec<&SchemaIdentifier> {
        let Some(&index) = self.vertices.get(id) else {
            return Vec::new();
        };
        let mut imports: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|n| &self.graph[n])
            .collect();
        imports.sort();
        imports
    }

    pub fn vertices(&self) -> BTreeSet<&SchemaIdentifier> {
        self.vertices.keys().collect()
    }

    pub fn edges(&self) -> BTreeSet<(&SchemaIdentifier, &SchemaIdentifier)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (&self.graph[a], &self.graph[b]))
            .collect()
    }

    /// All vertices ordered so that every schema comes after the schemas it imports.
    pub fn dependency_order(&self) -> Vec<SchemaIdentifier> {
        // Edge insertion keeps the graph acyclic, so sorting cannot fail.
        let mut order: Vec<_> = toposort(&self.graph, None)
            .unwrap_or_default()
            .into_iter()
            .map(|n| self.graph[n].clone())
            .collect();
        order.reverse();
        order
    }
}

impl PartialEq for ImportGraph {
    fn eq(&self, other: &Self) -> bool {
        self.vertices() == other.vertices() && self.edges() == other.edges()
    }
}

impl Eq for ImportGraph {}

impl fmt::Debug for ImportGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportGraph")
            .field("vertices", &self.vertices())
            .field("edges", &self.edges())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SchemaIdentifier {
        s.parse().unwrap()
    }

    #[test]
    fn closing_a_cycle_leaves_the_graph_unchanged() {
        let mut graph = ImportGraph::new();
        graph.add_edge(&id("A:1.0"), &id("B:1.0")).unwrap();
        graph.add_edge(&id("B:1.0"), &id("C:1.0")).unwrap();
        let before = graph.clone();

        let rejected = graph.add_edge(&id("C:1.0"), &id("A:1.0")).unwrap_err();
        assert_eq!(rejected.path, vec![id("A:1.0"), id("B:1.0"), id("C:1.0")]);
        assert_eq!(graph, before);

        graph.add_edge(&id("A:1.0"), &id("C:1.0")).unwrap();
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn self_import_is_a_cycle() {
        let mut graph = ImportGraph::new();
        let rejected = graph.add_edge(&id("A:1.0"), &id("A:1.0")).unwrap_err();
        assert_eq!(rejected.path, vec![id("A:1.0")]);
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn rejection_removes_only_new_vertices() {
        let mut graph = ImportGraph::new();
        graph.add_edge(&id("A:1.0"), &id("B:1.0")).unwrap();
        graph.add_vertex(&id("Z:1.0"));
        assert!(graph.add_edge(&id("B:1.0"), &id("A:1.0")).is_err());
        assert_eq!(graph.vertex_count(), 3);
        assert!(graph.contains(&id("Z:1.0")));
        assert!(!graph.contains_edge(&id("B:1.0"), &id("A:1.0")));
    }

    #[test]
    fn reports_the_shortest_path() {
        let mut graph = ImportGraph::new();
        graph.add_edge(&id("A:1.0"), &id("B:1.0")).unwrap();
        graph.add_edge(&id("B:1.0"), &id("C:1.0")).unwrap();
        graph.add_edge(&id("C:1.0"), &id("D:1.0")).unwrap();
        graph.add_edge(&id("A:1.0"), &id("D:1.0")).unwrap();

        let rejected = graph.add_edge(&id("D:1.0"), &id("A:1.0")).unwrap_err();
        assert_eq!(rejected.path, vec![id("A:1.0"), id("D:1.0")]);
    }

    #[test]
    fn versions_are_distinct_vertices() {
        let mut graph = ImportGraph::new();
        graph.add_edge(&id("A:1.0"), &id("A:2.0")).unwrap();
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn dependency_order_puts_imports_first() {
        let mut graph = ImportGraph::new();
        graph.add_edge(&id("A:1.0"), &id("B:1.0")).unwrap();
        graph.add_edge(&id("B:1.0"), &id("C:1.0")).unwrap();
        let order = graph.dependency_order();
        let position = |s: &str| order.iter().position(|i| i == &id(s)).unwrap();
        assert!(position("C:1.0") < position("B:1.0"));
        assert!(position("B:1.0") < position("A:1.0"));
    }
}
