use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::BTreeSet;

/// A directed graph over dense layer indices recording which layers may
/// constrain which. An edge A → B exists when any trait in A carries a ruler
/// rule targeting B.
///
/// Rule attachment is asymmetric but the semantic collision is symmetric, so
/// the graph also keeps an undirected adjacency view: AC-3 arcs are seeded
/// in both directions.
pub struct ConstraintGraph {
    pub graph: DiGraph<usize, ()>,
    node_indices: Vec<NodeIndex>,
    adjacency: Vec<BTreeSet<usize>>,
}

impl ConstraintGraph {
    /// Build from the directed (source layer, target layer) pairs implied by
    /// compiled ruler rules.
    pub fn build(layer_count: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = Vec::with_capacity(layer_count);
        for layer in 0..layer_count {
            node_indices.push(graph.add_node(layer));
        }

        let mut adjacency = vec![BTreeSet::new(); layer_count];
        for (from, to) in edges {
            if from == to {
                continue;
            }
            if !graph.contains_edge(node_indices[from], node_indices[to]) {
                graph.add_edge(node_indices[from], node_indices[to], ());
            }
            adjacency[from].insert(to);
            adjacency[to].insert(from);
        }

        Self {
            graph,
            node_indices,
            adjacency,
        }
    }

    /// Layers adjacent to `layer` in either direction.
    pub fn neighbors(&self, layer: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[layer].iter().copied()
    }

    /// Undirected constraint degree, used as a variable-ordering tie-break.
    pub fn degree(&self, layer: usize) -> usize {
        self.adjacency[layer].len()
    }

    /// Whether `layer` participates in any constraint.
    pub fn is_constrained(&self, layer: usize) -> bool {
        !self.adjacency[layer].is_empty()
    }

    pub fn layer_count(&self) -> usize {
        self.node_indices.len()
    }

    /// Number of directed constraint edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
