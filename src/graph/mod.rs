use petgraph::graphmap::UnGraphMap;

use crate::coverage::{for_each_pair, TuplePair};
use crate::preprocessor::{literal, Literal};

/// Undirected graph on signed concrete-feature literals whose edges are the
/// literal pairs observed together in some feasible configuration.
///
/// Built once from the initial sample, read-mostly afterwards. The only
/// mutation after construction is edge pruning by the CDS engine when a pair
/// is proven infeasible.
#[derive(Debug, Clone)]
pub struct TransactionGraph {
    n_concrete: usize,
    graph: UnGraphMap<Literal, ()>,
}

impl TransactionGraph {
    pub fn new(n_concrete: usize) -> Self {
        let mut graph = UnGraphMap::new();
        for feature in 0..n_concrete {
            graph.add_node(literal(feature, true));
            graph.add_node(literal(feature, false));
        }
        Self { n_concrete, graph }
    }

    pub fn n_concrete(&self) -> usize {
        self.n_concrete
    }

    /// Add all pairwise edges induced by a feasible configuration.
    pub fn add_valid_configuration(&mut self, config: &[bool]) {
        debug_assert!(config.len() >= self.n_concrete);
        for_each_pair(config, self.n_concrete, |pair| {
            self.graph.add_edge(pair.a(), pair.b(), ());
        });
    }

    /// Whether the two literals were ever observed together. Identical
    /// literals trivially share a configuration; opposite literals of the
    /// same feature never do.
    pub fn has_edge(&self, a: Literal, b: Literal) -> bool {
        if a == b {
            return true;
        }
        self.graph.contains_edge(a, b)
    }

    pub fn contains_pair(&self, pair: &TuplePair) -> bool {
        self.graph.contains_edge(pair.a(), pair.b())
    }

    pub fn neighbors(&self, v: Literal) -> impl Iterator<Item = Literal> + '_ {
        self.graph.neighbors(v)
    }

    pub fn degree(&self, v: Literal) -> usize {
        self.graph.neighbors(v).count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> impl Iterator<Item = TuplePair> + '_ {
        self.graph.all_edges().map(|(a, b, _)| TuplePair::new(a, b))
    }

    /// Remove a pair proven infeasible. Returns whether the edge existed.
    pub fn remove_pair(&mut self, pair: &TuplePair) -> bool {
        self.graph.remove_edge(pair.a(), pair.b()).is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn configurations_induce_edges() {
        let mut graph = TransactionGraph::new(3);
        graph.add_valid_configuration(&[true, false, true]);
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.has_edge(literal(0, true), literal(1, false)));
        assert!(graph.has_edge(literal(0, true), literal(2, true)));
        assert!(!graph.has_edge(literal(0, true), literal(1, true)));
    }

    #[test]
    fn parallel_edges_are_not_stored() {
        let mut graph = TransactionGraph::new(2);
        graph.add_valid_configuration(&[true, true]);
        graph.add_valid_configuration(&[true, true]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn same_literal_counts_as_shared() {
        let graph = TransactionGraph::new(2);
        assert!(graph.has_edge(literal(0, true), literal(0, true)));
        assert!(!graph.has_edge(literal(0, true), literal(0, false)));
    }

    #[test]
    fn pruning_removes_the_edge() {
        let mut graph = TransactionGraph::new(2);
        graph.add_valid_configuration(&[true, true]);
        let pair = TuplePair::new(literal(0, true), literal(1, true));
        assert!(graph.remove_pair(&pair));
        assert!(!graph.contains_pair(&pair));
        assert!(!graph.remove_pair(&pair));
    }
}
