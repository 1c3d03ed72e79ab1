use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand_pcg::Pcg64Mcg;

use crate::coverage::TuplePair;
use crate::graph::TransactionGraph;
use crate::utils::Timer;

/// Necessary condition for two tuples to share a configuration: every cross
/// pair of their literals must be an edge of the transaction graph. A missing
/// cross pair therefore proves independence outright, since the graph carries
/// every feasible pair of the instance.
pub fn cross_pairs_all_present(graph: &TransactionGraph, e1: &TuplePair, e2: &TuplePair) -> bool {
    graph.has_edge(e1.a(), e2.a())
        && graph.has_edge(e1.a(), e2.b())
        && graph.has_edge(e1.b(), e2.a())
        && graph.has_edge(e1.b(), e2.b())
}

/// Greedy constructor for an independent tuple set.
///
/// The sorting is what makes this work at all: tuples that are rarely covered
/// in the initial sample are the hard ones and go first. The shuffle before
/// the stable sort varies the tie order between runs with different seeds.
pub struct GreedyCds<'a> {
    graph: &'a TransactionGraph,
    coverage_count: &'a HashMap<TuplePair, usize>,
}

impl<'a> GreedyCds<'a> {
    pub fn new(
        graph: &'a TransactionGraph,
        coverage_count: &'a HashMap<TuplePair, usize>,
    ) -> Self {
        Self {
            graph,
            coverage_count,
        }
    }

    /// Walk the candidates in expected-difficulty order and keep every tuple
    /// whose independence from all kept tuples is proven by the cross-pair
    /// test. Stops early at `ub` tuples or when the budget runs dry.
    pub fn build(
        &self,
        candidates: &[TuplePair],
        rng: &mut Pcg64Mcg,
        ub: usize,
        timer: &Timer,
    ) -> Vec<TuplePair> {
        let mut sorted: Vec<TuplePair> = candidates.to_vec();
        sorted.shuffle(rng);
        sorted.sort_by_key(|t| self.coverage_count.get(t).copied().unwrap_or(0));

        let mut independent: Vec<TuplePair> = Vec::new();
        for (index, tuple) in sorted.iter().enumerate() {
            if independent.len() >= ub {
                break;
            }
            if index % 64 == 0 && timer.is_out_of_time() {
                break;
            }
            let conflicts = independent
                .iter()
                .any(|kept| cross_pairs_all_present(self.graph, tuple, kept));
            if !conflicts {
                independent.push(*tuple);
            }
        }
        independent
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::coverage::{for_each_pair, TuplePair};
    use crate::preprocessor::literal;
    use rand::SeedableRng;

    fn counts(sample: &[Vec<bool>], n: usize) -> HashMap<TuplePair, usize> {
        let mut counts = HashMap::new();
        for config in sample {
            for_each_pair(config, n, |pair| {
                *counts.entry(pair).or_insert(0) += 1;
            });
        }
        counts
    }

    /// Alt-style instance: exactly one of three features per configuration.
    #[test]
    fn alternative_features_give_three_tuples() {
        let sample = vec![
            vec![true, false, false],
            vec![false, true, false],
            vec![false, false, true],
        ];
        let mut graph = TransactionGraph::new(3);
        for config in &sample {
            graph.add_valid_configuration(config);
        }
        let counts = counts(&sample, 3);
        let candidates: Vec<TuplePair> = counts.keys().copied().collect();

        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let greedy = GreedyCds::new(&graph, &counts);
        let its = greedy.build(&candidates, &mut rng, usize::MAX, &Timer::new(10.0));

        // (+0,-1), (+1,-2)-style tuples conflict pairwise only through the
        // selected feature; three configurations can never be merged
        assert_eq!(its.len(), 3);
        for (i, a) in its.iter().enumerate() {
            for b in &its[i + 1..] {
                assert!(!cross_pairs_all_present(&graph, a, b));
            }
        }
    }

    #[test]
    fn ub_stops_the_walk() {
        let sample = vec![
            vec![true, false, false],
            vec![false, true, false],
            vec![false, false, true],
        ];
        let mut graph = TransactionGraph::new(3);
        for config in &sample {
            graph.add_valid_configuration(config);
        }
        let counts = counts(&sample, 3);
        let candidates: Vec<TuplePair> = counts.keys().copied().collect();
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        let greedy = GreedyCds::new(&graph, &counts);
        let its = greedy.build(&candidates, &mut rng, 2, &Timer::new(10.0));
        assert_eq!(its.len(), 2);
    }
}
