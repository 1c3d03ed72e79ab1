pub mod greedy;
pub mod lns;
pub mod worker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::coverage::{for_each_pair, TuplePair};
use crate::graph::TransactionGraph;
use crate::preprocessor::{Config, IndexInstance};
use crate::solver::{InstanceSolver, SolverBackend};
use crate::utils::Timer;

pub use greedy::GreedyCds;
pub use lns::{CdsImprover, ImproveParams};
pub use worker::CdsWorker;

/// The lower-bound engine: maintains independent tuple sets on the
/// transaction graph, globally through a background worker and locally for
/// the per-iteration symmetry breakers.
pub struct CdsEngine {
    graph: Arc<TransactionGraph>,
    solver: Arc<InstanceSolver>,
    backend: Arc<dyn SolverBackend>,
    coverage_count: Arc<HashMap<TuplePair, usize>>,
    initial_its: Vec<TuplePair>,
    worker: Option<CdsWorker>,
    seed: u64,
    query_counter: AtomicU64,
}

impl CdsEngine {
    pub fn new(
        instance: Arc<IndexInstance>,
        backend: Arc<dyn SolverBackend>,
        initial_sample: &[Config],
        seed: u64,
    ) -> Self {
        info!(
            "building transaction graph for {} with {} concrete features",
            instance.name, instance.n_concrete
        );
        let n_concrete = instance.n_concrete;
        let mut graph = TransactionGraph::new(n_concrete);
        let mut coverage_count: HashMap<TuplePair, usize> = HashMap::new();
        for config in initial_sample {
            graph.add_valid_configuration(config);
            for_each_pair(config, n_concrete, |pair| {
                *coverage_count.entry(pair).or_insert(0) += 1;
            });
        }
        info!(
            "transaction graph has {} vertices and {} edges",
            2 * n_concrete,
            graph.edge_count()
        );

        let solver = Arc::new(InstanceSolver::new(instance, Arc::clone(&backend)));
        let coverage_count = Arc::new(coverage_count);
        let graph = Arc::new(graph);

        let candidates: Vec<TuplePair> = graph.edges().collect();
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let initial_its = GreedyCds::new(&graph, &coverage_count).build(
            &candidates,
            &mut rng,
            usize::MAX,
            &Timer::unlimited(),
        );
        info!("initial greedy independent set has {} tuples", initial_its.len());

        Self {
            graph,
            solver,
            backend,
            coverage_count,
            initial_its,
            worker: None,
            seed,
            query_counter: AtomicU64::new(0),
        }
    }

    /// Start the background improver. The worker gets its own graph copy so
    /// it can prune edges without racing the driver's queries.
    pub fn start(&mut self, iteration_timelimit: f64) {
        if self.worker.is_some() {
            return;
        }
        self.worker = Some(CdsWorker::start(
            self.graph.as_ref().clone(),
            Arc::clone(&self.solver),
            Arc::clone(&self.backend),
            Arc::clone(&self.coverage_count),
            self.initial_its.clone(),
            iteration_timelimit,
            self.seed.wrapping_add(1),
        ));
        info!("cds worker started with iteration timelimit {iteration_timelimit}s");
    }

    /// Stop the background improver and keep its last published set.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            self.initial_its = worker.best().as_ref().clone();
            info!("cds worker stopped");
        }
    }

    /// The current best independent set, read from the worker's slot when it
    /// runs.
    pub fn best(&self) -> Vec<TuplePair> {
        match &self.worker {
            Some(worker) => {
                let published = worker.best();
                if published.len() >= self.initial_its.len() {
                    published.as_ref().clone()
                } else {
                    self.initial_its.clone()
                }
            }
            None => self.initial_its.clone(),
        }
    }

    /// Global lower bound on the sample size.
    pub fn lower_bound(&self) -> usize {
        match &self.worker {
            Some(worker) => worker.best().len().max(self.initial_its.len()),
            None => self.initial_its.len(),
        }
    }

    /// An independent set restricted to the given candidate tuples, the
    /// per-iteration symmetry breaker. Greedy construction followed by a
    /// short improvement run, stopping early at `ub`.
    pub fn independent_subset(
        &self,
        candidates: &[TuplePair],
        ub: usize,
        timer: &Timer,
    ) -> Vec<TuplePair> {
        let query = self.query_counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = Pcg64Mcg::seed_from_u64(self.seed.wrapping_add(0x9e37).wrapping_add(query));
        let greedy = GreedyCds::new(&self.graph, &self.coverage_count).build(
            candidates,
            &mut rng,
            ub,
            timer,
        );
        if greedy.len() >= ub || timer.is_out_of_time() {
            return greedy;
        }
        let mut improver = CdsImprover::new(
            &self.graph,
            &self.solver,
            self.backend.as_ref(),
            &self.coverage_count,
        );
        let params = ImproveParams {
            max_iterations: 5,
            ub,
            ..ImproveParams::default()
        };
        let (improved, _refuted) =
            improver.improve(greedy, candidates, params, &mut rng, timer);
        improved
    }

    pub fn solver(&self) -> &Arc<InstanceSolver> {
        &self.solver
    }
}

impl Drop for CdsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instances::{FeatureKind, FeatureLit, FeatureNode, FeatureTree, Instance};
    use crate::preprocessor::preprocess;
    use crate::solver::DpllBackend;

    /// Alt(a, b, c) under a mandatory root.
    fn alt_instance() -> Arc<IndexInstance> {
        let leaf = |name: &str| FeatureNode {
            literal: FeatureLit::new(name.to_string()),
            mandatory: false,
            kind: FeatureKind::Concrete,
        };
        let nodes = vec![
            leaf("a"),
            leaf("b"),
            leaf("c"),
            FeatureNode {
                literal: FeatureLit::new("root".to_string()),
                mandatory: true,
                kind: FeatureKind::Alt {
                    children: vec![0, 1, 2],
                },
            },
        ];
        let tree = FeatureTree::from_nodes(nodes);
        let instance = Instance::new(
            "alt",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            Some(tree),
            vec![],
        );
        Arc::new(preprocess(&instance).unwrap())
    }

    fn alt_sample() -> Vec<Config> {
        // root is a composite feature behind the three concrete ones
        vec![
            vec![true, false, false, true],
            vec![false, true, false, true],
            vec![false, false, true, true],
        ]
    }

    #[test]
    fn alt_instance_has_lower_bound_three() {
        let engine = CdsEngine::new(alt_instance(), Arc::new(DpllBackend), &alt_sample(), 42);
        assert_eq!(engine.lower_bound(), 3);
    }

    #[test]
    fn independent_subset_respects_candidates() {
        let engine = CdsEngine::new(alt_instance(), Arc::new(DpllBackend), &alt_sample(), 42);
        let candidates: Vec<TuplePair> = engine.graph.edges().take(4).collect();
        let its = engine.independent_subset(&candidates, usize::MAX, &Timer::new(5.0));
        assert!(its.iter().all(|t| candidates.contains(t)));
    }

    #[test]
    fn worker_starts_and_stops_cleanly() {
        let mut engine = CdsEngine::new(alt_instance(), Arc::new(DpllBackend), &alt_sample(), 42);
        engine.start(0.05);
        let lb = engine.lower_bound();
        assert!(lb >= 3);
        engine.stop();
        assert!(engine.lower_bound() >= lb);
    }
}
