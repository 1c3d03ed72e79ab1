use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use log::{debug, info};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::coverage::TuplePair;
use crate::graph::TransactionGraph;
use crate::solver::{InstanceSolver, SolverBackend};
use crate::utils::Timer;

use super::lns::{CdsImprover, ImproveParams};

/// Snapshot slot shared between the background worker and its readers.
/// Written only by the worker and only on improvement, so every read sees a
/// valid, monotonically growing set.
#[derive(Debug, Default)]
struct Shared {
    best: RwLock<Arc<Vec<TuplePair>>>,
    stop: AtomicBool,
}

/// The long-lived lower-bound worker. Owns a private copy of the transaction
/// graph (including any pruning it proves) and repeatedly runs the blocking
/// improver with a per-iteration time budget.
pub struct CdsWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl CdsWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        mut graph: TransactionGraph,
        solver: Arc<InstanceSolver>,
        backend: Arc<dyn SolverBackend>,
        coverage_count: Arc<HashMap<TuplePair, usize>>,
        initial: Vec<TuplePair>,
        iteration_timelimit: f64,
        seed: u64,
    ) -> Self {
        let shared = Arc::new(Shared {
            best: RwLock::new(Arc::new(initial)),
            stop: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            let candidates: Vec<TuplePair> = graph.edges().collect();
            let mut rng = Pcg64Mcg::seed_from_u64(seed);
            let mut round = 0u64;
            while !worker_shared.stop.load(Ordering::Acquire) {
                round += 1;
                let current: Vec<TuplePair> =
                    worker_shared.best.read().expect("cds slot poisoned").as_ref().clone();
                let timer = Timer::new(iteration_timelimit);
                let mut improver =
                    CdsImprover::new(&graph, &solver, backend.as_ref(), &coverage_count);
                let params = ImproveParams {
                    max_iterations: 8,
                    ..ImproveParams::default()
                };
                let (improved, refuted) =
                    improver.improve(current.clone(), &candidates, params, &mut rng, &timer);
                for pair in refuted {
                    if graph.remove_pair(&pair) {
                        debug!("pruned spurious edge {pair:?}");
                    }
                }
                if improved.len() > current.len() {
                    info!(
                        "cds worker round {round}: lower bound {} -> {}",
                        current.len(),
                        improved.len()
                    );
                    *worker_shared.best.write().expect("cds slot poisoned") =
                        Arc::new(improved);
                }
            }
        });
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Cheap read of the current best independent set.
    pub fn best(&self) -> Arc<Vec<TuplePair>> {
        Arc::clone(&self.shared.best.read().expect("cds slot poisoned"))
    }

    /// Signal the worker and wait for it to finish its current iteration.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CdsWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
