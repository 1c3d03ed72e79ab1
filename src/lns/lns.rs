use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::cds::CdsEngine;
use crate::errors::{Error, Result};
use crate::lns::model::SubproblemModel;
use crate::lns::neighborhood::{Neighborhood, NeighborhoodSelector};
use crate::preprocessor::{Config, IndexInstance};
use crate::solver::SolverBackend;
use crate::utils::Timer;

/// One timing event inside an iteration.
#[derive(Debug, Clone, Serialize)]
pub struct LapEvent {
    pub name: String,
    pub t: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodStats {
    pub tuples: usize,
    pub confs: usize,
}

/// Structured record handed to the observer at the end of each iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iter: usize,
    pub lb: usize,
    pub ub: usize,
    pub time: f64,
    pub iteration_time: f64,
    pub events: Vec<LapEvent>,
    pub neighborhood: NeighborhoodStats,
}

/// Progress observer. Implementations must not reach back into the driver;
/// they only record what they are told.
pub trait LnsObserver {
    fn on_new_lower_bound(&mut self, _lb: usize) {}
    fn on_new_solution(&mut self, _solution: &[Config]) {}
    fn on_iteration_begin(&mut self, _iteration: usize) {}
    fn on_iteration_end(&mut self, _record: &IterationRecord) {}
}

/// Observer that drops everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl LnsObserver for NullObserver {}

/// Observer that forwards the records to the log stream.
#[derive(Debug, Default)]
pub struct LogObserver;

impl LnsObserver for LogObserver {
    fn on_new_lower_bound(&mut self, lb: usize) {
        info!("new lower bound {lb}");
    }

    fn on_new_solution(&mut self, solution: &[Config]) {
        info!("new solution with {} configurations", solution.len());
    }

    fn on_iteration_end(&mut self, record: &IterationRecord) {
        match serde_json::to_string(record) {
            Ok(line) => info!("{line}"),
            Err(error) => warn!("unserializable iteration record: {error}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OptimizeParams {
    pub iterations: usize,
    pub iteration_timelimit: f64,
    /// Budget per background CDS improvement round.
    pub cds_iteration_timelimit: f64,
    pub timelimit: f64,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            iterations: 15,
            iteration_timelimit: 60.0,
            cds_iteration_timelimit: 60.0,
            timelimit: 3600.0,
        }
    }
}

/// The Large Neighborhood Search driver: repeatedly relaxes part of the best
/// sample and re-optimizes it, with the CDS engine supplying lower bounds
/// and symmetry breakers.
pub struct LnsDriver<S: NeighborhoodSelector> {
    instance: Arc<IndexInstance>,
    selector: S,
    cds: CdsEngine,
    backend: Arc<dyn SolverBackend>,
    observer: Box<dyn LnsObserver>,
    solution_pool: Vec<Vec<Config>>,
    lb: usize,
    cancel: Arc<AtomicBool>,
}

impl<S: NeighborhoodSelector> LnsDriver<S> {
    pub fn new(
        instance: Arc<IndexInstance>,
        initial_solution: Vec<Config>,
        mut selector: S,
        backend: Arc<dyn SolverBackend>,
        observer: Box<dyn LnsObserver>,
        seed: u64,
    ) -> Result<Self> {
        for (index, config) in initial_solution.iter().enumerate() {
            if !Self::config_is_feasible(&instance, config) {
                return Err(Error::InfeasibleConfiguration(format!(
                    "initial configuration {index} violates the model"
                )));
            }
        }
        selector.setup(&instance, &initial_solution);
        let cds = CdsEngine::new(
            Arc::clone(&instance),
            Arc::clone(&backend),
            &initial_solution,
            seed,
        );
        Ok(Self {
            instance,
            selector,
            cds,
            backend,
            observer,
            solution_pool: vec![initial_solution],
            lb: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    fn config_is_feasible(instance: &IndexInstance, config: &[bool]) -> bool {
        if config.len() != instance.n_all {
            return false;
        }
        if let Some(tree) = &instance.structure {
            let root = &tree.root().literal;
            if !root.is_satisfied(config).unwrap_or(false) || !tree.is_feasible(config) {
                return false;
            }
        }
        instance.clauses_satisfied(config)
    }

    /// Cooperative cancellation toggle; checked at the iteration boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn lower_bound(&self) -> usize {
        self.lb
    }

    pub fn best_solution(&self) -> Result<&Vec<Config>> {
        self.solution_pool
            .iter()
            .min_by_key(|solution| solution.len())
            .ok_or_else(|| {
                Error::InvariantViolation("solution pool lost the initial solution".to_string())
            })
    }

    /// Every accepted solution, in acceptance order.
    pub fn solution_pool(&self) -> &[Vec<Config>] {
        &self.solution_pool
    }

    fn add_lower_bound(&mut self, lb: usize) {
        if lb > self.lb {
            self.lb = lb;
            self.observer.on_new_lower_bound(lb);
        }
    }

    fn add_solution(&mut self, solution: Vec<Config>) {
        self.selector.add_solution(&solution);
        self.observer.on_new_solution(&solution);
        self.solution_pool.push(solution);
    }

    /// Optimize one neighborhood. Returns local `(lb, ub)`; timeouts and
    /// undecided solver outcomes degrade to bounds instead of errors.
    fn optimize_neighborhood(
        &mut self,
        neighborhood: &Neighborhood,
        timer: &mut Timer,
    ) -> Result<(usize, usize)> {
        let k = neighborhood.initial_solution.len();
        if neighborhood.missing_tuples.is_empty() {
            info!("no missing tuples in neighborhood");
            return Ok((0, 0));
        }
        if k <= 1 {
            return Ok((k, k));
        }

        let independent =
            self.cds
                .independent_subset(&neighborhood.missing_tuples, k, timer);
        timer.lap("local_cds_computed");
        if independent.len() == k {
            info!("neighborhood optimal by independent tuples");
            return Ok((k, k));
        }

        let local_lb = independent.len().max(1);
        let mut model = match SubproblemModel::new(&self.instance, k, timer) {
            Ok(model) => model,
            Err(Error::Timeout) => return Ok((local_lb, k)),
            Err(error) => return Err(error),
        };
        model.break_symmetries(&independent);
        model.set_initial_solution(&neighborhood.initial_solution)?;
        for tuple in &neighborhood.missing_tuples {
            model.enforce_tuple(tuple);
        }
        timer.lap("model_built");

        let outcome = model.optimize(timer, self.backend.as_ref());
        timer.lap("model_optimized");

        let lb = outcome.lb.max(local_lb);
        match outcome.solution {
            Some(relaxed) => {
                let ub = relaxed.len();
                let mut solution = neighborhood.fixed_samples.clone();
                solution.extend(relaxed);
                if solution.len() < self.best_solution()?.len() {
                    self.add_solution(solution);
                }
                Ok((lb, ub))
            }
            None => Ok((lb, k)),
        }
    }

    /// The outer loop. Returns whether the final sample is certified optimal.
    pub fn optimize(&mut self, params: OptimizeParams) -> Result<bool> {
        info!(
            "beginning optimization with iterations={}, iteration_timelimit={}, timelimit={}",
            params.iterations, params.iteration_timelimit, params.timelimit
        );
        let mut global_timer = Timer::new(params.timelimit);
        self.cds.start(params.cds_iteration_timelimit);
        self.add_lower_bound(self.cds.lower_bound());
        global_timer.lap("initial_lb_computed");

        let mut optimal = false;
        for iteration in 0..params.iterations {
            if global_timer.is_out_of_time() {
                info!("global timeout");
                break;
            }
            if self.cancel.load(Ordering::Acquire) {
                info!("cancelled");
                break;
            }
            self.observer.on_iteration_begin(iteration);
            let mut iter_timer =
                Timer::new(params.iteration_timelimit.min(global_timer.remaining()));

            let neighborhood = self.selector.next()?;
            iter_timer.lap("neighborhood_selected");
            let stats = NeighborhoodStats {
                tuples: neighborhood.missing_tuples.len(),
                confs: neighborhood.initial_solution.len(),
            };
            let (lb, ub) = self.optimize_neighborhood(&neighborhood, &mut iter_timer)?;
            iter_timer.lap("neighborhood_optimized");

            // a neighborhood covering the whole sample bounds it globally
            if neighborhood.fixed_samples.is_empty() {
                self.add_lower_bound(lb);
            }
            self.add_lower_bound(self.cds.lower_bound());
            iter_timer.lap("global_lb_updated");

            let record = IterationRecord {
                iter: iteration,
                lb: self.lb,
                ub: self.best_solution()?.len(),
                time: global_timer.elapsed(),
                iteration_time: iter_timer.elapsed(),
                events: iter_timer
                    .laps()
                    .iter()
                    .map(|(name, t)| LapEvent {
                        name: name.clone(),
                        t: *t,
                    })
                    .collect(),
                neighborhood: stats,
            };
            self.observer.on_iteration_end(&record);

            let complete_and_optimal = lb == ub && neighborhood.fixed_samples.is_empty();
            let solution_matches_lb = self.lb == self.best_solution()?.len();
            if complete_and_optimal || solution_matches_lb {
                optimal = true;
                break;
            }
            let time_utilization = iter_timer.elapsed() / params.iteration_timelimit.max(1e-9);
            self.selector.feedback(lb, ub, time_utilization);
        }
        self.cds.stop();
        self.add_lower_bound(self.cds.lower_bound());
        Ok(optimal)
    }
}
