pub mod lns;
pub mod model;
pub mod neighborhood;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::info;

use crate::errors::{Error, Result};
use crate::instances::{ExternalConfig, ExternalSample, Instance};
use crate::preprocessor::{preprocess, Config, IndexInstance};
use crate::solver::{DpllBackend, InstanceSolver, SolverBackend};
use crate::utils::Timer;
use crate::verify::have_equal_coverage;

pub use lns::{
    IterationRecord, LapEvent, LnsDriver, LnsObserver, LogObserver, NeighborhoodStats,
    NullObserver, OptimizeParams,
};
pub use model::{SubproblemModel, SubproblemOutcome};
pub use neighborhood::{Neighborhood, NeighborhoodSelector, RandomNeighborhood};

/// Options of the optimizer facade.
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    pub seed: u64,
    /// Initial neighborhood size target in free tuples.
    pub max_free_tuples: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            seed: 0xC0FFEE,
            max_free_tuples: RandomNeighborhood::DEFAULT_FREE_TUPLES,
        }
    }
}

/// End-to-end optimizer over original-universe samples. Converts through the
/// preprocessor at the boundary, runs the LNS driver internally, and verifies
/// coverage equality on export.
pub struct SampleOptimizer {
    original: Instance,
    index: Arc<IndexInstance>,
    initial_sample: ExternalSample,
    driver: LnsDriver<RandomNeighborhood>,
}

impl SampleOptimizer {
    pub fn new(
        instance: Instance,
        initial_sample: ExternalSample,
        observer: Box<dyn LnsObserver>,
        options: OptimizerOptions,
    ) -> Result<Self> {
        let index = Arc::new(preprocess(&instance)?);
        let backend: Arc<dyn SolverBackend> = Arc::new(DpllBackend);
        let internal = import_sample(&instance, &index, &backend, &initial_sample)?;
        info!(
            "imported initial sample with {} configurations",
            internal.len()
        );
        let selector = RandomNeighborhood::new(options.max_free_tuples, options.seed);
        let driver = LnsDriver::new(
            Arc::clone(&index),
            internal,
            selector,
            backend,
            observer,
            options.seed,
        )?;
        Ok(Self {
            original: instance,
            index,
            initial_sample,
            driver,
        })
    }

    /// Run the optimization. Returns whether the result is certified optimal.
    pub fn optimize(&mut self, params: OptimizeParams) -> Result<bool> {
        self.driver.optimize(params)
    }

    pub fn lower_bound(&self) -> usize {
        self.driver.lower_bound()
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.driver.cancel_flag()
    }

    /// The best sample, exported to the original universe. With `verify` the
    /// coverage is checked against the initial sample; a mismatch is a bug
    /// and fails hard.
    pub fn best_sample(&self, verify: bool) -> Result<ExternalSample> {
        let exported: ExternalSample = self
            .driver
            .best_solution()?
            .iter()
            .map(|config| self.index.to_original(config))
            .collect();
        if verify && !have_equal_coverage(&self.original, &self.initial_sample, &exported)? {
            return Err(Error::CoverageMismatch);
        }
        Ok(exported)
    }

    /// Every accepted solution over the original universe.
    pub fn solution_pool(&self) -> Vec<ExternalSample> {
        self.driver
            .solution_pool()
            .iter()
            .map(|solution| {
                solution
                    .iter()
                    .map(|config| self.index.to_original(config))
                    .collect()
            })
            .collect()
    }

    pub fn instance(&self) -> &Instance {
        &self.original
    }
}

/// Convert an original-universe sample into total indexed configurations,
/// completing composite and auxiliary variables through the solver. Rejects
/// configurations that are not fully defined or infeasible.
fn import_sample(
    instance: &Instance,
    index: &Arc<IndexInstance>,
    backend: &Arc<dyn SolverBackend>,
    sample: &ExternalSample,
) -> Result<Vec<Config>> {
    let solver = InstanceSolver::new(Arc::clone(index), Arc::clone(backend));
    let timer = Timer::unlimited();
    let mut internal = Vec::with_capacity(sample.len());
    for (position, config) in sample.iter().enumerate() {
        if !instance.is_fully_defined(config) {
            return Err(Error::InfeasibleConfiguration(format!(
                "configuration {position} does not define all concrete features"
            )));
        }
        let partial: HashMap<usize, bool> = index.to_indexed(config)?;
        let completed = solver.complete(&partial, &timer).map_err(|error| match error {
            Error::InfeasibleConfiguration(_) => Error::InfeasibleConfiguration(format!(
                "configuration {position} violates the model"
            )),
            other => other,
        })?;
        internal.push(completed);
    }
    Ok(internal)
}
