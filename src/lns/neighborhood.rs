use log::info;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::coverage::{CoverageSet, TuplePair};
use crate::errors::{Error, Result};
use crate::preprocessor::{Config, IndexInstance};

/// The fixed and relaxed part of one LNS iteration, plus the initial
/// solution for the relaxed part.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    /// Configurations kept as they are.
    pub fixed_samples: Vec<Config>,
    /// Tuples only the relaxed configurations cover.
    pub missing_tuples: Vec<TuplePair>,
    /// The relaxed configurations, a valid starting solution for the
    /// subproblem.
    pub initial_solution: Vec<Config>,
}

impl Neighborhood {
    /// Size of the full sample underlying this neighborhood.
    pub fn global_ub(&self) -> usize {
        self.fixed_samples.len() + self.initial_solution.len()
    }
}

/// Picks the part of the sample to re-optimize.
pub trait NeighborhoodSelector {
    fn setup(&mut self, instance: &IndexInstance, initial_solution: &[Config]);

    /// Notification about every new accepted solution.
    fn add_solution(&mut self, solution: &[Config]);

    /// The next neighborhood. Calling this before [`Self::setup`] is an
    /// invariant violation.
    fn next(&mut self) -> Result<Neighborhood>;

    /// Feedback of the subproblem outcome on the previous neighborhood.
    /// `time_utilization` close to one means the iteration used its whole
    /// budget.
    fn feedback(&mut self, lb: usize, ub: usize, time_utilization: f64);
}

/// Relaxes random configurations until fewer than `n` tuples are missing.
/// The target `n` widens by 25% when the subproblem was solved to optimality
/// and narrows by 25% when the gap stayed wide.
pub struct RandomNeighborhood {
    n: f64,
    incr_factor: f64,
    decr_factor: f64,
    rng: Pcg64Mcg,
    coverage: Option<CoverageSet>,
    best_solution: Vec<Config>,
    n_concrete: usize,
}

impl RandomNeighborhood {
    pub const DEFAULT_FREE_TUPLES: f64 = 250.0;

    pub fn new(max_free_tuples: f64, seed: u64) -> Self {
        Self {
            n: max_free_tuples,
            incr_factor: 1.25,
            decr_factor: 0.75,
            rng: Pcg64Mcg::seed_from_u64(seed),
            coverage: None,
            best_solution: Vec::new(),
            n_concrete: 0,
        }
    }

    pub fn target(&self) -> f64 {
        self.n
    }
}

impl NeighborhoodSelector for RandomNeighborhood {
    fn setup(&mut self, instance: &IndexInstance, initial_solution: &[Config]) {
        info!("setting up random neighborhood selector");
        self.n_concrete = instance.n_concrete;
        self.coverage = Some(CoverageSet::new(initial_solution, instance.n_concrete));
        self.best_solution = initial_solution.to_vec();
        info!(
            "instance has {} feasible tuples",
            self.coverage.as_ref().map_or(0, CoverageSet::len)
        );
    }

    fn add_solution(&mut self, solution: &[Config]) {
        if self.best_solution.is_empty() || solution.len() < self.best_solution.len() {
            self.best_solution = solution.to_vec();
        }
    }

    fn next(&mut self) -> Result<Neighborhood> {
        let coverage = self.coverage.as_mut().ok_or_else(|| {
            Error::InvariantViolation("neighborhood selector used before setup".to_string())
        })?;
        let mut relaxed: Vec<Config> = self.best_solution.clone();
        let mut fixed: Vec<Config> = Vec::new();
        coverage.clear();

        let target = self.n.round() as usize;
        while coverage.num_missing() >= target.max(1) && !relaxed.is_empty() {
            let pick = self.rng.gen_range(0..relaxed.len());
            let config = relaxed.swap_remove(pick);
            coverage.cover(&config);
            fixed.push(config);
        }
        let missing = coverage.missing_tuples();
        Ok(Neighborhood {
            fixed_samples: fixed,
            missing_tuples: missing,
            initial_solution: relaxed,
        })
    }

    fn feedback(&mut self, lb: usize, ub: usize, _time_utilization: f64) {
        if lb == ub {
            self.n *= self.incr_factor;
            info!("increasing neighborhood size to {} tuples", self.n as usize);
        }
        if ub != 0 && lb as f64 / ub as f64 <= 0.9 {
            self.n *= self.decr_factor;
            info!("decreasing neighborhood size to {} tuples", self.n as usize);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instances::Instance;
    use crate::preprocessor::preprocess;

    fn free_instance(n: usize) -> IndexInstance {
        let features = (0..n).map(|i| format!("f{i}")).collect();
        preprocess(&Instance::new("free", features, None, vec![])).unwrap()
    }

    fn all_configs(n: usize) -> Vec<Config> {
        (0..1usize << n)
            .map(|bits| (0..n).map(|i| bits & (1 << i) != 0).collect())
            .collect()
    }

    #[test]
    fn small_target_relaxes_few_configs() {
        let instance = free_instance(4);
        let sample = all_configs(4);
        let mut selector = RandomNeighborhood::new(1.0, 13);
        selector.setup(&instance, &sample);
        let neighborhood = selector.next().unwrap();
        // with target 1 configurations get fixed until nothing is missing
        assert!(neighborhood.missing_tuples.is_empty());
        assert_eq!(neighborhood.global_ub(), sample.len());
    }

    #[test]
    fn large_target_relaxes_everything() {
        let instance = free_instance(3);
        let sample = all_configs(3);
        let mut selector = RandomNeighborhood::new(1e9, 13);
        selector.setup(&instance, &sample);
        let neighborhood = selector.next().unwrap();
        assert!(neighborhood.fixed_samples.is_empty());
        assert_eq!(neighborhood.initial_solution.len(), sample.len());
        // every feasible tuple is missing when nothing is fixed
        assert_eq!(neighborhood.missing_tuples.len(), 3 * 2 * 4 / 2);
    }

    #[test]
    fn next_before_setup_is_an_invariant_violation() {
        let mut selector = RandomNeighborhood::new(10.0, 13);
        assert!(matches!(
            selector.next(),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn feedback_adapts_target() {
        let mut selector = RandomNeighborhood::new(100.0, 13);
        selector.feedback(5, 5, 0.1);
        assert!((selector.target() - 125.0).abs() < 1e-9);
        selector.feedback(1, 10, 0.99);
        assert!((selector.target() - 125.0 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn better_solutions_replace_the_base() {
        let instance = free_instance(2);
        let sample = all_configs(2);
        let mut selector = RandomNeighborhood::new(10.0, 13);
        selector.setup(&instance, &sample);
        let smaller: Vec<Config> = sample[..3].to_vec();
        selector.add_solution(&smaller);
        let neighborhood = selector.next().unwrap();
        assert_eq!(neighborhood.global_ub(), 3);
    }
}
