use std::collections::HashMap;

use log::trace;
use rand::seq::SliceRandom;
use rand_pcg::Pcg64Mcg;

use crate::coverage::TuplePair;
use crate::graph::TransactionGraph;
use crate::solver::{lit, InstanceSolver, Model, SolverBackend, Status};
use crate::utils::Timer;

use super::greedy::cross_pairs_all_present;

/// Cap on the candidate pool handed to the repair model per iteration.
const POOL_CAP: usize = 40;
/// Time granted to a single refutation call.
const REFUTE_BUDGET: f64 = 0.5;

/// Decides whether two tuples can never share a configuration, caching the
/// expensive refutations.
///
/// The cheap cross-pair test proves independence when a cross pair is missing
/// from the graph. When all cross pairs exist, a constraint call on the four
/// literals settles it; an undecided call conservatively counts as dependent
/// so the independent set stays valid.
pub struct IndependenceOracle<'a> {
    graph: &'a TransactionGraph,
    solver: &'a InstanceSolver,
    cache: HashMap<(TuplePair, TuplePair), bool>,
    /// Cross pairs proven infeasible by refutation; the worker prunes these
    /// from its own graph copy.
    pub refuted_pairs: Vec<TuplePair>,
}

impl<'a> IndependenceOracle<'a> {
    pub fn new(graph: &'a TransactionGraph, solver: &'a InstanceSolver) -> Self {
        Self {
            graph,
            solver,
            cache: HashMap::new(),
            refuted_pairs: Vec::new(),
        }
    }

    pub fn is_independent(&mut self, e1: &TuplePair, e2: &TuplePair, timer: &Timer) -> bool {
        if !cross_pairs_all_present(self.graph, e1, e2) {
            return true;
        }
        let key = if e1 < e2 { (*e1, *e2) } else { (*e2, *e1) };
        if let Some(&known) = self.cache.get(&key) {
            return known;
        }
        if timer.is_out_of_time() {
            return false;
        }
        let budget = Timer::new(REFUTE_BUDGET.min(timer.remaining()));
        // spurious cross pairs are even stronger proofs than the conjunction
        for (x, y) in [
            (e1.a(), e2.a()),
            (e1.a(), e2.b()),
            (e1.b(), e2.a()),
            (e1.b(), e2.b()),
        ] {
            if x == y || x == -y {
                continue;
            }
            if self.solver.literals_feasible(&[x, y], &budget) == Some(false) {
                self.refuted_pairs.push(TuplePair::new(x, y));
                self.cache.insert(key, true);
                return true;
            }
        }
        let literals = [e1.a(), e1.b(), e2.a(), e2.b()];
        let independent = self.solver.literals_feasible(&literals, &budget) == Some(false);
        self.cache.insert(key, independent);
        independent
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImproveParams {
    pub max_iterations: usize,
    /// Stop once the set reaches this size.
    pub ub: usize,
    /// Stop after this many consecutive non-improving iterations.
    pub stall_limit: usize,
}

impl Default for ImproveParams {
    fn default() -> Self {
        Self {
            max_iterations: usize::MAX,
            ub: usize::MAX,
            stall_limit: 10,
        }
    }
}

/// Destroy-and-repair improvement of an independent tuple set.
pub struct CdsImprover<'a> {
    graph: &'a TransactionGraph,
    solver: &'a InstanceSolver,
    backend: &'a dyn SolverBackend,
    coverage_count: &'a HashMap<TuplePair, usize>,
    /// Number of tuples removed per destroy step, adapted per iteration.
    removal_size: f64,
}

impl<'a> CdsImprover<'a> {
    pub fn new(
        graph: &'a TransactionGraph,
        solver: &'a InstanceSolver,
        backend: &'a dyn SolverBackend,
        coverage_count: &'a HashMap<TuplePair, usize>,
    ) -> Self {
        Self {
            graph,
            solver,
            backend,
            coverage_count,
            removal_size: 2.0,
        }
    }

    /// Run destroy-and-repair until the budget, the stall limit, or `ub` is
    /// reached. Returns the best set found and the cross pairs refuted along
    /// the way.
    pub fn improve(
        &mut self,
        initial: Vec<TuplePair>,
        candidates: &[TuplePair],
        params: ImproveParams,
        rng: &mut Pcg64Mcg,
        timer: &Timer,
    ) -> (Vec<TuplePair>, Vec<TuplePair>) {
        let mut oracle = IndependenceOracle::new(self.graph, self.solver);
        let mut best = initial;
        let mut stalled = 0;
        let mut iteration = 0;
        while iteration < params.max_iterations
            && stalled < params.stall_limit
            && best.len() < params.ub
            && !timer.is_out_of_time()
        {
            iteration += 1;
            let improved = self.iterate(&mut best, candidates, &mut oracle, rng, timer);
            if improved {
                stalled = 0;
                self.removal_size = (self.removal_size * 1.25).min(best.len() as f64 / 2.0);
            } else {
                stalled += 1;
                self.removal_size = (self.removal_size * 0.75).max(1.0);
            }
        }
        (best, oracle.refuted_pairs)
    }

    /// One destroy-and-repair step. Returns whether `best` grew.
    fn iterate(
        &mut self,
        best: &mut Vec<TuplePair>,
        candidates: &[TuplePair],
        oracle: &mut IndependenceOracle<'_>,
        rng: &mut Pcg64Mcg,
        timer: &Timer,
    ) -> bool {
        let n_remove = (self.removal_size.round() as usize).clamp(1, best.len().max(1));
        let mut kept = best.clone();
        kept.shuffle(rng);
        let removed_from = kept.len().saturating_sub(n_remove);
        kept.truncate(removed_from);

        // pool of candidates independent from everything kept
        let mut pool: Vec<TuplePair> = Vec::new();
        let mut shuffled: Vec<TuplePair> = candidates
            .iter()
            .copied()
            .filter(|t| !kept.contains(t))
            .collect();
        shuffled.shuffle(rng);
        shuffled.sort_by_key(|t| self.coverage_count.get(t).copied().unwrap_or(0));
        for tuple in shuffled {
            if pool.len() >= POOL_CAP || timer.is_out_of_time() {
                break;
            }
            if kept
                .iter()
                .all(|kept_tuple| oracle.is_independent(&tuple, kept_tuple, timer))
            {
                pool.push(tuple);
            }
        }
        if pool.is_empty() {
            return false;
        }

        // maximize the number of pairwise-independent pool members
        let mut model = Model::new();
        let vars: Vec<_> = pool.iter().map(|_| model.new_var()).collect();
        for i in 0..pool.len() {
            for j in i + 1..pool.len() {
                if !oracle.is_independent(&pool[i], &pool[j], timer) {
                    model.add_clause([lit(vars[i], false), lit(vars[j], false)]);
                }
            }
        }
        model.minimize(vars.iter().map(|&v| lit(v, false)).collect());
        let outcome = self.backend.solve(&model, timer);
        let Some(assignment) = outcome.assignment else {
            return false;
        };
        if outcome.status != Status::Optimal && outcome.status != Status::Feasible {
            return false;
        }

        let mut rebuilt = kept;
        rebuilt.extend(
            pool.iter()
                .zip(&vars)
                .filter(|(_, &v)| assignment[v])
                .map(|(t, _)| *t),
        );
        trace!(
            "cds repair rebuilt {} tuples against best {}",
            rebuilt.len(),
            best.len()
        );
        if rebuilt.len() > best.len() {
            *best = rebuilt;
            return true;
        }
        false
    }
}
