pub mod dpll;
pub mod encoding;

use crate::utils::Timer;

pub use dpll::DpllBackend;
pub use encoding::{encode_instance, InstanceSolver, SlotVars};

/// Solver variable index.
pub type Var = usize;

/// Solver literal, `±(var + 1)`.
pub type Lit = i32;

pub fn lit(var: Var, positive: bool) -> Lit {
    let code = (var + 1) as i32;
    if positive {
        code
    } else {
        -code
    }
}

pub fn lit_var(l: Lit) -> Var {
    (l.unsigned_abs() - 1) as Var
}

/// A pseudo-Boolean optimization model: clauses, linear comparisons between
/// sums of literals, an optional minimization objective over literals, and
/// value hints to start the search from.
#[derive(Debug, Default, Clone)]
pub struct Model {
    n_vars: usize,
    clauses: Vec<Vec<Lit>>,
    linear: Vec<LinearLe>,
    objective: Vec<Lit>,
    hints: Vec<(Var, bool)>,
}

/// `sum(lhs) <= sum(rhs)` over literal truth values.
#[derive(Debug, Clone)]
pub struct LinearLe {
    pub lhs: Vec<Lit>,
    pub rhs: Vec<Lit>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_var(&mut self) -> Var {
        self.n_vars += 1;
        self.n_vars - 1
    }

    /// Allocate a block of variables, returning the first index.
    pub fn new_vars(&mut self, n: usize) -> Var {
        let first = self.n_vars;
        self.n_vars += n;
        first
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn add_clause(&mut self, literals: impl IntoIterator<Item = Lit>) {
        let clause: Vec<Lit> = literals.into_iter().collect();
        debug_assert!(!clause.is_empty());
        debug_assert!(clause.iter().all(|&l| lit_var(l) < self.n_vars));
        self.clauses.push(clause);
    }

    pub fn add_unit(&mut self, literal: Lit) {
        self.add_clause([literal]);
    }

    /// Pairwise at-most-one over the given literals.
    pub fn add_at_most_one(&mut self, literals: &[Lit]) {
        for (i, &a) in literals.iter().enumerate() {
            for &b in &literals[i + 1..] {
                self.add_clause([-a, -b]);
            }
        }
    }

    pub fn add_linear_le(&mut self, lhs: Vec<Lit>, rhs: Vec<Lit>) {
        self.linear.push(LinearLe { lhs, rhs });
    }

    /// Minimize the number of satisfied literals among the given ones.
    pub fn minimize(&mut self, literals: Vec<Lit>) {
        self.objective = literals;
    }

    pub fn add_hint(&mut self, var: Var, value: bool) {
        self.hints.push((var, value));
    }

    pub fn clauses(&self) -> &[Vec<Lit>] {
        &self.clauses
    }

    pub fn linear(&self) -> &[LinearLe] {
        &self.linear
    }

    pub fn objective(&self) -> &[Lit] {
        &self.objective
    }

    pub fn hints(&self) -> &[(Var, bool)] {
        &self.hints
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Optimal,
    Feasible,
    Infeasible,
    Unknown,
}

/// Result of a backend run. `best_bound` is the strongest proven lower bound
/// on the objective; without an objective it stays zero.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: Status,
    pub assignment: Option<Vec<bool>>,
    pub objective: Option<i64>,
    pub best_bound: i64,
}

impl SolveOutcome {
    pub fn is_feasible(&self) -> bool {
        matches!(self.status, Status::Optimal | Status::Feasible)
    }
}

/// The constraint-satisfaction backend contract. Implementations must honor
/// the timer as a wall-clock limit and return their best effort when it runs
/// out rather than erroring.
pub trait SolverBackend: Send + Sync {
    fn solve(&self, model: &Model, timer: &Timer) -> SolveOutcome;
}
