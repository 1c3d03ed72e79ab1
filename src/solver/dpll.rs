use log::debug;

use crate::solver::{lit_var, Model, SolveOutcome, SolverBackend, Status, Var};
use crate::utils::Timer;

/// Built-in branch-and-bound backend over the pseudo-Boolean model.
///
/// A plain iterative DPLL: unit propagation through occurrence lists, hint
/// directed branching, and objective pruning against the incumbent. It is no
/// match for an industrial solver on large neighborhoods, but it honors the
/// full backend contract and keeps the crate self-contained.
#[derive(Debug, Default, Clone)]
pub struct DpllBackend;

impl SolverBackend for DpllBackend {
    fn solve(&self, model: &Model, timer: &Timer) -> SolveOutcome {
        Search::new(model).run(timer)
    }
}

const TICK_INTERVAL: u64 = 512;

#[derive(Debug)]
struct Decision {
    trail_len: usize,
    var: Var,
    value: bool,
    flipped: bool,
    order_cursor: usize,
}

struct Search<'a> {
    model: &'a Model,
    /// -1 unassigned, 0 false, 1 true
    assign: Vec<i8>,
    trail: Vec<Var>,
    prop_head: usize,
    decisions: Vec<Decision>,
    /// var -> clauses containing it
    occ: Vec<Vec<usize>>,
    /// var -> linear constraints containing it
    lin_occ: Vec<Vec<usize>>,
    /// objective contribution when the var is true / false
    obj_if_true: Vec<bool>,
    obj_if_false: Vec<bool>,
    obj_count: i64,
    hint: Vec<Option<bool>>,
    order: Vec<Var>,
    best: Option<(Vec<bool>, i64)>,
    ticks: u64,
}

impl<'a> Search<'a> {
    fn new(model: &'a Model) -> Self {
        let n = model.n_vars();
        let mut occ = vec![Vec::new(); n];
        for (index, clause) in model.clauses().iter().enumerate() {
            for &l in clause {
                occ[lit_var(l)].push(index);
            }
        }
        let mut lin_occ = vec![Vec::new(); n];
        for (index, linear) in model.linear().iter().enumerate() {
            for &l in linear.lhs.iter().chain(linear.rhs.iter()) {
                let var = lit_var(l);
                if lin_occ[var].last() != Some(&index) {
                    lin_occ[var].push(index);
                }
            }
        }
        let mut obj_if_true = vec![false; n];
        let mut obj_if_false = vec![false; n];
        for &l in model.objective() {
            if l > 0 {
                obj_if_true[lit_var(l)] = true;
            } else {
                obj_if_false[lit_var(l)] = true;
            }
        }
        let mut hint = vec![None; n];
        for &(var, value) in model.hints() {
            hint[var] = Some(value);
        }
        // hinted variables first, then the busiest ones
        let mut order: Vec<Var> = (0..n).collect();
        order.sort_by_key(|&v| (hint[v].is_none(), usize::MAX - occ[v].len()));
        Self {
            model,
            assign: vec![-1; n],
            trail: Vec::with_capacity(n),
            prop_head: 0,
            decisions: Vec::new(),
            occ,
            lin_occ,
            obj_if_true,
            obj_if_false,
            obj_count: 0,
            hint,
            order,
            best: None,
            ticks: 0,
        }
    }

    fn value(&self, l: i32) -> i8 {
        let v = self.assign[lit_var(l)];
        if v < 0 {
            -1
        } else if (v == 1) == (l > 0) {
            1
        } else {
            0
        }
    }

    fn assign(&mut self, var: Var, value: bool) {
        debug_assert!(self.assign[var] < 0);
        self.assign[var] = value as i8;
        self.trail.push(var);
        if value && self.obj_if_true[var] || !value && self.obj_if_false[var] {
            self.obj_count += 1;
        }
    }

    fn unassign_to(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            let var = self.trail.pop().expect("trail underflow");
            let value = self.assign[var] == 1;
            if value && self.obj_if_true[var] || !value && self.obj_if_false[var] {
                self.obj_count -= 1;
            }
            self.assign[var] = -1;
        }
        self.prop_head = self.trail.len();
    }

    /// Upper limit on solutions still worth finding.
    fn cost_cap(&self) -> i64 {
        self.best.as_ref().map_or(i64::MAX, |(_, cost)| *cost)
    }

    /// Unit propagation plus bound checks. Returns false on conflict.
    fn propagate(&mut self) -> bool {
        while self.prop_head < self.trail.len() {
            if self.obj_count >= self.cost_cap() {
                return false;
            }
            let var = self.trail[self.prop_head];
            self.prop_head += 1;
            for index in 0..self.occ[var].len() {
                let clause_index = self.occ[var][index];
                let mut satisfied = false;
                let mut unassigned = None;
                let mut n_unassigned = 0;
                for &l in &self.model.clauses()[clause_index] {
                    match self.value(l) {
                        1 => {
                            satisfied = true;
                            break;
                        }
                        -1 => {
                            n_unassigned += 1;
                            unassigned = Some(l);
                        }
                        _ => {}
                    }
                }
                if satisfied {
                    continue;
                }
                match n_unassigned {
                    0 => return false,
                    1 => {
                        let l = unassigned.expect("unit literal");
                        self.assign(lit_var(l), l > 0);
                    }
                    _ => {}
                }
            }
            for index in 0..self.lin_occ[var].len() {
                let linear_index = self.lin_occ[var][index];
                let linear = &self.model.linear()[linear_index];
                let lhs_min: i64 = linear.lhs.iter().filter(|&&l| self.value(l) == 1).count() as i64;
                let rhs_max: i64 = linear.rhs.iter().filter(|&&l| self.value(l) != 0).count() as i64;
                if lhs_min > rhs_max {
                    return false;
                }
            }
        }
        self.obj_count < self.cost_cap()
    }

    /// Initial propagation of unit clauses and empty-clause detection.
    fn propagate_roots(&mut self) -> bool {
        for clause in self.model.clauses() {
            if clause.is_empty() {
                return false;
            }
            if clause.len() == 1 {
                let l = clause[0];
                match self.value(l) {
                    0 => return false,
                    -1 => self.assign(lit_var(l), l > 0),
                    _ => {}
                }
            }
        }
        self.propagate()
    }

    fn next_branch_var(&self, cursor: usize) -> Option<(usize, Var)> {
        self.order[cursor..]
            .iter()
            .enumerate()
            .find(|(_, &v)| self.assign[v] < 0)
            .map(|(offset, &v)| (cursor + offset, v))
    }

    /// Pop decisions until one can be flipped. False when the tree is done.
    fn backtrack(&mut self) -> bool {
        while let Some(mut decision) = self.decisions.pop() {
            self.unassign_to(decision.trail_len);
            if decision.flipped {
                continue;
            }
            decision.flipped = true;
            decision.value = !decision.value;
            self.assign(decision.var, decision.value);
            self.decisions.push(decision);
            return true;
        }
        false
    }

    fn run(mut self, timer: &Timer) -> SolveOutcome {
        if self.model.n_vars() == 0 {
            return SolveOutcome {
                status: Status::Optimal,
                assignment: Some(Vec::new()),
                objective: Some(0),
                best_bound: 0,
            };
        }
        if !self.propagate_roots() {
            return SolveOutcome {
                status: Status::Infeasible,
                assignment: None,
                objective: None,
                best_bound: 0,
            };
        }
        let mut conflict = false;
        loop {
            self.ticks += 1;
            if self.ticks % TICK_INTERVAL == 0 && timer.is_out_of_time() {
                return self.best_effort();
            }
            if conflict {
                if !self.backtrack() {
                    return self.exhausted();
                }
                conflict = !self.propagate();
                continue;
            }
            let cursor = self
                .decisions
                .last()
                .map_or(0, |decision| decision.order_cursor);
            match self.next_branch_var(cursor) {
                None => {
                    // total assignment; linear constraints were checked on the way
                    self.record_solution();
                    if self.model.objective().is_empty() || self.cost_cap() == 0 {
                        return self.exhausted_early();
                    }
                    conflict = true;
                }
                Some((order_cursor, var)) => {
                    let value = self.hint[var].unwrap_or(false);
                    self.decisions.push(Decision {
                        trail_len: self.trail.len(),
                        var,
                        value,
                        flipped: false,
                        order_cursor,
                    });
                    self.assign(var, value);
                    conflict = !self.propagate();
                }
            }
        }
    }

    fn record_solution(&mut self) {
        let cost = self.obj_count;
        if self.best.as_ref().is_none_or(|(_, best)| cost < *best) {
            debug!("incumbent with objective {cost}");
            let assignment = self.assign.iter().map(|&v| v == 1).collect();
            self.best = Some((assignment, cost));
        }
    }

    /// The search tree is fully explored: the incumbent is optimal.
    fn exhausted(self) -> SolveOutcome {
        match self.best {
            Some((assignment, cost)) => SolveOutcome {
                status: Status::Optimal,
                assignment: Some(assignment),
                objective: Some(cost),
                best_bound: cost,
            },
            None => SolveOutcome {
                status: Status::Infeasible,
                assignment: None,
                objective: None,
                best_bound: 0,
            },
        }
    }

    /// Stopped at a provably optimal incumbent without draining the tree.
    fn exhausted_early(self) -> SolveOutcome {
        let (assignment, cost) = self.best.expect("solution recorded");
        SolveOutcome {
            status: Status::Optimal,
            assignment: Some(assignment),
            objective: Some(cost),
            best_bound: cost,
        }
    }

    fn best_effort(self) -> SolveOutcome {
        match self.best {
            Some((assignment, cost)) => SolveOutcome {
                status: Status::Feasible,
                assignment: Some(assignment),
                objective: Some(cost),
                best_bound: 0,
            },
            None => SolveOutcome {
                status: Status::Unknown,
                assignment: None,
                objective: None,
                best_bound: 0,
            },
        }
    }
}
