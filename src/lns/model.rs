use std::collections::HashMap;

use log::{debug, warn};

use crate::coverage::TuplePair;
use crate::errors::{Error, Result};
use crate::preprocessor::{Config, IndexInstance};
use crate::solver::{
    encode_instance, lit, Model, SlotVars, SolveOutcome, SolverBackend, Status, Var,
};
use crate::utils::Timer;

/// One configuration slot of the subproblem: a full copy of the instance
/// constraints, an activation switch, and the tuple-coverage variables
/// created for it so far.
struct Slot {
    vars: SlotVars,
    active: Var,
    tuple_vars: HashMap<TuplePair, Var>,
}

impl Slot {
    fn new(instance: &IndexInstance, model: &mut Model) -> Self {
        let vars = encode_instance(instance, model);
        let active = model.new_var();
        Self {
            vars,
            active,
            tuple_vars: HashMap::new(),
        }
    }

    /// Variable that is true only if this slot is active and realizes the
    /// tuple.
    fn tuple_var(&mut self, model: &mut Model, tuple: &TuplePair) -> Var {
        if let Some(&var) = self.tuple_vars.get(tuple) {
            return var;
        }
        let var = model.new_var();
        let tuple_lit = lit(var, true);
        let a = self.vars.lit(tuple.a());
        let b = self.vars.lit(tuple.b());
        let active = lit(self.active, true);
        model.add_clause([-tuple_lit, a]);
        model.add_clause([-tuple_lit, b]);
        model.add_clause([-tuple_lit, active]);
        // the reverse direction keeps the variable determined
        model.add_clause([tuple_lit, -a, -b, -active]);
        self.tuple_vars.insert(*tuple, var);
        var
    }

    fn hint(&self, model: &mut Model, config: &[bool]) {
        model.add_hint(self.active, true);
        for (index, &value) in config.iter().enumerate() {
            model.add_hint(self.vars.var(index), value);
        }
    }
}

/// Outcome of one neighborhood optimization.
#[derive(Debug, Clone)]
pub struct SubproblemOutcome {
    pub lb: usize,
    pub ub: usize,
    pub solution: Option<Vec<Config>>,
}

/// The per-iteration optimization model: up to `k` configuration slots that
/// together must cover all missing tuples, minimizing the number of active
/// slots.
pub struct SubproblemModel {
    model: Model,
    slots: Vec<Slot>,
    pinned: HashMap<TuplePair, usize>,
}

impl SubproblemModel {
    pub fn new(instance: &IndexInstance, k: usize, timer: &Timer) -> Result<Self> {
        let mut model = Model::new();
        let mut slots = Vec::with_capacity(k);
        for _ in 0..k {
            timer.check()?;
            slots.push(Slot::new(instance, &mut model));
        }
        let objective = slots.iter().map(|s| lit(s.active, true)).collect();
        model.minimize(objective);
        Ok(Self {
            model,
            slots,
            pinned: HashMap::new(),
        })
    }

    pub fn k(&self) -> usize {
        self.slots.len()
    }

    /// Pin the independent tuples to the first slots and order the remaining
    /// slots by activation and size.
    pub fn break_symmetries(&mut self, independent: &[TuplePair]) {
        debug_assert!(independent.len() <= self.slots.len());
        for (index, tuple) in independent.iter().enumerate() {
            let var = self.slots[index].tuple_var(&mut self.model, tuple);
            self.model.add_unit(lit(var, true));
            self.pinned.insert(*tuple, index);
        }
        for index in independent.len() + 1..self.slots.len() {
            let current = &self.slots[index];
            let previous = &self.slots[index - 1];
            self.model
                .add_clause([lit(current.active, false), lit(previous.active, true)]);
            self.model
                .add_linear_le(current.vars.all_lits(), previous.vars.all_lits());
        }
    }

    /// Each missing tuple must be realized by at least one slot.
    pub fn enforce_tuple(&mut self, tuple: &TuplePair) {
        let clause: Vec<_> = (0..self.slots.len())
            .map(|index| lit(self.slots[index].tuple_var(&mut self.model, tuple), true))
            .collect();
        self.model.add_clause(clause);
    }

    /// Seed the solver with the relaxed configurations. Slots pinned to a
    /// tuple get the configuration that realized it; the rest are handed out
    /// largest first.
    pub fn set_initial_solution(&mut self, solution: &[Config]) -> Result<()> {
        if solution.len() > self.slots.len() {
            return Err(Error::InvariantViolation(format!(
                "{} hint configurations for {} slots",
                solution.len(),
                self.slots.len()
            )));
        }
        let mut remaining: Vec<&Config> = solution.iter().collect();
        for (tuple, &slot_index) in &self.pinned {
            let position = remaining
                .iter()
                .position(|config| tuple.covered_by(config))
                .ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "no hint configuration covers pinned tuple {tuple:?}"
                    ))
                })?;
            let config = remaining.swap_remove(position);
            self.slots[slot_index].hint(&mut self.model, config);
        }
        remaining.sort_by_key(|config| {
            std::cmp::Reverse(config.iter().filter(|&&v| v).count())
        });
        let free_slots: Vec<usize> = (0..self.slots.len())
            .filter(|i| !self.pinned.values().any(|&p| p == *i))
            .collect();
        if remaining.len() < free_slots.len() {
            warn!("unnecessarily large k, initial solution is smaller");
        }
        for (config, &slot_index) in remaining.iter().zip(&free_slots) {
            self.slots[slot_index].hint(&mut self.model, config);
        }
        Ok(())
    }

    /// Solve the model within the budget. Timeouts and undecided outcomes
    /// surface as plain bounds, never as errors.
    pub fn optimize(&self, timer: &Timer, backend: &dyn SolverBackend) -> SubproblemOutcome {
        let outcome: SolveOutcome = backend.solve(&self.model, timer);
        debug!(
            "subproblem solve: status {:?}, objective {:?}, bound {}",
            outcome.status, outcome.objective, outcome.best_bound
        );
        let lb = match outcome.status {
            Status::Optimal => outcome.objective.unwrap_or(0).max(outcome.best_bound),
            _ => outcome.best_bound,
        }
        .max(0) as usize;
        let solution = if outcome.is_feasible() {
            outcome.assignment.as_ref().map(|assignment| {
                self.slots
                    .iter()
                    .filter(|slot| assignment[slot.active])
                    .map(|slot| slot.vars.extract(assignment))
                    .collect()
            })
        } else {
            None
        };
        let ub = solution
            .as_ref()
            .map_or(self.slots.len(), |s: &Vec<Config>| s.len());
        SubproblemOutcome { lb, ub, solution }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instances::{Instance, Rule};
    use crate::preprocessor::{literal, preprocess};
    use crate::solver::DpllBackend;

    /// Two unconstrained features: four tuples per pair, two configs suffice
    /// only for two of them.
    fn free_instance() -> IndexInstance {
        preprocess(&Instance::new(
            "free",
            vec!["a".to_string(), "b".to_string()],
            None,
            vec![],
        ))
        .unwrap()
    }

    #[test]
    fn covers_all_enforced_tuples() {
        let instance = free_instance();
        let timer = Timer::new(10.0);
        let mut model = SubproblemModel::new(&instance, 4, &timer).unwrap();
        let tuples = [
            TuplePair::new(literal(0, true), literal(1, true)),
            TuplePair::new(literal(0, false), literal(1, false)),
            TuplePair::new(literal(0, true), literal(1, false)),
            TuplePair::new(literal(0, false), literal(1, true)),
        ];
        for tuple in &tuples {
            model.enforce_tuple(tuple);
        }
        let outcome = model.optimize(&timer, &DpllBackend);
        assert_eq!(outcome.lb, 4);
        let solution = outcome.solution.unwrap();
        assert_eq!(solution.len(), 4);
        for tuple in &tuples {
            assert!(solution.iter().any(|config| tuple.covered_by(config)));
        }
    }

    #[test]
    fn symmetry_breaking_pins_tuples() {
        let instance = free_instance();
        let timer = Timer::new(10.0);
        let mut model = SubproblemModel::new(&instance, 2, &timer).unwrap();
        let pinned = TuplePair::new(literal(0, true), literal(1, true));
        model.break_symmetries(std::slice::from_ref(&pinned));
        model.enforce_tuple(&pinned);
        let outcome = model.optimize(&timer, &DpllBackend);
        let solution = outcome.solution.unwrap();
        // slot 0 must be active and realize the pinned tuple
        assert!(pinned.covered_by(&solution[0]));
        assert_eq!(outcome.lb, 1);
    }

    #[test]
    fn rejects_too_many_hints() {
        let instance = free_instance();
        let timer = Timer::new(10.0);
        let mut model = SubproblemModel::new(&instance, 1, &timer).unwrap();
        let configs = vec![vec![true, true], vec![false, false]];
        assert!(matches!(
            model.set_initial_solution(&configs),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn hints_respect_pinned_tuples() {
        let instance = free_instance();
        let timer = Timer::new(10.0);
        let mut model = SubproblemModel::new(&instance, 2, &timer).unwrap();
        let pinned = TuplePair::new(literal(0, true), literal(1, false));
        model.break_symmetries(std::slice::from_ref(&pinned));
        model.enforce_tuple(&pinned);
        let configs = vec![vec![false, false], vec![true, false]];
        model.set_initial_solution(&configs).unwrap();
        let outcome = model.optimize(&timer, &DpllBackend);
        assert!(outcome.solution.is_some());
    }

    #[test]
    fn constrained_instance_is_respected() {
        // a => b rules out the (a, !b) tuple combination in one slot
        let v = |n: &str| Rule::var(n.to_string());
        let instance = preprocess(&Instance::new(
            "impl",
            vec!["a".to_string(), "b".to_string()],
            None,
            vec![Rule::Impl(Box::new(v("a")), Box::new(v("b")))],
        ))
        .unwrap();
        let timer = Timer::new(10.0);
        let mut model = SubproblemModel::new(&instance, 1, &timer).unwrap();
        model.enforce_tuple(&TuplePair::new(literal(0, true), literal(1, false)));
        let outcome = model.optimize(&timer, &DpllBackend);
        assert!(outcome.solution.is_none());
    }
}
