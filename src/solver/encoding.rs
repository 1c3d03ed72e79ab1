use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::instances::FeatureKind;
use crate::preprocessor::{literal_feature, Config, IndexInstance, Literal};
use crate::solver::{lit, Lit, Model, SolveOutcome, SolverBackend, Status, Var};
use crate::utils::Timer;

/// One copy of the instance's variables inside a model. The subproblem model
/// replicates this block once per configuration slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotVars {
    offset: Var,
    n: usize,
}

impl SlotVars {
    pub fn var(&self, index: usize) -> Var {
        debug_assert!(index < self.n);
        self.offset + index
    }

    /// Translate an instance literal (`±(index + 1)`) into a solver literal.
    pub fn lit(&self, instance_literal: Literal) -> Lit {
        lit(self.var(literal_feature(instance_literal)), instance_literal > 0)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// All variables of this slot as positive literals.
    pub fn all_lits(&self) -> Vec<Lit> {
        (0..self.n).map(|i| lit(self.var(i), true)).collect()
    }

    pub fn extract(&self, assignment: &[bool]) -> Config {
        (0..self.n).map(|i| assignment[self.var(i)]).collect()
    }
}

/// Replicate the tree and CNF constraints of the instance into the model and
/// force the root feature. Returns the variable block.
pub fn encode_instance(instance: &IndexInstance, model: &mut Model) -> SlotVars {
    let slot = SlotVars {
        offset: model.new_vars(instance.n_all),
        n: instance.n_all,
    };

    if let Some(tree) = &instance.structure {
        for index in 0..tree.len() {
            let node = tree.node(index);
            let node_lit = |n: &crate::instances::FeatureNode<usize>| {
                lit(slot.var(n.literal.label), !n.literal.negated)
            };
            let parent = node_lit(node);
            match &node.kind {
                FeatureKind::Concrete => {}
                FeatureKind::And { children } => {
                    // optional children imply the parent; mandatory ones were
                    // contracted into it by the preprocessor
                    for &child in children {
                        let child_node = tree.node(child);
                        if child_node.mandatory
                            && child_node.literal.label == node.literal.label
                        {
                            continue;
                        }
                        model.add_clause([-node_lit(child_node), parent]);
                    }
                }
                FeatureKind::Or { children } => {
                    let mut clause: Vec<Lit> =
                        children.iter().map(|&c| node_lit(tree.node(c))).collect();
                    for &child_lit in &clause {
                        model.add_clause([-child_lit, parent]);
                    }
                    clause.push(-parent);
                    model.add_clause(clause);
                }
                FeatureKind::Alt { children } => {
                    let lits: Vec<Lit> =
                        children.iter().map(|&c| node_lit(tree.node(c))).collect();
                    for &child_lit in &lits {
                        model.add_clause([-child_lit, parent]);
                    }
                    let mut at_least_one = lits.clone();
                    at_least_one.push(-parent);
                    model.add_clause(at_least_one);
                    model.add_at_most_one(&lits);
                }
            }
        }
        let root = tree.root();
        model.add_unit(lit(slot.var(root.literal.label), !root.literal.negated));
    }

    for clause in &instance.clauses {
        model.add_clause(clause.iter().map(|&l| slot.lit(l)));
    }

    slot
}

/// Feasibility oracle over a single copy of the instance. Used to validate
/// imported configurations and to refute literal conjunctions in the CDS
/// engine.
pub struct InstanceSolver {
    instance: Arc<IndexInstance>,
    backend: Arc<dyn SolverBackend>,
    base: Model,
    slot: SlotVars,
}

impl InstanceSolver {
    pub fn new(instance: Arc<IndexInstance>, backend: Arc<dyn SolverBackend>) -> Self {
        let mut base = Model::new();
        let slot = encode_instance(&instance, &mut base);
        Self {
            instance,
            backend,
            base,
            slot,
        }
    }

    /// Decide whether the given instance literals are simultaneously
    /// feasible. Returns `None` when the backend cannot decide in time.
    pub fn literals_feasible(&self, literals: &[Literal], timer: &Timer) -> Option<bool> {
        let mut model = self.base.clone();
        for &l in literals {
            model.add_unit(self.slot.lit(l));
        }
        match self.backend.solve(&model, timer).status {
            Status::Optimal | Status::Feasible => Some(true),
            Status::Infeasible => Some(false),
            Status::Unknown => None,
        }
    }

    /// Complete a partial assignment into a total feasible configuration.
    /// Fails with `InfeasibleConfiguration` when the fixed values violate the
    /// model.
    pub fn complete(&self, partial: &HashMap<usize, bool>, timer: &Timer) -> Result<Config> {
        let mut model = self.base.clone();
        for (&index, &value) in partial {
            model.add_unit(lit(self.slot.var(index), value));
        }
        let outcome: SolveOutcome = self.backend.solve(&model, timer);
        match outcome.status {
            Status::Optimal | Status::Feasible => {
                let assignment = outcome.assignment.ok_or_else(|| {
                    Error::InvariantViolation("feasible outcome without assignment".to_string())
                })?;
                Ok(self.slot.extract(&assignment))
            }
            Status::Infeasible => Err(Error::InfeasibleConfiguration(format!(
                "configuration violates {}",
                self.instance
            ))),
            Status::Unknown => Err(Error::SolverUnknown),
        }
    }

    pub fn instance(&self) -> &Arc<IndexInstance> {
        &self.instance
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instances::{Instance, Rule};
    use crate::preprocessor::preprocess;
    use crate::solver::DpllBackend;

    fn backend() -> Arc<dyn SolverBackend> {
        Arc::new(DpllBackend)
    }

    fn rule_instance() -> Arc<IndexInstance> {
        let v = |n: &str| Rule::var(n.to_string());
        let instance = Instance::new(
            "rules",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            None,
            vec![
                Rule::or(vec![v("a"), v("b")]),
                Rule::Impl(Box::new(v("a")), Box::new(v("c"))),
            ],
        );
        Arc::new(preprocess(&instance).unwrap())
    }

    #[test]
    fn feasible_literals_are_confirmed() {
        let solver = InstanceSolver::new(rule_instance(), backend());
        let timer = Timer::new(10.0);
        // a & c is fine, a & !c contradicts the implication
        assert_eq!(solver.literals_feasible(&[1, 3], &timer), Some(true));
        assert_eq!(solver.literals_feasible(&[1, -3], &timer), Some(false));
        assert_eq!(solver.literals_feasible(&[-1, -2], &timer), Some(false));
    }

    #[test]
    fn completion_fills_free_variables() {
        let solver = InstanceSolver::new(rule_instance(), backend());
        let timer = Timer::new(10.0);
        let partial: HashMap<usize, bool> = [(0, true)].into();
        let config = solver.complete(&partial, &timer).unwrap();
        assert!(config[0]);
        assert!(config[2], "implication must force c");
    }

    #[test]
    fn completion_rejects_infeasible_fixings() {
        let solver = InstanceSolver::new(rule_instance(), backend());
        let timer = Timer::new(10.0);
        let partial: HashMap<usize, bool> = [(0, false), (1, false)].into();
        assert!(matches!(
            solver.complete(&partial, &timer),
            Err(Error::InfeasibleConfiguration(_))
        ));
    }
}
