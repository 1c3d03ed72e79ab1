use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::instances::feature::Assignment;

/// A variable occurrence in a cross-tree rule. Auxiliary variables only come
/// into existence during CNF lowering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarLit<L> {
    pub label: L,
    pub negated: bool,
    pub auxiliary: bool,
}

impl<L> VarLit<L> {
    pub fn new(label: L) -> Self {
        Self {
            label,
            negated: false,
            auxiliary: false,
        }
    }

    pub fn negate(self) -> Self {
        Self {
            negated: !self.negated,
            ..self
        }
    }
}

/// Allocates fresh auxiliary variable labels for the Tseitin transformation.
#[derive(Debug, Default)]
pub struct AuxCounter {
    next: usize,
}

impl AuxCounter {
    pub fn fresh(&mut self) -> VarLit<String> {
        self.next += 1;
        VarLit {
            label: format!("__AUX[{}]", self.next),
            negated: false,
            auxiliary: true,
        }
    }
}

/// Boolean formula over variable labels, the shape of the cross-tree rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule<L> {
    Var(VarLit<L>),
    And(Vec<Rule<L>>),
    Or(Vec<Rule<L>>),
    Not(Box<Rule<L>>),
    Impl(Box<Rule<L>>, Box<Rule<L>>),
    Eq(Box<Rule<L>>, Box<Rule<L>>),
}

impl<L: Clone + Eq + Hash> Rule<L> {
    pub fn var(label: L) -> Self {
        Rule::Var(VarLit::new(label))
    }

    /// Conjunction, flattening nested conjunctions.
    pub fn and(elements: Vec<Rule<L>>) -> Self {
        let mut flat = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Rule::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Rule::And(flat)
    }

    /// Disjunction, flattening nested disjunctions.
    pub fn or(elements: Vec<Rule<L>>) -> Self {
        let mut flat = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Rule::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Rule::Or(flat)
    }

    /// Negation in negation normal form. `Eq` stays an `Eq` with one side
    /// negated; `Impl` expands.
    pub fn negated(&self) -> Self {
        match self {
            Rule::Var(v) => Rule::Var(v.clone().negate()),
            Rule::And(elements) => Rule::or(elements.iter().map(|e| e.negated()).collect()),
            Rule::Or(elements) => Rule::and(elements.iter().map(|e| e.negated()).collect()),
            Rule::Not(inner) => (**inner).clone(),
            Rule::Impl(c, i) => Rule::and(vec![(**c).clone(), i.negated()]),
            Rule::Eq(a, b) => Rule::Eq(a.clone(), Box::new(b.negated())),
        }
    }

    /// True iff the rule is `Var == Var`, the shape the equivalence
    /// contraction feeds on.
    pub fn is_variable_equivalence(&self) -> Option<(&VarLit<L>, &VarLit<L>)> {
        if let Rule::Eq(a, b) = self {
            if let (Rule::Var(va), Rule::Var(vb)) = (a.as_ref(), b.as_ref()) {
                return Some((va, vb));
            }
        }
        None
    }

    pub fn substitute(&self, direct: &HashMap<L, L>, inverse: &HashMap<L, L>) -> Self {
        match self {
            Rule::Var(v) => {
                if v.auxiliary {
                    return Rule::Var(v.clone());
                }
                if let Some(target) = direct.get(&v.label) {
                    Rule::Var(VarLit {
                        label: target.clone(),
                        negated: v.negated,
                        auxiliary: v.auxiliary,
                    })
                } else if let Some(target) = inverse.get(&v.label) {
                    Rule::Var(VarLit {
                        label: target.clone(),
                        negated: !v.negated,
                        auxiliary: v.auxiliary,
                    })
                } else {
                    Rule::Var(v.clone())
                }
            }
            Rule::And(elements) => {
                Rule::And(elements.iter().map(|e| e.substitute(direct, inverse)).collect())
            }
            Rule::Or(elements) => {
                Rule::Or(elements.iter().map(|e| e.substitute(direct, inverse)).collect())
            }
            Rule::Not(inner) => Rule::Not(Box::new(inner.substitute(direct, inverse))),
            Rule::Impl(c, i) => Rule::Impl(
                Box::new(c.substitute(direct, inverse)),
                Box::new(i.substitute(direct, inverse)),
            ),
            Rule::Eq(a, b) => Rule::Eq(
                Box::new(a.substitute(direct, inverse)),
                Box::new(b.substitute(direct, inverse)),
            ),
        }
    }

    /// Rebuild the rule over a new label type. The mapping must cover every
    /// variable of the rule.
    pub fn relabel<M: Clone + Eq + Hash>(&self, map: &HashMap<L, M>) -> Rule<M> {
        match self {
            Rule::Var(v) => Rule::Var(VarLit {
                label: map[&v.label].clone(),
                negated: v.negated,
                auxiliary: v.auxiliary,
            }),
            Rule::And(elements) => Rule::And(elements.iter().map(|e| e.relabel(map)).collect()),
            Rule::Or(elements) => Rule::Or(elements.iter().map(|e| e.relabel(map)).collect()),
            Rule::Not(inner) => Rule::Not(Box::new(inner.relabel(map))),
            Rule::Impl(c, i) => Rule::Impl(Box::new(c.relabel(map)), Box::new(i.relabel(map))),
            Rule::Eq(a, b) => Rule::Eq(Box::new(a.relabel(map)), Box::new(b.relabel(map))),
        }
    }

    /// All variable labels of the rule in first-encounter order.
    pub fn all_variables(&self) -> Vec<L> {
        let mut seen = Vec::new();
        self.collect_variables(&mut seen);
        seen
    }

    fn collect_variables(&self, seen: &mut Vec<L>) {
        match self {
            Rule::Var(v) => {
                if !seen.contains(&v.label) {
                    seen.push(v.label.clone());
                }
            }
            Rule::And(elements) | Rule::Or(elements) => {
                for element in elements {
                    element.collect_variables(seen);
                }
            }
            Rule::Not(inner) => inner.collect_variables(seen),
            Rule::Impl(a, b) | Rule::Eq(a, b) => {
                a.collect_variables(seen);
                b.collect_variables(seen);
            }
        }
    }

    /// Evaluate under a total assignment. Unassigned variables count as
    /// false, which only happens for configurations that skip auxiliaries.
    pub fn evaluate(&self, assignment: &(impl Assignment<L> + ?Sized)) -> bool {
        match self {
            Rule::Var(v) => assignment.value(&v.label).unwrap_or(false) != v.negated,
            Rule::And(elements) => elements.iter().all(|e| e.evaluate(assignment)),
            Rule::Or(elements) => elements.iter().any(|e| e.evaluate(assignment)),
            Rule::Not(inner) => !inner.evaluate(assignment),
            Rule::Impl(c, i) => !c.evaluate(assignment) || i.evaluate(assignment),
            Rule::Eq(a, b) => a.evaluate(assignment) == b.evaluate(assignment),
        }
    }
}

impl Rule<String> {
    /// Canonical CNF lowering. `Impl` and `Eq` expand structurally first;
    /// disjunctions of conjunctions introduce Tseitin auxiliaries.
    pub fn to_cnf(&self, aux: &mut AuxCounter) -> Rule<String> {
        match self {
            Rule::Var(v) => Rule::Var(v.clone()),
            Rule::And(elements) => Rule::and(elements.iter().map(|e| e.to_cnf(aux)).collect()),
            Rule::Or(elements) => {
                let elements = match Rule::or(elements.iter().map(|e| e.to_cnf(aux)).collect()) {
                    Rule::Or(elements) => elements,
                    single => return single,
                };
                if elements.iter().all(|e| matches!(e, Rule::Var(_))) {
                    return Rule::Or(elements);
                }
                // Tseitin: one selector per disjunct, at least one selected
                let mut selectors = Vec::with_capacity(elements.len());
                let mut clauses = Vec::new();
                for element in elements {
                    let selector = aux.fresh();
                    let not_selector = Rule::Var(selector.clone().negate());
                    match element {
                        Rule::And(parts) => {
                            for part in parts {
                                clauses.push(Rule::or(vec![not_selector.clone(), part]));
                            }
                        }
                        part @ Rule::Var(_) => {
                            clauses.push(Rule::or(vec![not_selector, part]));
                        }
                        other => {
                            // children were already lowered to CNF
                            unreachable!("unexpected non-CNF disjunct: {other:?}");
                        }
                    }
                    selectors.push(Rule::Var(selector));
                }
                clauses.push(Rule::Or(selectors));
                Rule::And(clauses)
            }
            Rule::Not(inner) => inner.negated().to_cnf(aux),
            Rule::Impl(c, i) => Rule::or(vec![c.negated(), (**i).clone()]).to_cnf(aux),
            Rule::Eq(a, b) => Rule::or(vec![
                Rule::and(vec![(**a).clone(), (**b).clone()]),
                Rule::and(vec![a.negated(), b.negated()]),
            ])
            .to_cnf(aux),
        }
    }

    /// The literals of a rule that already is a clause (an `Or` of variables
    /// or a single variable). Returns `None` for anything else.
    pub fn as_clause(&self) -> Option<Vec<&VarLit<String>>> {
        match self {
            Rule::Var(v) => Some(vec![v]),
            Rule::Or(elements) => elements
                .iter()
                .map(|e| match e {
                    Rule::Var(v) => Some(v),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

impl<L: fmt::Display> fmt::Display for Rule<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<L: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            elements: &[Rule<L>],
            sep: &str,
        ) -> fmt::Result {
            for (i, e) in elements.iter().enumerate() {
                if i > 0 {
                    write!(f, "{sep}")?;
                }
                write!(f, "{e}")?;
            }
            Ok(())
        }
        match self {
            Rule::Var(v) => {
                if v.negated {
                    write!(f, "-{}", v.label)
                } else {
                    write!(f, "{}", v.label)
                }
            }
            Rule::And(elements) => {
                write!(f, "AND(")?;
                join(f, elements, ", ")?;
                write!(f, ")")
            }
            Rule::Or(elements) => {
                write!(f, "OR(")?;
                join(f, elements, ", ")?;
                write!(f, ")")
            }
            Rule::Not(inner) => write!(f, "NOT({inner})"),
            Rule::Impl(c, i) => write!(f, "{c} => {i}"),
            Rule::Eq(a, b) => write!(f, "{a} == {b}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(name: &str) -> Rule<String> {
        Rule::var(name.to_string())
    }

    fn nv(name: &str) -> Rule<String> {
        Rule::Var(VarLit::new(name.to_string()).negate())
    }

    #[test]
    fn impl_becomes_a_clause() {
        let rule = Rule::Impl(Box::new(v("a")), Box::new(v("b")));
        let cnf = rule.to_cnf(&mut AuxCounter::default());
        assert_eq!(cnf, Rule::Or(vec![nv("a"), v("b")]));
    }

    #[test]
    fn eq_introduces_auxiliaries() {
        let rule = Rule::Eq(Box::new(v("a")), Box::new(v("b")));
        let mut aux = AuxCounter::default();
        let cnf = rule.to_cnf(&mut aux);
        let clauses = match &cnf {
            Rule::And(clauses) => clauses,
            other => panic!("expected conjunction of clauses, got {other}"),
        };
        assert!(clauses.iter().all(|c| c.as_clause().is_some()));
        // semantics preserved for both phases
        for (a_val, b_val) in [(true, true), (false, false)] {
            let mut assignment: HashMap<String, bool> =
                [("a".to_string(), a_val), ("b".to_string(), b_val)].into();
            // one of the two selectors satisfies the lowering
            let sat = (1..=2).any(|i| {
                assignment.insert("__AUX[1]".to_string(), i == 1);
                assignment.insert("__AUX[2]".to_string(), i == 2);
                cnf.evaluate(&assignment)
            });
            assert!(sat, "a={a_val} b={b_val} should stay satisfiable");
        }
    }

    #[test]
    fn eq_cnf_rejects_differing_phases() {
        let rule = Rule::Eq(Box::new(v("a")), Box::new(v("b")));
        let mut aux = AuxCounter::default();
        let cnf = rule.to_cnf(&mut aux);
        for (a_val, b_val) in [(true, false), (false, true)] {
            let mut assignment: HashMap<String, bool> =
                [("a".to_string(), a_val), ("b".to_string(), b_val)].into();
            let sat = [false, true].into_iter().any(|s1| {
                [false, true].into_iter().any(|s2| {
                    assignment.insert("__AUX[1]".to_string(), s1);
                    assignment.insert("__AUX[2]".to_string(), s2);
                    cnf.evaluate(&assignment)
                })
            });
            assert!(!sat, "a={a_val} b={b_val} must be unsatisfiable");
        }
    }

    #[test]
    fn nested_ors_flatten() {
        let rule = Rule::or(vec![v("a"), Rule::or(vec![v("b"), v("c")])]);
        assert_eq!(rule, Rule::Or(vec![v("a"), v("b"), v("c")]));
    }

    #[test]
    fn substitution_respects_inverse() {
        let rule = Rule::or(vec![v("a"), nv("b")]);
        let inverse: HashMap<String, String> = [("b".to_string(), "a".to_string())].into();
        let substituted = rule.substitute(&HashMap::new(), &inverse);
        assert_eq!(substituted, Rule::Or(vec![v("a"), v("a")]));
    }
}
