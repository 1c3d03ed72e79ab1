pub mod feature;
pub mod sat_formula;

use std::collections::HashMap;

pub use feature::{Assignment, FeatureKind, FeatureLit, FeatureNode, FeatureTree};
pub use sat_formula::{AuxCounter, Rule, VarLit};

/// A configuration over the original universe, keyed by feature name.
pub type ExternalConfig = HashMap<String, bool>;

/// A sample over the original universe.
pub type ExternalSample = Vec<ExternalConfig>;

/// A feature-model instance as parsed from its source, before preprocessing.
///
/// Three fundamental containers:
/// 1. `features`: all concrete feature labels, the universe the samples
///    live in.
/// 2. `structure`: the feature tree. DIMACS inputs have none.
/// 3. `rules`: cross-tree constraints every configuration must satisfy.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub features: Vec<String>,
    pub structure: Option<FeatureTree<String>>,
    pub rules: Vec<Rule<String>>,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        features: Vec<String>,
        structure: Option<FeatureTree<String>>,
        rules: Vec<Rule<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            structure,
            rules,
        }
    }

    /// Checks that a configuration assigns every concrete feature.
    pub fn is_fully_defined(&self, config: &ExternalConfig) -> bool {
        self.features.iter().all(|f| config.contains_key(f))
    }

    /// Evaluate tree and rules against a total assignment. The root of the
    /// structure tree must be active.
    pub fn is_feasible(&self, config: &ExternalConfig) -> bool {
        if let Some(structure) = &self.structure {
            let root_active = structure
                .root()
                .literal
                .is_satisfied(config)
                .unwrap_or(false);
            if !root_active || !structure.is_feasible(config) {
                return false;
            }
        }
        self.rules.iter().all(|rule| rule.evaluate(config))
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Instance[{}]<{} features, {} rules>",
            self.name,
            self.features.len(),
            self.rules.len()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn instance() -> Instance {
        Instance::new(
            "m",
            vec!["a".to_string(), "b".to_string()],
            None,
            vec![Rule::Impl(
                Box::new(Rule::var("a".to_string())),
                Box::new(Rule::var("b".to_string())),
            )],
        )
    }

    fn config(a: bool, b: bool) -> ExternalConfig {
        [("a".to_string(), a), ("b".to_string(), b)].into()
    }

    #[test]
    fn fully_defined_needs_every_concrete_feature() {
        let instance = instance();
        assert!(instance.is_fully_defined(&config(true, false)));
        let mut partial = config(true, false);
        partial.remove("b");
        assert!(!instance.is_fully_defined(&partial));
    }

    #[test]
    fn rules_gate_feasibility() {
        let instance = instance();
        assert!(instance.is_feasible(&config(true, true)));
        assert!(instance.is_feasible(&config(false, false)));
        assert!(!instance.is_feasible(&config(true, false)));
    }
}
