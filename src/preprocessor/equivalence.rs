use std::collections::HashMap;

use crate::errors::{Error, Result};

/// Tracks which variable labels are forced to be equal, possibly with
/// inverted phase, and produces unified substitutions for every class.
///
/// A signed union-find: each entry stores its parent and whether its phase is
/// flipped relative to that parent. Merging a class with its own inversion is
/// the contradiction `x == not x` and poisons the model.
#[derive(Debug, Default)]
pub struct EquivalenceClasses {
    parent: HashMap<String, (String, bool)>,
}

impl EquivalenceClasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root of the class of `label` plus the phase of `label` relative to it.
    fn find(&mut self, label: &str) -> (String, bool) {
        let Some((parent, flipped)) = self.parent.get(label).cloned() else {
            return (label.to_string(), false);
        };
        if parent == label {
            return (parent, flipped);
        }
        let (root, parent_flipped) = self.find(&parent);
        let total = flipped != parent_flipped;
        self.parent
            .insert(label.to_string(), (root.clone(), total));
        (root, total)
    }

    fn ensure(&mut self, label: &str) {
        if !self.parent.contains_key(label) {
            self.parent
                .insert(label.to_string(), (label.to_string(), false));
        }
    }

    /// Mark two labels as equivalent; with `inverse`, as `a == not b`.
    pub fn mark_equivalent(&mut self, a: &str, b: &str, inverse: bool) -> Result<()> {
        self.ensure(a);
        self.ensure(b);
        let (root_a, phase_a) = self.find(a);
        let (root_b, phase_b) = self.find(b);
        let relation = (phase_a != phase_b) != inverse;
        if root_a == root_b {
            if relation {
                return Err(Error::InconsistentModel(format!(
                    "{a} would have to equal its own negation (via {b})"
                )));
            }
            return Ok(());
        }
        self.parent.insert(root_b, (root_a, relation));
        Ok(())
    }

    /// The equality and inverse-equality substitutions, one fresh
    /// representative label per class. The representative is derived from
    /// the textually smallest member so runs are reproducible.
    pub fn substitutions(&mut self) -> (HashMap<String, String>, HashMap<String, String>) {
        let labels: Vec<String> = self.parent.keys().cloned().collect();
        let mut classes: HashMap<String, Vec<(String, bool)>> = HashMap::new();
        for label in labels {
            let (root, phase) = self.find(&label);
            classes.entry(root).or_default().push((label, phase));
        }

        let mut direct = HashMap::new();
        let mut inverse = HashMap::new();
        for members in classes.into_values() {
            if members.len() < 2 {
                continue;
            }
            let (anchor, anchor_phase) = members
                .iter()
                .min_by(|a, b| a.0.cmp(&b.0))
                .cloned()
                .expect("class has members");
            let target = format!("SUB[{anchor}]");
            for (label, phase) in members {
                if phase == anchor_phase {
                    direct.insert(label, target.clone());
                } else {
                    inverse.insert(label, target.clone());
                }
            }
        }
        (direct, inverse)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trivial_is_empty() {
        let mut ec = EquivalenceClasses::new();
        assert_eq!(ec.substitutions(), (HashMap::new(), HashMap::new()));
    }

    #[test]
    fn two_equal_labels_share_a_target() {
        let mut ec = EquivalenceClasses::new();
        ec.mark_equivalent("a", "b", false).unwrap();
        let (direct, inverse) = ec.substitutions();
        assert_eq!(direct.get("a"), Some(&"SUB[a]".to_string()));
        assert_eq!(direct.get("b"), Some(&"SUB[a]".to_string()));
        assert!(inverse.is_empty());
    }

    #[test]
    fn inverse_pairs_split_between_maps() {
        let mut ec = EquivalenceClasses::new();
        ec.mark_equivalent("a", "b", true).unwrap();
        let (direct, inverse) = ec.substitutions();
        assert_eq!(direct.get("a"), Some(&"SUB[a]".to_string()));
        assert_eq!(inverse.get("b"), Some(&"SUB[a]".to_string()));
    }

    #[test]
    fn separate_classes_stay_separate() {
        let mut ec = EquivalenceClasses::new();
        ec.mark_equivalent("a", "b", false).unwrap();
        ec.mark_equivalent("c", "d", false).unwrap();
        let (direct, _) = ec.substitutions();
        assert_eq!(direct.get("a"), direct.get("b"));
        assert_eq!(direct.get("c"), direct.get("d"));
        assert_ne!(direct.get("a"), direct.get("c"));
    }

    #[test]
    fn transitive_inversion_is_tracked() {
        let mut ec = EquivalenceClasses::new();
        ec.mark_equivalent("a", "b", true).unwrap();
        ec.mark_equivalent("b", "c", true).unwrap();
        let (direct, inverse) = ec.substitutions();
        // a == c, both inverse to b
        assert_eq!(direct.get("a"), direct.get("c"));
        assert_eq!(inverse.get("b"), direct.get("a"));
    }

    #[test]
    fn contradiction_is_inconsistent() {
        let mut ec = EquivalenceClasses::new();
        ec.mark_equivalent("a", "b", false).unwrap();
        assert!(matches!(
            ec.mark_equivalent("a", "b", true),
            Err(Error::InconsistentModel(_))
        ));
    }

    #[test]
    fn indirect_contradiction_is_inconsistent() {
        let mut ec = EquivalenceClasses::new();
        ec.mark_equivalent("a", "b", false).unwrap();
        ec.mark_equivalent("b", "c", true).unwrap();
        assert!(matches!(
            ec.mark_equivalent("a", "c", false),
            Err(Error::InconsistentModel(_))
        ));
    }
}
