use std::collections::HashSet;

use itertools::Itertools;

use crate::errors::{Error, Result};
use crate::instances::{ExternalConfig, Instance};

/// A canonical interaction over feature names: both literals ordered by name.
type Interaction = (String, bool, String, bool);

fn interactions(
    instance: &Instance,
    sample: &[ExternalConfig],
) -> Result<HashSet<Interaction>> {
    let mut set = HashSet::new();
    for (position, config) in sample.iter().enumerate() {
        let mut values = Vec::with_capacity(instance.features.len());
        for feature in &instance.features {
            let value = config.get(feature).ok_or_else(|| {
                Error::MalformedInput(format!(
                    "configuration {position} does not define concrete feature {feature}"
                ))
            })?;
            values.push((feature.clone(), *value));
        }
        for ((f1, v1), (f2, v2)) in values.iter().tuple_combinations() {
            let interaction = if f1 < f2 {
                (f1.clone(), *v1, f2.clone(), *v2)
            } else {
                (f2.clone(), *v2, f1.clone(), *v1)
            };
            set.insert(interaction);
        }
    }
    Ok(set)
}

/// Check that two samples realize exactly the same feasible literal pairs
/// over the concrete features of the instance. The correctness gate at the
/// end of every optimization run.
pub fn have_equal_coverage(
    instance: &Instance,
    sample_a: &[ExternalConfig],
    sample_b: &[ExternalConfig],
) -> Result<bool> {
    Ok(interactions(instance, sample_a)? == interactions(instance, sample_b)?)
}

#[cfg(test)]
mod test {
    use super::*;

    fn instance() -> Instance {
        Instance::new(
            "v",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            None,
            vec![],
        )
    }

    fn config(a: bool, b: bool, c: bool) -> ExternalConfig {
        [
            ("a".to_string(), a),
            ("b".to_string(), b),
            ("c".to_string(), c),
        ]
        .into()
    }

    #[test]
    fn identical_samples_have_equal_coverage() {
        let sample = vec![config(true, false, true), config(false, true, false)];
        assert!(have_equal_coverage(&instance(), &sample, &sample).unwrap());
    }

    #[test]
    fn order_and_duplicates_do_not_matter() {
        let a = vec![
            config(true, false, true),
            config(false, true, false),
            config(false, true, false),
        ];
        let b = vec![config(false, true, false), config(true, false, true)];
        assert!(have_equal_coverage(&instance(), &a, &b).unwrap());
    }

    #[test]
    fn one_extra_pair_breaks_equality() {
        let base = vec![config(true, true, true)];
        // differs in exactly the pairs of the second configuration
        let more = vec![config(true, true, true), config(true, true, false)];
        assert!(!have_equal_coverage(&instance(), &base, &more).unwrap());
        // dropping the offending configuration restores equality
        assert!(have_equal_coverage(&instance(), &base, &more[..1].to_vec()).unwrap());
    }

    #[test]
    fn extra_non_concrete_keys_are_ignored() {
        let mut with_extra = config(true, false, true);
        with_extra.insert("composite".to_string(), true);
        assert!(have_equal_coverage(
            &instance(),
            &[config(true, false, true)],
            &[with_extra]
        )
        .unwrap());
    }

    #[test]
    fn missing_concrete_feature_is_an_error() {
        let mut incomplete = config(true, false, true);
        incomplete.remove("b");
        assert!(matches!(
            have_equal_coverage(&instance(), &[config(true, false, true)], &[incomplete]),
            Err(Error::MalformedInput(_))
        ));
    }
}
