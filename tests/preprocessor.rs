use std::collections::HashMap;

use pairlns_lib::parser;
use pairlns_lib::preprocessor::preprocess;

fn config(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn equivalence_rule_collapses_features() {
    let instance = parser::parse_file("tests/data/equivalent.xml").unwrap();
    assert_eq!(instance.features, vec!["a", "b", "c"]);

    let indexed = preprocess(&instance).unwrap();
    // a and b share a label after contraction
    assert_eq!(indexed.n_concrete, 2);
}

#[test]
fn merged_features_round_trip() {
    let instance = parser::parse_file("tests/data/equivalent.xml").unwrap();
    let indexed = preprocess(&instance).unwrap();

    for (a, c) in [(true, true), (true, false), (false, true), (false, false)] {
        let external = config(&[("a", a), ("b", a), ("c", c), ("root", true)]);
        let partial = indexed.to_indexed(&external).unwrap();
        let mut internal = vec![false; indexed.n_all];
        for (index, value) in partial {
            internal[index] = value;
        }
        let back = indexed.to_original(&internal);
        // b always mirrors a after the round trip
        assert_eq!(back.get("a"), Some(&a));
        assert_eq!(back.get("b"), Some(&a));
        assert_eq!(back.get("c"), Some(&c));
    }
}

#[test]
fn mandatory_groups_are_contracted_into_the_root() {
    let instance = parser::parse_file("tests/data/two_groups.xml").unwrap();
    let indexed = preprocess(&instance).unwrap();
    assert_eq!(indexed.n_concrete, 4);
    // root, left and right merge into a single composite label
    assert_eq!(indexed.n_all, 5);
}

#[test]
fn dimacs_instances_have_no_structure() {
    let instance = parser::parse_file("tests/data/small.dimacs").unwrap();
    assert_eq!(instance.features.len(), 5);
    let indexed = preprocess(&instance).unwrap();
    assert!(indexed.structure.is_none());
    assert_eq!(indexed.n_concrete, 5);
    assert_eq!(indexed.clauses.len(), 3);
}
