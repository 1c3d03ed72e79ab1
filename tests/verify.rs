use std::collections::HashMap;

use pairlns_lib::parser;
use pairlns_lib::verify::have_equal_coverage;

fn config(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn coverage_differing_by_one_configuration_is_detected() {
    let instance = parser::parse_file("tests/data/two_groups.xml").unwrap();
    let base = vec![
        config(&[("f1", true), ("f2", true), ("f3", true), ("f4", true)]),
        config(&[("f1", true), ("f2", false), ("f3", false), ("f4", true)]),
    ];
    // adds pairs nothing in `base` realizes, e.g. (f2 deselected, f4 deselected)
    let mut larger = base.clone();
    larger.push(config(&[
        ("f1", true),
        ("f2", false),
        ("f3", true),
        ("f4", false),
    ]));

    assert!(!have_equal_coverage(&instance, &base, &larger).unwrap());
    // removing the offending configuration restores equality
    assert!(have_equal_coverage(&instance, &base, &larger[..2].to_vec()).unwrap());
}

#[test]
fn permuted_samples_are_equal() {
    let instance = parser::parse_file("tests/data/two_groups.xml").unwrap();
    let a = vec![
        config(&[("f1", true), ("f2", false), ("f3", true), ("f4", false)]),
        config(&[("f1", false), ("f2", true), ("f3", false), ("f4", true)]),
    ];
    let b: Vec<_> = a.iter().rev().cloned().collect();
    assert!(have_equal_coverage(&instance, &a, &b).unwrap());
}
