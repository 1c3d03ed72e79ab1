pub mod equivalence;
pub mod index_instance;
pub mod universe_map;

use std::collections::HashMap;

use log::{info, warn};

use crate::errors::{Error, Result};
use crate::instances::{AuxCounter, FeatureKind, Instance, Rule};

pub use equivalence::EquivalenceClasses;
pub use index_instance::{literal, literal_feature, Config, IndexInstance, Literal};
pub use universe_map::{MapLabel, UniverseMap};

/// Normalize an instance: contract equivalent variables, lower the rules to
/// CNF, and relabel everything with dense integer indices. The returned
/// instance carries the universe map for translating samples back.
pub fn preprocess(instance: &Instance) -> Result<IndexInstance> {
    info!("preprocessing {instance}");
    let (instance, eq_map) = contract_equivalences(instance)?;
    let instance = lower_to_cnf(instance);
    let indexed = assign_int_labels(instance, eq_map)?;
    info!("finished preprocessing ({indexed})");
    Ok(indexed)
}

/// Substitute variables that always carry the same (or the inverse) value:
/// pure variable equivalences from the rules and mandatory children of And
/// nodes.
fn contract_equivalences(instance: &Instance) -> Result<(Instance, UniverseMap)> {
    let mut eq = EquivalenceClasses::new();

    let mut rules = Vec::with_capacity(instance.rules.len());
    for rule in &instance.rules {
        match rule.is_variable_equivalence() {
            Some((a, b)) if !a.auxiliary && !b.auxiliary => {
                eq.mark_equivalent(&a.label, &b.label, a.negated != b.negated)?;
            }
            _ => rules.push(rule.clone()),
        }
    }

    if let Some(tree) = &instance.structure {
        for index in 0..tree.len() {
            let node = tree.node(index);
            if !matches!(node.kind, FeatureKind::And { .. }) {
                continue;
            }
            for &child in node.children() {
                let child_node = tree.node(child);
                if child_node.mandatory {
                    eq.mark_equivalent(
                        &node.literal.label,
                        &child_node.literal.label,
                        node.literal.negated != child_node.literal.negated,
                    )?;
                }
            }
        }
    }

    let (direct, inverse) = eq.substitutions();
    let mut map = UniverseMap::new(None);
    for (origin, target) in &direct {
        map.map(
            MapLabel::Name(origin.clone()),
            MapLabel::Name(target.clone()),
            false,
        );
    }
    for (origin, target) in &inverse {
        map.map(
            MapLabel::Name(origin.clone()),
            MapLabel::Name(target.clone()),
            true,
        );
    }

    let rules = rules
        .iter()
        .map(|r| r.substitute(&direct, &inverse))
        .collect();
    let structure = instance
        .structure
        .as_ref()
        .map(|t| t.substitute(&direct, &inverse));
    let mut features = Vec::with_capacity(instance.features.len());
    for feature in &instance.features {
        let substituted = direct
            .get(feature)
            .or_else(|| inverse.get(feature))
            .unwrap_or(feature)
            .clone();
        if !features.contains(&substituted) {
            features.push(substituted);
        }
    }

    Ok((
        Instance::new(format!("{}|EQ", instance.name), features, structure, rules),
        map,
    ))
}

/// Lower every rule to CNF and flatten top-level conjunctions so the rule
/// list only contains clauses.
fn lower_to_cnf(instance: Instance) -> Instance {
    let mut aux = AuxCounter::default();
    let mut rules = Vec::with_capacity(instance.rules.len());
    for rule in &instance.rules {
        match rule.to_cnf(&mut aux) {
            Rule::And(clauses) => rules.extend(clauses),
            clause => rules.push(clause),
        }
    }
    Instance::new(
        format!("{}|CNF", instance.name),
        instance.features,
        instance.structure,
        rules,
    )
}

/// Substitute all labels with dense indices, concrete features first, and
/// compose the final universe map.
fn assign_int_labels(instance: Instance, eq_map: UniverseMap) -> Result<IndexInstance> {
    fn intern(
        label: &str,
        indices: &mut HashMap<String, usize>,
        map: &mut UniverseMap,
        counter: &mut usize,
    ) {
        if !indices.contains_key(label) {
            indices.insert(label.to_string(), *counter);
            map.map(
                MapLabel::Name(label.to_string()),
                MapLabel::Index(*counter),
                false,
            );
            *counter += 1;
        }
    }

    let mut map = UniverseMap::new(Some(eq_map));
    let mut indices: HashMap<String, usize> = HashMap::new();
    let mut counter = 0usize;

    for feature in &instance.features {
        intern(feature, &mut indices, &mut map, &mut counter);
    }
    let n_concrete = counter;

    let mut clauses = Vec::with_capacity(instance.rules.len());
    for rule in &instance.rules {
        for var in rule.all_variables() {
            intern(&var, &mut indices, &mut map, &mut counter);
        }
        let vars = rule.as_clause().ok_or_else(|| {
            Error::InvariantViolation(format!("rule survived CNF lowering non-flat: {rule}"))
        })?;
        clauses.push(
            vars.into_iter()
                .map(|v| literal(indices[&v.label], !v.negated))
                .collect(),
        );
    }

    let structure = match &instance.structure {
        Some(tree) => {
            for label in tree.all_features() {
                intern(&label, &mut indices, &mut map, &mut counter);
            }
            Some(tree.relabel(&indices))
        }
        None => None,
    };

    // concrete features should be anchored somewhere
    let mut anchored: std::collections::HashSet<usize> =
        clauses.iter().flatten().map(|&l| literal_feature(l)).collect();
    if let Some(tree) = &structure {
        anchored.extend(tree.all_features());
    }
    for (feature, &index) in indices.iter() {
        if index < n_concrete && !anchored.contains(&index) {
            warn!("concrete feature {feature} appears in neither tree nor rules");
        }
    }

    Ok(IndexInstance::new(
        instance.name,
        n_concrete,
        counter,
        structure,
        clauses,
        map,
    ))
}
