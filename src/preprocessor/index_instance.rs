use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::instances::{ExternalConfig, FeatureTree};
use crate::preprocessor::universe_map::{MapLabel, UniverseMap};

/// A total assignment over the indexed universe. Positions `< n_concrete`
/// are the observable projection; the rest are composite features and
/// CNF auxiliaries.
pub type Config = Vec<bool>;

/// A signed literal over indexed features: `+(i + 1)` selects feature `i`,
/// `-(i + 1)` deselects it.
pub type Literal = i32;

pub fn literal(feature: usize, positive: bool) -> Literal {
    let code = (feature + 1) as i32;
    if positive {
        code
    } else {
        -code
    }
}

pub fn literal_feature(lit: Literal) -> usize {
    (lit.unsigned_abs() - 1) as usize
}

/// The instance after preprocessing: all labels are dense integers, concrete
/// features occupy `[0, n_concrete)`, and every rule is a plain clause.
#[derive(Debug, Clone)]
pub struct IndexInstance {
    pub name: String,
    pub n_concrete: usize,
    pub n_all: usize,
    pub structure: Option<FeatureTree<usize>>,
    /// Clauses over signed literals, `±(index + 1)`.
    pub clauses: Vec<Vec<Literal>>,
    to_original_universe: UniverseMap,
}

impl IndexInstance {
    pub(crate) fn new(
        name: String,
        n_concrete: usize,
        n_all: usize,
        structure: Option<FeatureTree<usize>>,
        clauses: Vec<Vec<Literal>>,
        to_original_universe: UniverseMap,
    ) -> Self {
        Self {
            name,
            n_concrete,
            n_all,
            structure,
            clauses,
            to_original_universe,
        }
    }

    /// Translate an original-universe configuration into a partial indexed
    /// assignment. All concrete features must end up defined.
    pub fn to_indexed(&self, config: &ExternalConfig) -> Result<HashMap<usize, bool>> {
        let assignment: HashMap<MapLabel, bool> = config
            .iter()
            .map(|(k, v)| (MapLabel::Name(k.clone()), *v))
            .collect();
        let mapped = self.to_original_universe.to_mapped(&assignment);
        let mut indexed = HashMap::with_capacity(mapped.len());
        for (label, value) in mapped {
            match label {
                MapLabel::Index(i) => {
                    indexed.insert(i, value);
                }
                MapLabel::Name(name) => {
                    return Err(Error::InvariantViolation(format!(
                        "universe map produced unindexed label {name}"
                    )));
                }
            }
        }
        if let Some(missing) = (0..self.n_concrete).find(|i| !indexed.contains_key(i)) {
            return Err(Error::InfeasibleConfiguration(format!(
                "configuration does not define concrete feature index {missing}"
            )));
        }
        Ok(indexed)
    }

    /// Translate an indexed configuration back to the original universe.
    pub fn to_original(&self, config: &[bool]) -> ExternalConfig {
        let assignment: HashMap<MapLabel, bool> = config
            .iter()
            .enumerate()
            .map(|(i, v)| (MapLabel::Index(i), *v))
            .collect();
        self.to_original_universe
            .to_origin(&assignment)
            .into_iter()
            .filter_map(|(label, value)| match label {
                MapLabel::Name(name) => Some((name, value)),
                MapLabel::Index(_) => None,
            })
            .collect()
    }

    /// Evaluate the clause set against a total assignment.
    pub fn clauses_satisfied(&self, config: &[bool]) -> bool {
        self.clauses.iter().all(|clause| {
            clause
                .iter()
                .any(|&lit| config[literal_feature(lit)] == (lit > 0))
        })
    }
}

impl std::fmt::Display for IndexInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Instance[{}]<{} features, {} clauses>",
            self.name,
            self.n_concrete,
            self.clauses.len()
        )
    }
}
