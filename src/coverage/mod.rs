use bitvec::prelude::*;

use crate::preprocessor::{literal, literal_feature, Literal};

/// An unordered pair of signed literals on distinct features, stored
/// canonically with the smaller feature index first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TuplePair {
    a: Literal,
    b: Literal,
}

impl TuplePair {
    pub fn new(x: Literal, y: Literal) -> Self {
        debug_assert_ne!(literal_feature(x), literal_feature(y));
        if literal_feature(x) < literal_feature(y) {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn a(&self) -> Literal {
        self.a
    }

    pub fn b(&self) -> Literal {
        self.b
    }

    pub fn feature_a(&self) -> usize {
        literal_feature(self.a)
    }

    pub fn feature_b(&self) -> usize {
        literal_feature(self.b)
    }

    pub fn positive_a(&self) -> bool {
        self.a > 0
    }

    pub fn positive_b(&self) -> bool {
        self.b > 0
    }

    /// True if a total assignment over the concrete features realizes both
    /// literals.
    pub fn covered_by(&self, config: &[bool]) -> bool {
        config[self.feature_a()] == self.positive_a() && config[self.feature_b()] == self.positive_b()
    }
}

/// Dense bit index of a tuple: four polarity slots per feature pair.
fn tuple_bit(pair: &TuplePair) -> usize {
    let (i, j) = (pair.feature_a(), pair.feature_b());
    let polarity = (pair.positive_a() as usize) * 2 + pair.positive_b() as usize;
    (j * (j - 1) / 2 + i) * 4 + polarity
}

fn tuple_from_bit(bit: usize) -> TuplePair {
    let pair_index = bit / 4;
    let polarity = bit % 4;
    // invert j * (j - 1) / 2 <= pair_index
    let mut j = ((1.0 + 8.0 * pair_index as f64).sqrt() as usize + 1) / 2;
    while j * (j - 1) / 2 > pair_index {
        j -= 1;
    }
    while (j + 1) * j / 2 <= pair_index {
        j += 1;
    }
    let i = pair_index - j * (j - 1) / 2;
    TuplePair::new(
        literal(i, polarity & 2 != 0),
        literal(j, polarity & 1 != 0),
    )
}

/// Tracks which feasible literal pairs are still missing while a sample is
/// (re)built. The feasible set is fixed at construction from a sample that
/// is assumed to cover every feasible pair.
#[derive(Debug, Clone)]
pub struct CoverageSet {
    n_concrete: usize,
    feasible: BitVec,
    missing: BitVec,
    n_feasible: usize,
    n_missing: usize,
}

impl CoverageSet {
    pub fn new(sample: &[Vec<bool>], n_concrete: usize) -> Self {
        let bits = n_concrete * (n_concrete.saturating_sub(1)) / 2 * 4;
        let mut feasible = bitvec![0; bits];
        let mut n_feasible = 0;
        for config in sample {
            for_each_pair(config, n_concrete, |pair| {
                let bit = tuple_bit(&pair);
                if !feasible[bit] {
                    feasible.set(bit, true);
                    n_feasible += 1;
                }
            });
        }
        Self {
            n_concrete,
            missing: feasible.clone(),
            feasible,
            n_feasible,
            n_missing: n_feasible,
        }
    }

    pub fn n_concrete(&self) -> usize {
        self.n_concrete
    }

    /// Number of feasible tuples, the edge count of the transaction graph.
    pub fn len(&self) -> usize {
        self.n_feasible
    }

    pub fn is_empty(&self) -> bool {
        self.n_feasible == 0
    }

    pub fn num_missing(&self) -> usize {
        self.n_missing
    }

    pub fn contains(&self, pair: &TuplePair) -> bool {
        self.feasible[tuple_bit(pair)]
    }

    pub fn is_missing(&self, pair: &TuplePair) -> bool {
        self.missing[tuple_bit(pair)]
    }

    /// Mark every pair realized by the configuration as covered.
    pub fn cover(&mut self, config: &[bool]) {
        debug_assert!(config.len() >= self.n_concrete);
        for_each_pair(config, self.n_concrete, |pair| {
            let bit = tuple_bit(&pair);
            if self.missing[bit] {
                self.missing.set(bit, false);
                self.n_missing -= 1;
            }
        });
    }

    /// The still-missing tuples, in stable ascending bit order.
    pub fn missing_tuples(&self) -> Vec<TuplePair> {
        self.missing.iter_ones().map(tuple_from_bit).collect()
    }

    /// Reset the missing set back to the full feasible set.
    pub fn clear(&mut self) {
        self.missing = self.feasible.clone();
        self.n_missing = self.n_feasible;
    }
}

/// Enumerate the canonical literal pairs of a configuration's concrete
/// projection.
pub fn for_each_pair(config: &[bool], n_concrete: usize, mut f: impl FnMut(TuplePair)) {
    for j in 1..n_concrete {
        for i in 0..j {
            f(TuplePair::new(
                literal(i, config[i]),
                literal(j, config[j]),
            ));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bit_encoding_round_trips() {
        let n = 20;
        for j in 1..n {
            for i in 0..j {
                for polarity in 0..4 {
                    let pair = TuplePair::new(
                        literal(i, polarity & 2 != 0),
                        literal(j, polarity & 1 != 0),
                    );
                    assert_eq!(tuple_from_bit(tuple_bit(&pair)), pair);
                }
            }
        }
    }

    #[test]
    fn canonical_order_is_by_feature() {
        let pair = TuplePair::new(literal(3, true), literal(1, false));
        assert_eq!(pair.feature_a(), 1);
        assert_eq!(pair.feature_b(), 3);
        assert!(!pair.positive_a());
        assert!(pair.positive_b());
    }

    #[test]
    fn covering_removes_tuples() {
        // two configs over three features
        let sample = vec![vec![true, true, false], vec![false, true, true]];
        let mut cov = CoverageSet::new(&sample, 3);
        // 3 pairs per config, none shared
        assert_eq!(cov.len(), 6);
        assert_eq!(cov.num_missing(), 6);

        cov.cover(&[true, true, false]);
        assert_eq!(cov.num_missing(), 3);
        let missing = cov.missing_tuples();
        assert_eq!(missing.len(), 3);
        assert!(missing
            .iter()
            .all(|t| t.covered_by(&[false, true, true])));

        cov.cover(&[false, true, true]);
        assert_eq!(cov.num_missing(), 0);

        cov.clear();
        assert_eq!(cov.num_missing(), 6);
    }

    #[test]
    fn infeasible_pairs_are_not_tracked() {
        let sample = vec![vec![true, true]];
        let cov = CoverageSet::new(&sample, 2);
        assert!(cov.contains(&TuplePair::new(literal(0, true), literal(1, true))));
        assert!(!cov.contains(&TuplePair::new(literal(0, false), literal(1, true))));
    }
}
