use std::collections::HashMap;

/// A variable label somewhere along the preprocessing chain: a name from the
/// source model (or a substitution product) or a dense integer index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapLabel {
    Name(String),
    Index(usize),
}

impl From<&str> for MapLabel {
    fn from(name: &str) -> Self {
        MapLabel::Name(name.to_string())
    }
}

impl From<usize> for MapLabel {
    fn from(index: usize) -> Self {
        MapLabel::Index(index)
    }
}

/// Bidirectional mapping between the universe before and after one
/// preprocessing step, composable into a chain.
///
/// Every origin element maps to exactly one target, possibly phase-inverted;
/// a target may collect several origins (an equivalence class).
#[derive(Debug, Default, Clone)]
pub struct UniverseMap {
    chain: Option<Box<UniverseMap>>,
    /// target -> (plain origins, inverted origins)
    origins: HashMap<MapLabel, (Vec<MapLabel>, Vec<MapLabel>)>,
    /// origin -> (inverted, target)
    targets: HashMap<MapLabel, (bool, MapLabel)>,
}

impl UniverseMap {
    pub fn new(chain: Option<UniverseMap>) -> Self {
        Self {
            chain: chain.map(Box::new),
            origins: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    /// Record `origin -> target`. Every origin may be mapped only once.
    pub fn map(&mut self, origin: MapLabel, target: MapLabel, inverse: bool) {
        debug_assert!(
            !self.targets.contains_key(&origin),
            "every origin element can only be mapped once"
        );
        let entry = self.origins.entry(target.clone()).or_default();
        if inverse {
            entry.1.push(origin.clone());
        } else {
            entry.0.push(origin.clone());
        }
        self.targets.insert(origin, (inverse, target));
    }

    /// Translate an assignment from the origin universe to the mapped one.
    /// Labels without a target (auxiliaries of later stages, already-replaced
    /// class members) are dropped.
    pub fn to_mapped(&self, assignment: &HashMap<MapLabel, bool>) -> HashMap<MapLabel, bool> {
        let mut staged = assignment.clone();
        if let Some(chain) = &self.chain {
            staged.extend(chain.to_mapped(assignment));
        }
        let mut mapped = HashMap::new();
        for (label, value) in staged {
            if let Some((inverse, target)) = self.targets.get(&label) {
                mapped.insert(target.clone(), value != *inverse);
            }
        }
        mapped
    }

    /// Translate an assignment from the mapped universe back to the origin
    /// universe. Unmapped labels pass through unchanged.
    pub fn to_origin(&self, assignment: &HashMap<MapLabel, bool>) -> HashMap<MapLabel, bool> {
        let mut origin = HashMap::new();
        for (label, value) in assignment {
            match self.origins.get(label) {
                Some((plain, inverted)) => {
                    for o in plain {
                        origin.insert(o.clone(), *value);
                    }
                    for o in inverted {
                        origin.insert(o.clone(), !*value);
                    }
                }
                None => {
                    origin.insert(label.clone(), *value);
                }
            }
        }
        match &self.chain {
            Some(chain) => chain.to_origin(&origin),
            None => origin,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(n: &str) -> MapLabel {
        MapLabel::from(n)
    }

    #[test]
    fn round_trip_with_inversion() {
        let mut map = UniverseMap::new(None);
        map.map(name("a"), name("s"), false);
        map.map(name("b"), name("s"), true);

        let assignment: HashMap<MapLabel, bool> = [(name("a"), true), (name("b"), false)].into();
        let mapped = map.to_mapped(&assignment);
        assert_eq!(mapped, [(name("s"), true)].into());

        let back = map.to_origin(&mapped);
        assert_eq!(back.get(&name("a")), Some(&true));
        assert_eq!(back.get(&name("b")), Some(&false));
    }

    #[test]
    fn chain_composes_both_directions() {
        // stage 1: contract a == b into s
        let mut eq = UniverseMap::new(None);
        eq.map(name("a"), name("s"), false);
        eq.map(name("b"), name("s"), false);
        // stage 2: index s and c
        let mut index = UniverseMap::new(Some(eq));
        index.map(name("s"), MapLabel::from(0), false);
        index.map(name("c"), MapLabel::from(1), false);

        let assignment: HashMap<MapLabel, bool> =
            [(name("a"), true), (name("b"), true), (name("c"), false)].into();
        let mapped = index.to_mapped(&assignment);
        assert_eq!(
            mapped,
            [(MapLabel::from(0), true), (MapLabel::from(1), false)].into()
        );

        let back = index.to_origin(&mapped);
        assert_eq!(back.get(&name("a")), Some(&true));
        assert_eq!(back.get(&name("b")), Some(&true));
        assert_eq!(back.get(&name("c")), Some(&false));
    }

    #[test]
    fn unmapped_labels_are_dropped_on_the_way_in() {
        let mut map = UniverseMap::new(None);
        map.map(name("a"), MapLabel::from(0), false);
        let assignment: HashMap<MapLabel, bool> = [(name("a"), true), (name("x"), true)].into();
        let mapped = map.to_mapped(&assignment);
        assert_eq!(mapped.len(), 1);
    }
}
