use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use log::warn;

/// Lookup of a truth value by variable label. Implemented by the raw
/// string-keyed configurations at the crate boundary and by the dense
/// indexed configurations used internally.
pub trait Assignment<L> {
    fn value(&self, label: &L) -> Option<bool>;
}

impl Assignment<String> for HashMap<String, bool> {
    fn value(&self, label: &String) -> Option<bool> {
        self.get(label).copied()
    }
}

impl Assignment<usize> for [bool] {
    fn value(&self, label: &usize) -> Option<bool> {
        self.get(*label).copied()
    }
}

impl Assignment<usize> for Vec<bool> {
    fn value(&self, label: &usize) -> Option<bool> {
        self.get(*label).copied()
    }
}

/// An identifier for features. The negation option is for optimization: if
/// `a <-> not b` holds, all occurrences of `b` can be replaced by `not a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureLit<L> {
    pub label: L,
    pub negated: bool,
}

impl<L> FeatureLit<L> {
    pub fn new(label: L) -> Self {
        Self {
            label,
            negated: false,
        }
    }

    pub fn negate(self) -> Self {
        Self {
            label: self.label,
            negated: !self.negated,
        }
    }
}

impl<L: Clone + Eq + Hash> FeatureLit<L> {
    /// Replace the label according to the two substitution maps. An entry in
    /// `inverse` flips the negation flag.
    pub fn substitute(&self, direct: &HashMap<L, L>, inverse: &HashMap<L, L>) -> Self {
        if let Some(target) = direct.get(&self.label) {
            return Self {
                label: target.clone(),
                negated: self.negated,
            };
        }
        if let Some(target) = inverse.get(&self.label) {
            return Self {
                label: target.clone(),
                negated: !self.negated,
            };
        }
        self.clone()
    }

    pub fn is_satisfied(&self, assignment: &(impl Assignment<L> + ?Sized)) -> Option<bool> {
        assignment.value(&self.label).map(|v| v != self.negated)
    }
}

impl<L: fmt::Display> fmt::Display for FeatureLit<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "-{}", self.label)
        } else {
            write!(f, "{}", self.label)
        }
    }
}

/// The different kinds of nodes of the feature tree, with children referring
/// into the tree's node arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureKind {
    /// Composition of features. Mandatory children are active exactly when
    /// the node is active; optional children may only be active with it.
    And { children: Vec<usize> },
    /// At least one child is active iff the node is active.
    Or { children: Vec<usize> },
    /// Exactly one child is active iff the node is active.
    Alt { children: Vec<usize> },
    /// Leaf with an actual implementation behind it.
    Concrete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureNode<L> {
    pub literal: FeatureLit<L>,
    pub mandatory: bool,
    pub kind: FeatureKind,
}

impl<L> FeatureNode<L> {
    pub fn children(&self) -> &[usize] {
        match &self.kind {
            FeatureKind::And { children }
            | FeatureKind::Or { children }
            | FeatureKind::Alt { children } => children,
            FeatureKind::Concrete => &[],
        }
    }
}

/// The feature tree as a node arena. Children are always pushed before their
/// parents, so the root is the last node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTree<L> {
    nodes: Vec<FeatureNode<L>>,
    root: usize,
}

impl<L: Clone + Eq + Hash + fmt::Display> FeatureTree<L> {
    pub fn from_nodes(nodes: Vec<FeatureNode<L>>) -> Self {
        debug_assert!(!nodes.is_empty());
        let root = nodes.len() - 1;
        Self { nodes, root }
    }

    pub fn root(&self) -> &FeatureNode<L> {
        &self.nodes[self.root]
    }

    pub fn node(&self, index: usize) -> &FeatureNode<L> {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Labels of all concrete features in leaf order, first occurrence only.
    pub fn concrete_features(&self) -> Vec<L> {
        let mut seen = Vec::new();
        self.visit_post(self.root, &mut |node| {
            if node.kind == FeatureKind::Concrete && !seen.contains(&node.literal.label) {
                seen.push(node.literal.label.clone());
            }
        });
        seen
    }

    /// All labels used in the tree, concrete and composite, without duplicates.
    pub fn all_features(&self) -> Vec<L> {
        let mut seen = Vec::new();
        self.visit_post(self.root, &mut |node| {
            if !seen.contains(&node.literal.label) {
                seen.push(node.literal.label.clone());
            }
        });
        seen
    }

    fn visit_post(&self, index: usize, f: &mut impl FnMut(&FeatureNode<L>)) {
        for &child in self.nodes[index].children() {
            self.visit_post(child, f);
        }
        f(&self.nodes[index]);
    }

    /// Rebuild the tree with all literals substituted. Alt groups that are
    /// left with a single child collapse into that child, keeping the
    /// mandatory flag.
    pub fn substitute(&self, direct: &HashMap<L, L>, inverse: &HashMap<L, L>) -> Self {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let root = self.rebuild(self.root, &mut nodes, &mut |lit| {
            lit.substitute(direct, inverse)
        });
        Self { nodes, root }
    }

    /// Rebuild the tree over a new label type. The mapping must be total.
    pub fn relabel<M: Clone + Eq + Hash + fmt::Display>(
        &self,
        map: &HashMap<L, M>,
    ) -> FeatureTree<M> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let root = self.rebuild(self.root, &mut nodes, &mut |lit| FeatureLit {
            label: map[&lit.label].clone(),
            negated: lit.negated,
        });
        FeatureTree { nodes, root }
    }

    fn rebuild<M: Clone + Eq + Hash>(
        &self,
        index: usize,
        out: &mut Vec<FeatureNode<M>>,
        map_lit: &mut impl FnMut(&FeatureLit<L>) -> FeatureLit<M>,
    ) -> usize {
        let node = &self.nodes[index];
        let children: Vec<usize> = node
            .children()
            .iter()
            .map(|&c| self.rebuild(c, out, map_lit))
            .collect();
        // a one-child alternative is just that child
        if matches!(node.kind, FeatureKind::Alt { .. }) && children.len() == 1 {
            let child = children[0];
            out[child].mandatory = node.mandatory;
            return child;
        }
        let kind = match &node.kind {
            FeatureKind::And { .. } => FeatureKind::And { children },
            FeatureKind::Or { .. } => FeatureKind::Or { children },
            FeatureKind::Alt { .. } => FeatureKind::Alt { children },
            FeatureKind::Concrete => FeatureKind::Concrete,
        };
        out.push(FeatureNode {
            literal: map_lit(&node.literal),
            mandatory: node.mandatory,
            kind,
        });
        out.len() - 1
    }

    /// Checks the group constraints of the whole tree against a total
    /// assignment. The root is not implicitly forced here.
    pub fn is_feasible(&self, assignment: &(impl Assignment<L> + ?Sized)) -> bool {
        self.node_is_feasible(self.root, assignment)
    }

    fn is_active(&self, index: usize, assignment: &(impl Assignment<L> + ?Sized)) -> bool {
        self.nodes[index]
            .literal
            .is_satisfied(assignment)
            .unwrap_or(false)
    }

    fn node_is_feasible(&self, index: usize, assignment: &(impl Assignment<L> + ?Sized)) -> bool {
        let node = &self.nodes[index];
        let children = node.children();
        if !children
            .iter()
            .all(|&c| self.node_is_feasible(c, assignment))
        {
            return false;
        }
        if children.is_empty() {
            return true;
        }
        let active = self.is_active(index, assignment);
        if !active {
            let none_active = children.iter().all(|&c| !self.is_active(c, assignment));
            if !none_active {
                warn!("{} not active, but children of it are", node.literal);
            }
            return none_active;
        }
        match &node.kind {
            FeatureKind::And { children } => {
                let ok = children
                    .iter()
                    .filter(|&&c| self.nodes[c].mandatory)
                    .all(|&c| self.is_active(c, assignment));
                if !ok {
                    warn!("not all mandatory children of {} are active", node.literal);
                }
                ok
            }
            FeatureKind::Or { children } => {
                let ok = children.iter().any(|&c| self.is_active(c, assignment));
                if !ok {
                    warn!("{} active, but no child of it", node.literal);
                }
                ok
            }
            FeatureKind::Alt { children } => {
                let n_active = children
                    .iter()
                    .filter(|&&c| self.is_active(c, assignment))
                    .count();
                if n_active != 1 {
                    warn!("{} active with {} active children", node.literal, n_active);
                }
                n_active == 1
            }
            FeatureKind::Concrete => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(name: &str) -> FeatureNode<String> {
        FeatureNode {
            literal: FeatureLit::new(name.to_string()),
            mandatory: false,
            kind: FeatureKind::Concrete,
        }
    }

    /// Or(a, b) under root r.
    fn or_tree() -> FeatureTree<String> {
        let nodes = vec![
            leaf("a"),
            leaf("b"),
            FeatureNode {
                literal: FeatureLit::new("r".to_string()),
                mandatory: true,
                kind: FeatureKind::Or {
                    children: vec![0, 1],
                },
            },
        ];
        FeatureTree::from_nodes(nodes)
    }

    fn assign(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn or_needs_an_active_child() {
        let tree = or_tree();
        assert!(tree.is_feasible(&assign(&[("r", true), ("a", true), ("b", false)])));
        assert!(tree.is_feasible(&assign(&[("r", true), ("a", true), ("b", true)])));
        assert!(!tree.is_feasible(&assign(&[("r", true), ("a", false), ("b", false)])));
        assert!(!tree.is_feasible(&assign(&[("r", false), ("a", true), ("b", false)])));
        assert!(tree.is_feasible(&assign(&[("r", false), ("a", false), ("b", false)])));
    }

    #[test]
    fn alt_wants_exactly_one() {
        let nodes = vec![
            leaf("a"),
            leaf("b"),
            leaf("c"),
            FeatureNode {
                literal: FeatureLit::new("r".to_string()),
                mandatory: true,
                kind: FeatureKind::Alt {
                    children: vec![0, 1, 2],
                },
            },
        ];
        let tree = FeatureTree::from_nodes(nodes);
        assert!(tree.is_feasible(&assign(&[
            ("r", true),
            ("a", false),
            ("b", true),
            ("c", false)
        ])));
        assert!(!tree.is_feasible(&assign(&[
            ("r", true),
            ("a", true),
            ("b", true),
            ("c", false)
        ])));
        assert!(!tree.is_feasible(&assign(&[
            ("r", true),
            ("a", false),
            ("b", false),
            ("c", false)
        ])));
    }

    #[test]
    fn substitution_flips_on_inverse() {
        let tree = or_tree();
        let direct = HashMap::new();
        let inverse: HashMap<String, String> = [("b".to_string(), "a".to_string())].into();
        let tree = tree.substitute(&direct, &inverse);
        // b is now "not a"
        assert!(tree.is_feasible(&assign(&[("r", true), ("a", false)])));
        let labels = tree.concrete_features();
        assert_eq!(labels, vec!["a".to_string()]);
    }

    #[test]
    fn single_child_alt_collapses() {
        let nodes = vec![
            leaf("a"),
            FeatureNode {
                literal: FeatureLit::new("g".to_string()),
                mandatory: true,
                kind: FeatureKind::Alt { children: vec![0] },
            },
            FeatureNode {
                literal: FeatureLit::new("r".to_string()),
                mandatory: true,
                kind: FeatureKind::And { children: vec![1] },
            },
        ];
        let tree = FeatureTree::from_nodes(nodes);
        let rebuilt = tree.substitute(&HashMap::new(), &HashMap::new());
        assert_eq!(rebuilt.len(), 2);
        assert!(rebuilt.root().children().len() == 1);
        let child = rebuilt.node(rebuilt.root().children()[0]);
        assert_eq!(child.kind, FeatureKind::Concrete);
        assert!(child.mandatory);
    }
}
