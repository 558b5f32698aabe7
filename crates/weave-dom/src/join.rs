#![forbid(unsafe_code)]

//! Keyed enter/update/exit data join.
//!
//! A join matches existing nodes against a new data sequence. Without keys
//! nodes and data pair up by position; with keys they pair up by equal key.
//!
//! # Invariants
//!
//! 1. Every data index ends up in exactly one of enter or update.
//! 2. Every input node ends up in exactly one of update or exit.
//! 3. With keys, a node key claimed once is never claimed again: duplicate
//!    node keys exit and duplicate data keys enter.

use std::hash::Hash;

use ahash::AHashMap;

use crate::document::{Document, NodeId};
use crate::error::DomError;

/// Outcome of a join for one data index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSlot {
    /// No node matched; a node must be created.
    Enter,
    /// The existing node matched and is kept.
    Update(NodeId),
}

impl JoinSlot {
    /// The matched node, if any.
    #[must_use]
    pub fn node(self) -> Option<NodeId> {
        match self {
            Self::Enter => None,
            Self::Update(node) => Some(node),
        }
    }
}

/// Result of joining nodes against data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlan {
    /// One slot per data index, in data order.
    pub slots: Vec<JoinSlot>,
    /// Nodes that matched no data, in their original order.
    pub exit: Vec<NodeId>,
}

impl JoinPlan {
    /// Data indices that need a new node.
    pub fn enter_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, JoinSlot::Enter))
            .map(|(i, _)| i)
    }

    /// First matched node after data index `index`, used as the insertion
    /// point for entering nodes.
    #[must_use]
    pub fn next_update_after(&self, index: usize) -> Option<NodeId> {
        self.slots.iter().skip(index + 1).find_map(|s| s.node())
    }
}

/// Join by position.
#[must_use]
pub fn join_by_index(nodes: &[NodeId], data_len: usize) -> JoinPlan {
    let slots = (0..data_len)
        .map(|i| nodes.get(i).map_or(JoinSlot::Enter, |n| JoinSlot::Update(*n)))
        .collect();
    let exit = nodes.iter().skip(data_len).copied().collect();
    JoinPlan { slots, exit }
}

/// Join by key. `nodes` carries each node's key (computed from its bound
/// datum, `None` when it has none); `data_keys` carries one key per datum.
#[must_use]
pub fn join_by_key<K: Eq + Hash>(nodes: &[(NodeId, Option<K>)], data_keys: &[K]) -> JoinPlan {
    let mut by_key: AHashMap<&K, NodeId> = AHashMap::with_capacity(nodes.len());
    let mut exit = Vec::new();
    for (node, key) in nodes {
        match key {
            Some(k) if !by_key.contains_key(k) => {
                by_key.insert(k, *node);
            }
            _ => exit.push(*node),
        }
    }

    let slots = data_keys
        .iter()
        .map(|k| by_key.remove(k).map_or(JoinSlot::Enter, JoinSlot::Update))
        .collect();

    let leftover: Vec<NodeId> = by_key.into_values().collect();
    let mut exit: Vec<NodeId> = nodes
        .iter()
        .map(|(n, _)| *n)
        .filter(|n| exit.contains(n) || leftover.contains(n))
        .collect();
    exit.dedup();
    JoinPlan { slots, exit }
}

impl Document {
    /// Reorder nodes so that their document order matches `nodes`. Nodes
    /// with different parents are left where they are.
    pub fn order(&mut self, nodes: &[NodeId]) -> Result<(), DomError> {
        let mut iter = nodes.iter().rev();
        let Some(mut next) = iter.next().copied() else {
            return Ok(());
        };
        for node in iter.copied() {
            if let (Some(parent), Some(next_parent)) = (self.parent(node), self.parent(next))
                && parent == next_parent
            {
                let siblings = self.children(parent);
                let pos = siblings.iter().position(|c| *c == node);
                let next_pos = siblings.iter().position(|c| *c == next);
                if pos > next_pos {
                    self.insert_before(parent, node, Some(next))?;
                }
            }
            next = node;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(doc: &mut Document, n: usize) -> Vec<NodeId> {
        (0..n).map(|_| doc.create_element("p")).collect()
    }

    #[test]
    fn index_join_splits_enter_and_exit() {
        let mut doc = Document::new();
        let nodes = ids(&mut doc, 3);
        let plan = join_by_index(&nodes, 2);
        assert_eq!(plan.slots, vec![JoinSlot::Update(nodes[0]), JoinSlot::Update(nodes[1])]);
        assert_eq!(plan.exit, vec![nodes[2]]);

        let plan = join_by_index(&nodes[..1], 3);
        assert_eq!(plan.enter_indices().collect::<Vec<_>>(), vec![1, 2]);
        assert!(plan.exit.is_empty());
    }

    #[test]
    fn key_join_follows_keys() {
        let mut doc = Document::new();
        let nodes = ids(&mut doc, 3);
        let keyed = vec![
            (nodes[0], Some("a")),
            (nodes[1], Some("b")),
            (nodes[2], Some("c")),
        ];
        let plan = join_by_key(&keyed, &["c", "x", "a"]);
        assert_eq!(
            plan.slots,
            vec![JoinSlot::Update(nodes[2]), JoinSlot::Enter, JoinSlot::Update(nodes[0])]
        );
        assert_eq!(plan.exit, vec![nodes[1]]);
        assert_eq!(plan.next_update_after(1), Some(nodes[0]));
    }

    #[test]
    fn duplicate_keys() {
        let mut doc = Document::new();
        let nodes = ids(&mut doc, 3);
        let keyed = vec![(nodes[0], Some(1)), (nodes[1], Some(1)), (nodes[2], None)];
        let plan = join_by_key(&keyed, &[1, 1]);
        assert_eq!(plan.slots, vec![JoinSlot::Update(nodes[0]), JoinSlot::Enter]);
        assert_eq!(plan.exit, vec![nodes[1], nodes[2]]);
    }

    #[test]
    fn order_moves_nodes_into_data_order() {
        let mut doc = Document::new();
        let root = doc.create_element("ul");
        let nodes = ids(&mut doc, 4);
        for n in &nodes {
            doc.append_child(root, *n).unwrap();
        }
        let wanted = vec![nodes[3], nodes[1], nodes[0], nodes[2]];
        doc.order(&wanted).unwrap();
        assert_eq!(doc.children(root), wanted.as_slice());
    }

    proptest! {
        #[test]
        fn key_join_partitions(node_keys in proptest::collection::vec(0u8..8, 0..12),
                               data_keys in proptest::collection::vec(0u8..8, 0..12)) {
            let mut doc = Document::new();
            let keyed: Vec<(NodeId, Option<u8>)> = node_keys
                .iter()
                .map(|k| (doc.create_element("i"), Some(*k)))
                .collect();
            let plan = join_by_key(&keyed, &data_keys);
            prop_assert_eq!(plan.slots.len(), data_keys.len());

            let updated: Vec<NodeId> = plan.slots.iter().filter_map(|s| s.node()).collect();
            for (node, _) in &keyed {
                let in_update = updated.iter().filter(|n| *n == node).count();
                let in_exit = plan.exit.iter().filter(|n| *n == node).count();
                prop_assert_eq!(in_update + in_exit, 1);
            }
            for (slot, key) in plan.slots.iter().zip(&data_keys) {
                if let JoinSlot::Update(node) = slot {
                    let node_key = keyed.iter().find(|(n, _)| n == node).and_then(|(_, k)| *k);
                    prop_assert_eq!(node_key, Some(*key));
                }
            }
        }
    }
}
