// Node-by-node pairing of the old and new call trees
//
// Children are matched by call signature; repeated calls to the same
// signature are matched by rank, either in call order or in
// execution-order-index (EOI) order. Calls present in only one version are
// mirrored into the other tree as ADDED/REMOVED sentinel subtrees, so after
// pairing every node has exactly one counterpart.

use super::node::{CallTree, NodeId, Sentinel};
use crate::comparator::CompareData;
use crate::error::{CauseSearchError, Result};
use crate::stats::Summary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Which version's tree a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Old,
    New,
}

/// Both versions' trees plus the counterpart relation between their nodes
///
/// Nodes are addressed by their id in the old tree; the new-tree
/// counterpart is looked up through the pairing, never through an embedded
/// pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreePair {
    old: CallTree,
    new: CallTree,
    old_to_new: Vec<NodeId>,
    new_to_old: Vec<NodeId>,
}

enum ChildMatch {
    Both(NodeId, NodeId),
    OnlyOld(NodeId),
    OnlyNew(NodeId),
}

impl CallTreePair {
    /// Pair two independently read trees
    ///
    /// The roots are always paired with each other. Fails with
    /// `StructuralMismatch` if repeated sibling calls cannot be ordered
    /// consistently, or if either tree already contains sentinel nodes.
    pub fn pair(mut old: CallTree, mut new: CallTree, ignore_eois: bool) -> Result<Self> {
        for tree in [&old, &new] {
            if let Some(id) = tree.ids().find(|&id| tree.node(id).is_sentinel()) {
                return Err(CauseSearchError::StructuralMismatch {
                    parent: tree.node(tree.node(id).parent().unwrap_or(id)).call().to_string(),
                    reason: format!("version {} already contains a sentinel node", tree.version()),
                });
            }
        }

        let mut old_to_new: Vec<Option<NodeId>> = vec![None; old.len()];
        let mut new_to_old: Vec<Option<NodeId>> = vec![None; new.len()];

        let mut queue = VecDeque::new();
        link(&mut old_to_new, &mut new_to_old, old.root(), new.root());
        queue.push_back((old.root(), new.root()));

        while let Some((old_id, new_id)) = queue.pop_front() {
            for child_match in match_children(&old, old_id, &new, new_id, ignore_eois)? {
                match child_match {
                    ChildMatch::Both(old_child, new_child) => {
                        link(&mut old_to_new, &mut new_to_old, old_child, new_child);
                        queue.push_back((old_child, new_child));
                    }
                    ChildMatch::OnlyOld(old_child) => {
                        for (source, mirror) in mirror_subtree(&old, old_child, &mut new, new_id, Sentinel::Removed) {
                            link(&mut old_to_new, &mut new_to_old, source, mirror);
                        }
                    }
                    ChildMatch::OnlyNew(new_child) => {
                        for (source, mirror) in mirror_subtree(&new, new_child, &mut old, old_id, Sentinel::Added) {
                            link(&mut old_to_new, &mut new_to_old, mirror, source);
                        }
                    }
                }
            }
        }

        let old_to_new = complete(old_to_new, &old)?;
        let new_to_old = complete(new_to_old, &new)?;

        tracing::debug!(
            old_nodes = old.len(),
            new_nodes = new.len(),
            "Paired call trees of {} and {}",
            old.version(),
            new.version()
        );

        Ok(Self {
            old,
            new,
            old_to_new,
            new_to_old,
        })
    }

    pub fn old(&self) -> &CallTree {
        &self.old
    }

    pub fn new_tree(&self) -> &CallTree {
        &self.new
    }

    pub fn tree(&self, side: Side) -> &CallTree {
        match side {
            Side::Old => &self.old,
            Side::New => &self.new,
        }
    }

    pub fn root(&self) -> NodeId {
        self.old.root()
    }

    /// New-tree counterpart of an old-tree node
    pub fn counterpart(&self, old_id: NodeId) -> NodeId {
        self.old_to_new[old_id.0]
    }

    /// Old-tree counterpart of a new-tree node
    pub fn counterpart_of_new(&self, new_id: NodeId) -> NodeId {
        self.new_to_old[new_id.0]
    }

    /// Id of the pair's node on `side`
    pub fn node_on(&self, old_id: NodeId, side: Side) -> NodeId {
        match side {
            Side::Old => old_id,
            Side::New => self.counterpart(old_id),
        }
    }

    /// Sentinel marking the pair, if the call exists in only one version
    pub fn sentinel(&self, old_id: NodeId) -> Option<Sentinel> {
        self.old
            .node(old_id)
            .sentinel()
            .or_else(|| self.new.node(self.counterpart(old_id)).sentinel())
    }

    /// True for ADDED/REMOVED pairs; these are terminal for the search
    pub fn is_structural(&self, old_id: NodeId) -> bool {
        self.sentinel(old_id).is_some()
    }

    /// Real call signature of the pair (the non-sentinel side)
    pub fn signature(&self, old_id: NodeId) -> &str {
        let old_node = self.old.node(old_id);
        if old_node.is_sentinel() {
            self.new.node(self.counterpart(old_id)).call()
        } else {
            old_node.call()
        }
    }

    /// Trace pattern of the pair's node on `side`, `None` for a sentinel
    pub fn pattern(&self, old_id: NodeId, side: Side) -> Option<&str> {
        let node = self.tree(side).node(self.node_on(old_id, side));
        (!node.is_sentinel()).then(|| node.pattern())
    }

    /// Children of a pair, addressed by their old-tree ids
    pub fn children(&self, old_id: NodeId) -> &[NodeId] {
        self.old.children(old_id)
    }

    pub fn depth(&self, old_id: NodeId) -> usize {
        self.old.node(old_id).depth()
    }

    pub fn new_vm(&mut self, old_id: NodeId, side: Side) {
        let id = self.node_on(old_id, side);
        self.tree_mut(side).new_vm(id);
    }

    pub fn add_measurement(&mut self, old_id: NodeId, side: Side, duration_micros: u64) {
        let id = self.node_on(old_id, side);
        self.tree_mut(side).add_measurement(id, duration_micros);
    }

    pub fn statistics(&self, old_id: NodeId, side: Side) -> Summary {
        self.tree(side).statistics(self.node_on(old_id, side))
    }

    /// Per-run means of both versions, ready for the comparator
    pub fn compare_data(&self, old_id: NodeId) -> CompareData {
        CompareData::new(
            self.old.vm_means(old_id),
            self.new.vm_means(self.counterpart(old_id)),
        )
    }

    /// True when either version recorded samples for the pair
    pub fn has_measurements(&self, old_id: NodeId) -> bool {
        self.statistics(old_id, Side::Old).n > 0 || self.statistics(old_id, Side::New).n > 0
    }

    /// Recompute the cached statistics of every node in both trees
    pub fn refresh_statistics(&mut self) {
        for tree in [&mut self.old, &mut self.new] {
            let ids: Vec<NodeId> = tree.ids().collect();
            for id in ids {
                tree.node_mut(id).refresh_statistics();
            }
        }
    }

    /// Validate a deserialized pair
    pub(crate) fn check_consistency(&self) -> std::result::Result<(), String> {
        self.old.check_consistency()?;
        self.new.check_consistency()?;
        if self.old_to_new.len() != self.old.len() || self.new_to_old.len() != self.new.len() {
            return Err("pairing does not cover every node".to_string());
        }
        for (index, &new_id) in self.old_to_new.iter().enumerate() {
            if !self.new.contains(new_id) || self.new_to_old[new_id.0] != NodeId(index) {
                return Err(format!("pairing of #{} is not symmetric", index));
            }
        }
        Ok(())
    }

    fn tree_mut(&mut self, side: Side) -> &mut CallTree {
        match side {
            Side::Old => &mut self.old,
            Side::New => &mut self.new,
        }
    }
}

fn link(old_to_new: &mut Vec<Option<NodeId>>, new_to_old: &mut Vec<Option<NodeId>>, old_id: NodeId, new_id: NodeId) {
    if old_to_new.len() <= old_id.0 {
        old_to_new.resize(old_id.0 + 1, None);
    }
    if new_to_old.len() <= new_id.0 {
        new_to_old.resize(new_id.0 + 1, None);
    }
    old_to_new[old_id.0] = Some(new_id);
    new_to_old[new_id.0] = Some(old_id);
}

fn complete(mut links: Vec<Option<NodeId>>, tree: &CallTree) -> Result<Vec<NodeId>> {
    links.resize(tree.len(), None);
    links
        .into_iter()
        .enumerate()
        .map(|(index, link)| {
            link.ok_or_else(|| CauseSearchError::StructuralMismatch {
                parent: tree.node(NodeId(index)).call().to_string(),
                reason: format!("node #{} of version {} was never reached", index, tree.version()),
            })
        })
        .collect()
}

/// Siblings grouped by signature, each group in matching order
fn group_children(
    tree: &CallTree,
    parent: NodeId,
    ignore_eois: bool,
) -> Result<BTreeMap<&str, Vec<NodeId>>> {
    let mut groups: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
    for &child in tree.children(parent) {
        groups.entry(tree.node(child).call()).or_default().push(child);
    }

    if ignore_eois {
        return Ok(groups);
    }

    for (signature, members) in groups.iter_mut() {
        if members.len() < 2 {
            continue;
        }

        let mut eois = Vec::with_capacity(members.len());
        for &member in members.iter() {
            match tree.node(member).eoi() {
                Some(eoi) => eois.push(eoi),
                None => {
                    return Err(CauseSearchError::StructuralMismatch {
                        parent: tree.node(parent).call().to_string(),
                        reason: format!(
                            "repeated call `{}` in version {} has no execution-order index",
                            signature,
                            tree.version()
                        ),
                    })
                }
            }
        }
        eois.sort_unstable();
        if eois.windows(2).any(|w| w[0] == w[1]) {
            return Err(CauseSearchError::StructuralMismatch {
                parent: tree.node(parent).call().to_string(),
                reason: format!(
                    "repeated call `{}` in version {} has duplicate execution-order indices",
                    signature,
                    tree.version()
                ),
            });
        }

        members.sort_by_key(|&member| tree.node(member).eoi());
    }

    Ok(groups)
}

fn match_children(
    old: &CallTree,
    old_parent: NodeId,
    new: &CallTree,
    new_parent: NodeId,
    ignore_eois: bool,
) -> Result<Vec<ChildMatch>> {
    let old_groups = group_children(old, old_parent, ignore_eois)?;
    let new_groups = group_children(new, new_parent, ignore_eois)?;

    let mut partner = BTreeMap::new();
    for (signature, old_members) in &old_groups {
        if let Some(new_members) = new_groups.get(signature) {
            for (&o, &n) in old_members.iter().zip(new_members.iter()) {
                partner.insert(o, n);
            }
        }
    }

    // Old children in call order first, then calls the new version added.
    let mut matches = Vec::new();
    let mut matched_new = std::collections::HashSet::new();
    for &old_child in old.children(old_parent) {
        match partner.get(&old_child) {
            Some(&new_child) => {
                matched_new.insert(new_child);
                matches.push(ChildMatch::Both(old_child, new_child));
            }
            None => matches.push(ChildMatch::OnlyOld(old_child)),
        }
    }
    for &new_child in new.children(new_parent) {
        if !matched_new.contains(&new_child) {
            matches.push(ChildMatch::OnlyNew(new_child));
        }
    }

    Ok(matches)
}

/// Copy the shape of `source_tree`'s subtree at `source` below
/// `target_parent` as sentinel nodes; returns (source, mirror) pairs
fn mirror_subtree(
    source_tree: &CallTree,
    source: NodeId,
    target_tree: &mut CallTree,
    target_parent: NodeId,
    sentinel: Sentinel,
) -> Vec<(NodeId, NodeId)> {
    let mut pairs = Vec::new();
    let mut stack = vec![(source, target_parent)];
    while let Some((source_id, parent)) = stack.pop() {
        let mirror = target_tree.add_sentinel(parent, sentinel);
        pairs.push((source_id, mirror));
        for &child in source_tree.children(source_id).iter().rev() {
            stack.push((child, mirror));
        }
    }
    pairs
}
