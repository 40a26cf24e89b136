//! Level selection for the level-wise cause search
//!
//! A frontier starts at a set of nodes and reaches a fixed number of levels
//! below them. Everything inside that window is measured together; only the
//! deepest level of the window decides where the next frontier starts.

use crate::call_tree::{CallTreePair, NodeId};
use std::collections::{BTreeSet, VecDeque};

/// Nodes selected for one frontier, addressed by old-tree id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelSelection {
    /// Every node from the starts down to the target depth, parents before
    /// children
    pub including_parents: Vec<NodeId>,

    /// Nodes exactly `additional_depth` levels below their start
    pub deepest: Vec<NodeId>,
}

impl LevelSelection {
    /// Select the window of `additional_depth` levels below `starts`
    ///
    /// Descent stops at ADDED/REMOVED pairs: their subtree has no
    /// counterpart to compare against, so the pair itself is the finding.
    /// Such a pair is still part of `including_parents`, and part of
    /// `deepest` when it sits at the target depth.
    pub fn select(pair: &CallTreePair, starts: &[NodeId], additional_depth: usize) -> Self {
        let mut selection = LevelSelection::default();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<(NodeId, usize)> = starts.iter().map(|&id| (id, 0)).collect();

        while let Some((id, relative_depth)) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            selection.including_parents.push(id);

            if relative_depth == additional_depth {
                selection.deepest.push(id);
                continue;
            }
            if pair.is_structural(id) {
                continue;
            }
            for &child in pair.children(id) {
                queue.push_back((child, relative_depth + 1));
            }
        }

        selection
    }

    pub fn is_empty(&self) -> bool {
        self.including_parents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.including_parents.len()
    }
}

/// Starts of the next frontier: the children of every differing node that
/// can still be refined
///
/// Structural pairs and leaves are terminal and contribute nothing.
pub fn next_starts(pair: &CallTreePair, differing_deepest: &[NodeId]) -> Vec<NodeId> {
    differing_deepest
        .iter()
        .filter(|&&id| !pair.is_structural(id))
        .flat_map(|&id| pair.children(id).iter().copied())
        .collect()
}
