// Arena representation of one version's call tree
//
// Nodes are owned by their `CallTree` and addressed by `NodeId`. The link
// to the other version's tree is not stored here; see `CallTreePair`.

use super::measurements::VersionMeasurements;
use crate::stats::Summary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Signature/pattern of a node standing in for a call that only exists in
/// the new version
pub const ADDED: &str = "ADDED";

/// Signature/pattern of a node standing in for a call that only exists in
/// the old version
pub const REMOVED: &str = "REMOVED";

/// Index of a node within its `CallTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marker for call sites that exist in only one version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentinel {
    Added,
    Removed,
}

impl Sentinel {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentinel::Added => ADDED,
            Sentinel::Removed => REMOVED,
        }
    }
}

/// One call site in one version's tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreeNode {
    call: String,
    pattern: String,
    eoi: Option<u32>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    measurements: BTreeMap<String, VersionMeasurements>,
}

impl CallTreeNode {
    fn new(call: String, pattern: String, eoi: Option<u32>, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            call,
            pattern,
            eoi,
            parent,
            children: Vec::new(),
            depth,
            measurements: BTreeMap::new(),
        }
    }

    /// Fully qualified method signature (or a sentinel)
    pub fn call(&self) -> &str {
        &self.call
    }

    /// Runtime-matchable form of the signature used to attribute raw records
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Execution-order index of the call, when the trace recorded one
    pub fn eoi(&self) -> Option<u32> {
        self.eoi
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in call order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn sentinel(&self) -> Option<Sentinel> {
        match self.call.as_str() {
            ADDED => Some(Sentinel::Added),
            REMOVED => Some(Sentinel::Removed),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel().is_some()
    }

    pub fn new_vm(&mut self, version: &str) {
        self.measurements
            .entry(version.to_string())
            .or_default()
            .new_vm();
    }

    pub fn add_measurement(&mut self, version: &str, duration_micros: u64) {
        self.measurements
            .entry(version.to_string())
            .or_default()
            .add_measurement(duration_micros);
    }

    pub fn measurements(&self, version: &str) -> Option<&VersionMeasurements> {
        self.measurements.get(version)
    }

    /// Summary of this node's own samples in `version`; NaN mean when none
    pub fn statistics(&self, version: &str) -> Summary {
        self.measurements
            .get(version)
            .map(VersionMeasurements::statistics)
            .unwrap_or_else(Summary::empty)
    }

    /// Recompute the cached summaries of every version
    pub fn refresh_statistics(&mut self) {
        for series in self.measurements.values_mut() {
            series.refresh_statistics();
        }
    }
}

impl fmt::Display for CallTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.eoi {
            Some(eoi) => write!(f, "{}[{}]", self.call, eoi),
            None => write!(f, "{}", self.call),
        }
    }
}

/// The call tree of one test in one version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTree {
    version: String,
    nodes: Vec<CallTreeNode>,
}

impl CallTree {
    /// Create a tree consisting of its root call only
    pub fn new(version: impl Into<String>, call: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_root_eoi(version, call, pattern, None)
    }

    pub fn with_root_eoi(
        version: impl Into<String>,
        call: impl Into<String>,
        pattern: impl Into<String>,
        eoi: Option<u32>,
    ) -> Self {
        Self {
            version: version.into(),
            nodes: vec![CallTreeNode::new(call.into(), pattern.into(), eoi, None, 0)],
        }
    }

    /// Version label the measurements of this tree are recorded under
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Append a child call below `parent`
    pub fn add_child(&mut self, parent: NodeId, call: impl Into<String>, pattern: impl Into<String>) -> NodeId {
        self.add_child_with_eoi(parent, call, pattern, None)
    }

    pub fn add_child_with_eoi(
        &mut self,
        parent: NodeId,
        call: impl Into<String>,
        pattern: impl Into<String>,
        eoi: Option<u32>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = self.nodes[parent.0].depth + 1;
        self.nodes
            .push(CallTreeNode::new(call.into(), pattern.into(), eoi, Some(parent), depth));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn add_sentinel(&mut self, parent: NodeId, sentinel: Sentinel) -> NodeId {
        self.add_child(parent, sentinel.as_str(), sentinel.as_str())
    }

    pub fn node(&self, id: NodeId) -> &CallTreeNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CallTreeNode {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Depth of the deepest node (the root alone has depth 0)
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Nodes without children, in arena order
    pub fn leaves(&self) -> Vec<NodeId> {
        self.ids()
            .filter(|&id| self.nodes[id.0].children.is_empty())
            .collect()
    }

    /// Nodes of the subtree rooted at `id` (including it), parents first
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev());
        }
        result
    }

    /// Open a new measurement run for `id` under this tree's version
    pub fn new_vm(&mut self, id: NodeId) {
        let version = self.version.clone();
        self.nodes[id.0].new_vm(&version);
    }

    /// Record a sample for `id` under this tree's version
    pub fn add_measurement(&mut self, id: NodeId, duration_micros: u64) {
        let version = self.version.clone();
        self.nodes[id.0].add_measurement(&version, duration_micros);
    }

    /// Summary of `id`'s samples under this tree's version
    pub fn statistics(&self, id: NodeId) -> Summary {
        self.nodes[id.0].statistics(&self.version)
    }

    /// Per-run means of `id` under this tree's version
    pub fn vm_means(&self, id: NodeId) -> Vec<f32> {
        self.nodes[id.0]
            .measurements(&self.version)
            .map(VersionMeasurements::vm_means)
            .unwrap_or_default()
    }

    /// Structural check used after deserialization
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no root".to_string());
        }
        if self.nodes[0].parent.is_some() {
            return Err("root has a parent".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for child in &node.children {
                let Some(child_node) = self.nodes.get(child.0) else {
                    return Err(format!("node #{} has dangling child {}", index, child));
                };
                if child_node.parent != Some(NodeId(index)) {
                    return Err(format!("child {} does not point back to #{}", child, index));
                }
            }
        }
        Ok(())
    }
}
