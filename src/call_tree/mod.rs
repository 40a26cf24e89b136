// Call-tree model
//
// One arena-backed `CallTree` per version, and a `CallTreePair` holding the
// counterpart relation between them. A node's statistics only ever reflect
// samples recorded for that node itself; nothing is aggregated from
// children.

mod measurements;
mod node;
mod pairing;

pub use measurements::VersionMeasurements;
pub use node::{CallTree, CallTreeNode, NodeId, Sentinel, ADDED, REMOVED};
pub use pairing::{CallTreePair, Side};

#[cfg(test)]
mod tests;
