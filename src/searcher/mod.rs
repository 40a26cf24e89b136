// Level-wise cause search
//
// Starting at the root, each frontier is measured as one batch, compared
// node by node, and refined below the nodes whose own time changed. The
// search ends when no differing node can be refined further; the causes are
// the differing nodes without a differing descendant.

mod level;

pub use level::{minimal_causes, LevelCauseSearcher};

use crate::cache::CacheStore;
use crate::call_tree::{CallTreePair, NodeId};
use crate::config::{CauseSearchConfig, MeasurementConfig, TestCase};
use crate::error::{MeasurementError, Result};
use crate::trace_source::TraceSource;
use std::collections::BTreeSet;

/// Produces fresh samples for a batch of paired nodes
///
/// One call covers a whole frontier. Implementations open a new VM series
/// for every node they measure and append samples on both sides of each
/// pair (sentinel sides have no pattern and stay empty). A measurer may be
/// shared by concurrent searches over different keys, hence `&self`.
pub trait Measurer {
    fn measure(
        &self,
        pair: &mut CallTreePair,
        nodes: &[NodeId],
        test_case: &TestCase,
    ) -> std::result::Result<(), MeasurementError>;
}

/// Run a complete search and return the cause signatures
pub fn search(
    search_config: &CauseSearchConfig,
    measurement_config: &MeasurementConfig,
    measurer: &dyn Measurer,
    traces: &dyn TraceSource,
    cache: &dyn CacheStore,
) -> Result<BTreeSet<String>> {
    LevelCauseSearcher::new(
        search_config.clone(),
        measurement_config.clone(),
        measurer,
        traces,
        cache,
    )?
    .search()
}
