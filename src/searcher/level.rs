// Frontier loop of the level-wise search

use super::Measurer;
use crate::cache::{CacheEntry, CacheKey, CacheStore, SearchProgress};
use crate::call_tree::{CallTreePair, NodeId};
use crate::comparator::{NodeComparator, Verdict};
use crate::config::{CauseSearchConfig, MeasurementConfig};
use crate::error::{CauseSearchError, Result};
use crate::level_selector::{next_starts, LevelSelection};
use crate::trace_source::TraceSource;
use std::collections::BTreeSet;

/// Searcher for one (version, old version, test case) triple
///
/// Progress is committed to the cache after every completed frontier, so an
/// abandoned search resumes at the first frontier it had not finished.
pub struct LevelCauseSearcher<'a> {
    search: CauseSearchConfig,
    measurement: MeasurementConfig,
    comparator: NodeComparator,
    measurer: &'a dyn Measurer,
    traces: &'a dyn TraceSource,
    cache: &'a dyn CacheStore,
}

impl<'a> LevelCauseSearcher<'a> {
    pub fn new(
        search: CauseSearchConfig,
        measurement: MeasurementConfig,
        measurer: &'a dyn Measurer,
        traces: &'a dyn TraceSource,
        cache: &'a dyn CacheStore,
    ) -> Result<Self> {
        search.validate().map_err(CauseSearchError::InvalidConfig)?;
        measurement
            .validate()
            .map_err(CauseSearchError::InvalidConfig)?;

        Ok(Self {
            comparator: NodeComparator::new(measurement.statistics.clone()),
            search,
            measurement,
            measurer,
            traces,
            cache,
        })
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(
            self.measurement.version.clone(),
            self.measurement.version_old.clone(),
            self.search.test_case.clone(),
        )
    }

    /// Run the search to completion and return the cause signatures
    pub fn search(&self) -> Result<BTreeSet<String>> {
        self.run().map(|entry| entry.progress.causes)
    }

    /// Run the search to completion and return the finished cache entry
    pub fn run(&self) -> Result<CacheEntry> {
        let mut entry = self.start()?;

        if entry.progress.finished {
            tracing::info!(
                "Reusing finished search for {} ({} causes)",
                self.search.test_case,
                entry.progress.causes.len()
            );
            return Ok(entry);
        }

        while !entry.progress.frontier_starts.is_empty() {
            self.measure_frontier(&mut entry)?;
            self.cache.store(&entry)?;
        }

        entry.progress.causes = minimal_causes(&entry.pair, &entry.progress.differing);
        entry.progress.finished = true;
        self.cache.store(&entry)?;

        tracing::info!(
            "Search for {} finished after {} frontiers: {} cause(s)",
            self.search.test_case,
            entry.progress.frontiers_measured,
            entry.progress.causes.len()
        );
        Ok(entry)
    }

    /// Cached state for this key, or a freshly paired tree
    fn start(&self) -> Result<CacheEntry> {
        let key = self.key();
        match self.cache.load(&key) {
            Ok(entry) => {
                if !entry.progress.finished {
                    tracing::info!(
                        "Resuming search for {} after {} frontiers",
                        key.test_case,
                        entry.progress.frontiers_measured
                    );
                }
                Ok(entry)
            }
            Err(CauseSearchError::CacheMiss { path }) => {
                tracing::debug!("No cached search at {}", path);
                self.discover(key)
            }
            Err(CauseSearchError::CorruptCache { path, reason }) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", path, reason);
                self.discover(key)
            }
            Err(e) => Err(e),
        }
    }

    fn discover(&self, key: CacheKey) -> Result<CacheEntry> {
        let old = self
            .traces
            .read_tree(&self.measurement.version_old, &key.test_case)?;
        let new = self
            .traces
            .read_tree(&self.measurement.version, &key.test_case)?;
        let pair = CallTreePair::pair(old, new, self.search.ignore_eois)?;

        tracing::info!(
            "Paired {} call sites of {} (depth {})",
            pair.old().len(),
            key.test_case,
            pair.old().max_depth()
        );

        let progress = SearchProgress {
            frontier_starts: vec![pair.root()],
            ..SearchProgress::default()
        };
        Ok(CacheEntry {
            key,
            pair,
            progress,
        })
    }

    /// One measure + compare cycle; leaves the next starts in `entry`
    fn measure_frontier(&self, entry: &mut CacheEntry) -> Result<()> {
        let selection = LevelSelection::select(
            &entry.pair,
            &entry.progress.frontier_starts,
            self.search.levels - 1,
        );
        let depth = entry
            .progress
            .frontier_starts
            .first()
            .map(|&id| entry.pair.depth(id))
            .unwrap_or(0);

        tracing::info!(
            "Measuring frontier {} of {}: {} node(s) from depth {}",
            entry.progress.frontiers_measured + 1,
            self.search.test_case,
            selection.len(),
            depth
        );

        self.measurer
            .measure(&mut entry.pair, &selection.including_parents, &self.search.test_case)
            .map_err(|source| CauseSearchError::MeasurementFailed {
                test_case: self.search.test_case.to_string(),
                frontier: selection.len(),
                source,
            })?;
        entry.pair.refresh_statistics();

        let mut differing_deepest = Vec::new();
        for &id in &selection.including_parents {
            let comparison = self.comparator.compare(&entry.pair.compare_data(id));
            match comparison.verdict {
                Verdict::Different => {
                    entry.progress.differing.insert(id);
                    if selection.deepest.contains(&id) {
                        differing_deepest.push(id);
                    }
                }
                Verdict::Inconclusive => {
                    tracing::debug!(
                        "Inconclusive comparison of {} {}, treated as unchanged",
                        entry.pair.signature(id),
                        id
                    );
                }
                Verdict::Same => {}
            }
        }

        entry.progress.frontier_starts = next_starts(&entry.pair, &differing_deepest);
        entry.progress.frontiers_measured += 1;

        tracing::debug!(
            "Differing: {:?}, next starts: {:?}",
            differing_deepest
                .iter()
                .map(|&id| entry.pair.signature(id))
                .collect::<Vec<_>>(),
            entry
                .progress
                .frontier_starts
                .iter()
                .map(|&id| entry.pair.signature(id))
                .collect::<Vec<_>>()
        );
        Ok(())
    }
}

/// Signatures of the differing nodes that have no differing descendant
///
/// A differing parent whose child also differs is explained by the child.
pub fn minimal_causes(pair: &CallTreePair, differing: &BTreeSet<NodeId>) -> BTreeSet<String> {
    let mut explained = BTreeSet::new();
    for &id in differing {
        let mut current = pair.old().node(id).parent();
        while let Some(parent) = current {
            if !explained.insert(parent) {
                break;
            }
            current = pair.old().node(parent).parent();
        }
    }

    differing
        .iter()
        .filter(|id| !explained.contains(*id))
        .map(|&id| pair.signature(id).to_string())
        .collect()
}
