// Node comparator: did a call site's own execution time change?
//
// Pipeline per paired node:
// 1. Bimodality test: each version must split into the same two clusters
// 2. Single-pass z-score outlier removal, per version (and per cluster when
//    bimodal)
// 3. Welch t-test on old vs new, or on old-lower vs new-lower and old-upper
//    vs new-upper
//
// Many call sites have two execution paths (cache hit/miss, lazy init);
// pooling both paths into one Gaussian inflates the variance enough to hide
// a genuine shift of either path, hence the per-cluster comparison.

mod bimodal;
mod compare_data;
mod outlier;
mod significance;

pub use bimodal::{classify_modality, classify_pair, BimodalSplit, Modality};
pub use compare_data::CompareData;
pub use outlier::{remove_outliers, remove_outliers_bimodal, OutlierRemoval};
pub use significance::{compare_samples, welch_test, Difference, PairOutcome, WelchTest};

use crate::config::StatisticsConfig;

/// Outlier-free comparison input, shaped by the modality of the node
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonData {
    Unimodal {
        old: Vec<f32>,
        new: Vec<f32>,
    },
    Bimodal {
        split: BimodalSplit,
        old_lower: Vec<f32>,
        new_lower: Vec<f32>,
        old_upper: Vec<f32>,
        new_upper: Vec<f32>,
    },
}

/// Final decision for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Different,
    Same,
    /// Fewer than two runs on a side; treated as not different
    Inconclusive,
}

/// Full record of one node comparison, kept for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub verdict: Verdict,
    pub modality: Modality,
    /// One outcome per compared population pair (one, or two when bimodal)
    pub outcomes: Vec<PairOutcome>,
    pub outliers_removed: usize,
}

impl Comparison {
    pub fn is_different(&self) -> bool {
        self.verdict == Verdict::Different
    }
}

/// Decides whether a paired node's own execution time differs
#[derive(Debug, Clone, Default)]
pub struct NodeComparator {
    config: StatisticsConfig,
}

impl NodeComparator {
    pub fn new(config: StatisticsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Classify and strip outliers
    pub fn prepare(&self, data: &CompareData) -> (ComparisonData, usize) {
        let factor = self.config.outlier_factor as f32;
        match classify_pair(data.old(), data.new_values(), &self.config) {
            Modality::Unimodal => {
                let old = remove_outliers(data.old(), factor);
                let new = remove_outliers(data.new_values(), factor);
                let removed = old.removed + new.removed;
                (
                    ComparisonData::Unimodal {
                        old: old.kept,
                        new: new.kept,
                    },
                    removed,
                )
            }
            Modality::Bimodal(split) => {
                let (old_lower, old_upper) = remove_outliers_bimodal(data.old(), &split, factor);
                let (new_lower, new_upper) =
                    remove_outliers_bimodal(data.new_values(), &split, factor);
                let removed =
                    old_lower.removed + old_upper.removed + new_lower.removed + new_upper.removed;
                (
                    ComparisonData::Bimodal {
                        split,
                        old_lower: old_lower.kept,
                        new_lower: new_lower.kept,
                        old_upper: old_upper.kept,
                        new_upper: new_upper.kept,
                    },
                    removed,
                )
            }
        }
    }

    /// Compare both versions of one node
    pub fn compare(&self, data: &CompareData) -> Comparison {
        let alpha = self.config.significance_level;
        let (old_n, new_n) = (data.old().len(), data.new_values().len());

        // A call site that only ran in one version is a maximal difference
        if (old_n == 0) != (new_n == 0) {
            let outcome = compare_samples(data.old(), data.new_values(), alpha, 1);
            return Comparison {
                verdict: Verdict::Different,
                modality: Modality::Unimodal,
                outcomes: vec![outcome],
                outliers_removed: 0,
            };
        }

        if old_n < 2 || new_n < 2 {
            return Comparison {
                verdict: Verdict::Inconclusive,
                modality: Modality::Unimodal,
                outcomes: vec![PairOutcome::Inconclusive],
                outliers_removed: 0,
            };
        }

        let (prepared, outliers_removed) = self.prepare(data);
        let (modality, outcomes) = match prepared {
            ComparisonData::Unimodal { old, new } => {
                (Modality::Unimodal, vec![compare_samples(&old, &new, alpha, 1)])
            }
            ComparisonData::Bimodal {
                split,
                old_lower,
                new_lower,
                old_upper,
                new_upper,
            } => (
                Modality::Bimodal(split),
                vec![
                    compare_samples(&old_lower, &new_lower, alpha, 2),
                    compare_samples(&old_upper, &new_upper, alpha, 2),
                ],
            ),
        };

        let verdict = if outcomes.iter().any(PairOutcome::is_different) {
            Verdict::Different
        } else if outcomes.iter().all(|o| *o == PairOutcome::Inconclusive) {
            Verdict::Inconclusive
        } else {
            Verdict::Same
        };

        Comparison {
            verdict,
            modality,
            outcomes,
            outliers_removed,
        }
    }

    pub fn is_different(&self, data: &CompareData) -> bool {
        self.compare(data).is_different()
    }
}

/// Decide whether a node differs at the given confidence level (e.g. 0.95),
/// with default outlier and bimodality settings
///
/// The test runs at significance level `1 - confidence_level`. A confidence
/// level outside `[0.5, 1)` cannot be tested and is reported as not
/// different.
///
/// # Example
/// ```
/// use perfcause::comparator::{is_different, CompareData};
///
/// let data = CompareData::new(
///     vec![10.0, 11.0, 12.0, 13.0, 14.0],
///     vec![25.0, 26.0, 27.0, 28.0, 29.0],
/// );
/// assert!(is_different(&data, 0.95));
/// ```
pub fn is_different(data: &CompareData, confidence_level: f64) -> bool {
    let config = StatisticsConfig {
        significance_level: 1.0 - confidence_level,
        ..StatisticsConfig::default()
    };
    if let Err(reason) = config.validate() {
        tracing::warn!("Confidence level {} rejected: {}", confidence_level, reason);
        return false;
    }
    NodeComparator::new(config).is_different(data)
}

#[cfg(test)]
mod tests;
