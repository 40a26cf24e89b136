// z-score outlier removal
//
// Single pass: statistics are computed once over all values, values whose
// z-score exceeds the factor are dropped, and statistics are recomputed once
// over the survivors. Iterating until nothing is removed would keep eating
// into the tails of small samples.

use super::bimodal::BimodalSplit;
use crate::stats::Summary;

/// Outcome of one outlier-removal pass
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierRemoval {
    pub kept: Vec<f32>,
    pub removed: usize,
    pub before: Summary,
    pub after: Summary,
}

/// Drop values more than `factor` standard deviations from the mean
///
/// # Example
/// ```
/// use perfcause::comparator::remove_outliers;
///
/// let mut values = vec![10.0; 20];
/// values.push(100.0);
/// let removal = remove_outliers(&values, 3.0);
/// assert_eq!(removal.removed, 1);
/// assert_eq!(removal.after.mean, 10.0);
/// ```
pub fn remove_outliers(values: &[f32], factor: f32) -> OutlierRemoval {
    let before = Summary::of(values);
    let kept: Vec<f32> = values
        .iter()
        .copied()
        .filter(|&v| !(before.z_score(v) > factor))
        .collect();
    let removed = values.len() - kept.len();
    let after = if removed == 0 {
        before
    } else {
        Summary::of(&kept)
    };

    OutlierRemoval {
        kept,
        removed,
        before,
        after,
    }
}

/// Outlier removal applied to each cluster of a bimodal population
/// independently; returns (lower, upper)
pub fn remove_outliers_bimodal(
    values: &[f32],
    split: &BimodalSplit,
    factor: f32,
) -> (OutlierRemoval, OutlierRemoval) {
    let (lower, upper) = split.partition(values);
    (
        remove_outliers(&lower, factor),
        remove_outliers(&upper, factor),
    )
}
