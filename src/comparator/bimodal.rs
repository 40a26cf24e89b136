// Bimodality classification
//
// The pooled values are split at their mean into a lower and an upper
// cluster. The population counts as bimodal when both clusters are large
// enough and the within-cluster sum of squares is a small share of the total
// sum of squares (a two-Gaussian fit explains most of the spread). Samples
// are later assigned to a cluster by comparing them with the midpoint
// between the two cluster means.

use crate::config::StatisticsConfig;
use crate::stats::{sum_of_squares, Summary};

/// Two-cluster fit of a bimodal population
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BimodalSplit {
    /// Midpoint between the cluster means; values below belong to the lower
    /// cluster
    pub cut: f32,
    pub lower: Summary,
    pub upper: Summary,
    /// Within-cluster / total sum of squares of the fit
    pub variance_ratio: f32,
}

impl BimodalSplit {
    pub fn is_lower(&self, value: f32) -> bool {
        value < self.cut
    }

    /// Partition `values` into (lower, upper) clusters
    pub fn partition(&self, values: &[f32]) -> (Vec<f32>, Vec<f32>) {
        values.iter().partition(|&&v| self.is_lower(v))
    }
}

/// Result of the bimodality test
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modality {
    Unimodal,
    Bimodal(BimodalSplit),
}

impl Modality {
    pub fn is_bimodal(&self) -> bool {
        matches!(self, Modality::Bimodal(_))
    }
}

/// Classify a population as unimodal or bimodal
///
/// # Example
/// ```
/// use perfcause::comparator::{classify_modality, Modality};
/// use perfcause::config::StatisticsConfig;
///
/// let config = StatisticsConfig::default();
/// let two_paths = [10.0, 11.0, 9.0, 90.0, 91.0, 89.0];
/// assert!(classify_modality(&two_paths, &config).is_bimodal());
///
/// let one_path = [10.0, 11.0, 9.0, 10.0, 12.0, 10.0];
/// assert_eq!(classify_modality(&one_path, &config), Modality::Unimodal);
/// ```
pub fn classify_modality(values: &[f32], config: &StatisticsConfig) -> Modality {
    // Each cluster needs two values for a deviation
    if values.len() < 4 {
        return Modality::Unimodal;
    }

    let overall = Summary::of(values);
    if !(overall.stddev > 0.0) {
        return Modality::Unimodal;
    }

    let (lower, upper): (Vec<f32>, Vec<f32>) = values.iter().partition(|&&v| v < overall.mean);

    let min_cluster = ((config.min_cluster_fraction * values.len() as f64).ceil() as usize).max(2);
    if lower.len() < min_cluster || upper.len() < min_cluster {
        return Modality::Unimodal;
    }

    let total = sum_of_squares(values);
    if total <= 0.0 {
        return Modality::Unimodal;
    }
    let within = sum_of_squares(&lower) + sum_of_squares(&upper);
    let variance_ratio = within / total;

    if f64::from(variance_ratio) >= config.bimodality_variance_ratio {
        return Modality::Unimodal;
    }

    let lower = Summary::of(&lower);
    let upper = Summary::of(&upper);

    Modality::Bimodal(BimodalSplit {
        cut: (lower.mean + upper.mean) / 2.0,
        lower,
        upper,
        variance_ratio,
    })
}

/// Classify an old/new pair of populations
///
/// Both versions must be bimodal on their own; a plain shift between two
/// unimodal versions would otherwise look like two clusters once pooled.
/// The cut is the average of both versions' cuts.
pub fn classify_pair(old: &[f32], new: &[f32], config: &StatisticsConfig) -> Modality {
    let (Modality::Bimodal(old_split), Modality::Bimodal(new_split)) =
        (classify_modality(old, config), classify_modality(new, config))
    else {
        return Modality::Unimodal;
    };

    let cut = (old_split.cut + new_split.cut) / 2.0;
    let (lower, upper): (Vec<f32>, Vec<f32>) =
        old.iter().chain(new.iter()).partition(|&&v| v < cut);
    let total = sum_of_squares(&[old, new].concat());
    let variance_ratio = if total > 0.0 {
        (sum_of_squares(&lower) + sum_of_squares(&upper)) / total
    } else {
        0.0
    };

    Modality::Bimodal(BimodalSplit {
        cut,
        lower: Summary::of(&lower),
        upper: Summary::of(&upper),
        variance_ratio,
    })
}
