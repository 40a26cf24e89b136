//! Descriptive statistics shared by the call-tree model and the comparator
//!
//! All vector arithmetic goes through trueno (SIMD mean/variance) and
//! aprender's `DescriptiveStats` (quantiles).

use anyhow::Result;
use aprender::stats::DescriptiveStats;
use trueno::Vector;

/// Summary of one sample population: mean, sample standard deviation, count
///
/// An empty population reports `NaN` for mean and deviation, so that a
/// call site that never ran in one version cannot be mistaken for a fast one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f32,
    pub stddev: f32,
    pub n: usize,
}

impl Summary {
    /// Summary of an empty population
    pub fn empty() -> Self {
        Self {
            mean: f32::NAN,
            stddev: f32::NAN,
            n: 0,
        }
    }

    /// Compute the summary of `values`
    ///
    /// trueno reports the population deviation (divide by n); it is rescaled
    /// to the sample deviation (divide by n - 1) here. A single value has a
    /// deviation of zero.
    ///
    /// # Example
    /// ```
    /// use perfcause::stats::Summary;
    ///
    /// let summary = Summary::of(&[2.0, 4.0, 6.0, 8.0]);
    /// assert_eq!(summary.mean, 5.0);
    /// assert_eq!(summary.n, 4);
    /// assert!(Summary::of(&[]).mean.is_nan());
    /// ```
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::empty();
        }

        let v = Vector::from_slice(values);
        let mean = v.mean().unwrap_or(f32::NAN);

        let stddev = if values.len() < 2 {
            0.0
        } else {
            let n = values.len() as f32;
            v.stddev().unwrap_or(0.0) * (n / (n - 1.0)).sqrt()
        };

        Self {
            mean,
            stddev,
            n: values.len(),
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f32 {
        self.stddev * self.stddev
    }

    /// True when the population has no spread at all
    pub fn is_constant(&self) -> bool {
        self.n > 0 && self.stddev == 0.0
    }

    /// Absolute z-score of `value` against this population
    ///
    /// Zero when the deviation is zero (or undefined): identical samples are
    /// never outliers.
    pub fn z_score(&self, value: f32) -> f32 {
        if self.stddev > 0.0 {
            ((value - self.mean) / self.stddev).abs()
        } else {
            0.0
        }
    }
}

/// Sum of squared deviations from the mean (n * population variance)
pub fn sum_of_squares(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let v = Vector::from_slice(values);
    v.variance().unwrap_or(0.0) * values.len() as f32
}

/// Median via aprender's R-7 quantile
pub fn median(values: &[f32]) -> Result<f32> {
    if values.is_empty() {
        anyhow::bail!("Cannot compute the median of an empty population");
    }
    let vector = Vector::from_slice(values);
    let stats = DescriptiveStats::new(&vector);
    stats
        .quantile(0.5)
        .map_err(|e| anyhow::anyhow!("Failed to compute median: {}", e))
}
