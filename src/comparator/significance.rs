// Two-sample significance testing
//
// Welch's t-test (unequal variances) via aprender. Constant populations are
// compared exactly instead, since a zero standard error makes the t-statistic
// undefined.

use anyhow::{Context, Result};

/// Welch t-test result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchTest {
    pub statistic: f32,
    /// Two-tailed p-value
    pub pvalue: f32,
    pub df: f32,
}

/// Run Welch's independent two-sample t-test
pub fn welch_test(old: &[f32], new: &[f32]) -> Result<WelchTest> {
    if old.len() < 2 || new.len() < 2 {
        anyhow::bail!("Need at least 2 samples per distribution for t-test");
    }

    let result = aprender::stats::hypothesis::ttest_ind(old, new, false)
        .context("Failed to compute t-test")?;

    Ok(WelchTest {
        statistic: result.statistic,
        pvalue: result.pvalue,
        df: result.df,
    })
}

/// Why a pair of populations counts as different
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Difference {
    /// No old samples, new samples present
    Appeared,
    /// Old samples present, no new samples
    Disappeared,
    /// Both populations constant, at different values
    ConstantShift,
    /// Welch test rejected equal means
    Significant { pvalue: f32 },
}

/// Outcome of comparing one old/new population pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairOutcome {
    Different(Difference),
    Same { pvalue: Option<f32> },
    /// Too few samples to decide; resolved as "not different"
    Inconclusive,
}

impl PairOutcome {
    pub fn is_different(&self) -> bool {
        matches!(self, PairOutcome::Different(_))
    }
}

/// Compare two populations
///
/// `appearance_minimum` is how many samples the non-empty side needs when
/// the other side is empty for the pair to count as appeared/disappeared.
pub fn compare_samples(
    old: &[f32],
    new: &[f32],
    significance_level: f64,
    appearance_minimum: usize,
) -> PairOutcome {
    match (old.len(), new.len()) {
        (0, 0) => return PairOutcome::Inconclusive,
        (0, n) if n >= appearance_minimum => return PairOutcome::Different(Difference::Appeared),
        (n, 0) if n >= appearance_minimum => {
            return PairOutcome::Different(Difference::Disappeared)
        }
        (o, n) if o < 2 || n < 2 => return PairOutcome::Inconclusive,
        _ => {}
    }

    let old_constant = old.iter().all(|&v| v == old[0]);
    let new_constant = new.iter().all(|&v| v == new[0]);
    if old_constant && new_constant {
        return if old[0] == new[0] {
            PairOutcome::Same { pvalue: None }
        } else {
            PairOutcome::Different(Difference::ConstantShift)
        };
    }

    match welch_test(old, new) {
        Ok(test) if test.pvalue.is_nan() => {
            tracing::warn!("t-test produced no p-value (t = {})", test.statistic);
            PairOutcome::Inconclusive
        }
        Ok(test) if test.pvalue < significance_level as f32 => {
            PairOutcome::Different(Difference::Significant {
                pvalue: test.pvalue,
            })
        }
        Ok(test) => PairOutcome::Same {
            pvalue: Some(test.pvalue),
        },
        Err(e) => {
            tracing::warn!("Failed to compare distributions: {}", e);
            PairOutcome::Inconclusive
        }
    }
}
