// Old/new sample arrays of one paired node

use crate::stats::Summary;

/// Transient pairing of both versions' per-run values for one node
#[derive(Debug, Clone)]
pub struct CompareData {
    old: Vec<f32>,
    new: Vec<f32>,
    old_stats: Summary,
    new_stats: Summary,
}

impl CompareData {
    pub fn new(old: Vec<f32>, new: Vec<f32>) -> Self {
        let old_stats = Summary::of(&old);
        let new_stats = Summary::of(&new);
        Self {
            old,
            new,
            old_stats,
            new_stats,
        }
    }

    pub fn old(&self) -> &[f32] {
        &self.old
    }

    pub fn new_values(&self) -> &[f32] {
        &self.new
    }

    pub fn old_stats(&self) -> Summary {
        self.old_stats
    }

    pub fn new_stats(&self) -> Summary {
        self.new_stats
    }

    /// Both versions' values in one population
    pub fn pooled(&self) -> Vec<f32> {
        let mut pooled = Vec::with_capacity(self.old.len() + self.new.len());
        pooled.extend_from_slice(&self.old);
        pooled.extend_from_slice(&self.new);
        pooled
    }
}
