// Per-version measurement series of one call site
//
// Samples are grouped by VM (one fresh-process run). Statistics are taken
// over the per-VM means so that `n` is the number of independent runs, not
// the number of calls.

use crate::stats::Summary;
use serde::{Deserialize, Serialize};
use trueno::Vector;

/// Duration samples (microseconds) of one call site in one version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionMeasurements {
    vms: Vec<Vec<u64>>,

    /// Cached summary; `None` whenever a sample was added since the last
    /// refresh
    #[serde(skip)]
    summary: Option<Summary>,
}

impl VersionMeasurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the series of a new measurement run
    pub fn new_vm(&mut self) {
        self.vms.push(Vec::new());
        self.summary = None;
    }

    /// Append a sample to the current run (opening one if none exists)
    pub fn add_measurement(&mut self, duration_micros: u64) {
        match self.vms.last_mut() {
            Some(vm) => vm.push(duration_micros),
            None => self.vms.push(vec![duration_micros]),
        }
        self.summary = None;
    }

    /// Runs in which this call site executed at least once
    pub fn vm_count(&self) -> usize {
        self.vms.iter().filter(|vm| !vm.is_empty()).count()
    }

    /// Total samples across all runs
    pub fn call_count(&self) -> usize {
        self.vms.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.call_count() == 0
    }

    /// Raw samples of each run, empty runs included
    pub fn vms(&self) -> &[Vec<u64>] {
        &self.vms
    }

    /// Mean duration of every run that recorded samples
    pub fn vm_means(&self) -> Vec<f32> {
        self.vms
            .iter()
            .filter(|vm| !vm.is_empty())
            .map(|vm| {
                let values: Vec<f32> = vm.iter().map(|&d| d as f32).collect();
                Vector::from_slice(&values).mean().unwrap_or(f32::NAN)
            })
            .collect()
    }

    /// Summary over the per-run means; recomputed on read when stale
    pub fn statistics(&self) -> Summary {
        self.summary
            .unwrap_or_else(|| Summary::of(&self.vm_means()))
    }

    /// Recompute and cache the summary
    pub fn refresh_statistics(&mut self) -> Summary {
        let summary = Summary::of(&self.vm_means());
        self.summary = Some(summary);
        summary
    }

    pub fn has_cached_statistics(&self) -> bool {
        self.summary.is_some()
    }
}
