//! Per-node diagnostics of a search
//!
//! Built from a cache entry, so a finished (or interrupted) search can be
//! inspected without measuring again.

use crate::cache::{CacheEntry, CacheKey};
use crate::call_tree::{NodeId, Sentinel, Side};
use crate::comparator::{Modality, NodeComparator, Verdict};
use crate::config::StatisticsConfig;
use crate::stats::{median, Summary};
use std::collections::BTreeSet;

/// Statistics and comparator decision for one measured pair
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDiagnostics {
    pub id: NodeId,
    pub signature: String,
    pub depth: usize,
    pub sentinel: Option<Sentinel>,
    pub old: Summary,
    pub new: Summary,
    pub old_median: Option<f32>,
    pub new_median: Option<f32>,
    pub modality: Modality,
    pub verdict: Verdict,
    pub is_cause: bool,
}

impl NodeDiagnostics {
    /// Relative change of the mean, in percent; `None` without both means
    pub fn change_percent(&self) -> Option<f32> {
        if self.old.mean.is_finite() && self.new.mean.is_finite() && self.old.mean != 0.0 {
            Some((self.new.mean - self.old.mean) / self.old.mean * 100.0)
        } else {
            None
        }
    }
}

/// Diagnostics of every measured pair of one search
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub key: CacheKey,
    pub frontiers_measured: usize,
    pub finished: bool,
    pub causes: BTreeSet<String>,
    /// Measured pairs in tree order
    pub nodes: Vec<NodeDiagnostics>,
    pub config: StatisticsConfig,
}

impl SearchReport {
    /// Re-run the comparator over every measured pair of `entry`
    pub fn from_entry(entry: &CacheEntry, config: &StatisticsConfig) -> Self {
        let comparator = NodeComparator::new(config.clone());
        let pair = &entry.pair;

        let nodes = pair
            .old()
            .subtree(pair.root())
            .into_iter()
            .filter(|&id| pair.has_measurements(id))
            .map(|id| {
                let data = pair.compare_data(id);
                let comparison = comparator.compare(&data);
                let signature = pair.signature(id).to_string();
                NodeDiagnostics {
                    id,
                    is_cause: entry.progress.finished && entry.progress.causes.contains(&signature),
                    signature,
                    depth: pair.depth(id),
                    sentinel: pair.sentinel(id),
                    old: pair.statistics(id, Side::Old),
                    new: pair.statistics(id, Side::New),
                    old_median: median(data.old()).ok(),
                    new_median: median(data.new_values()).ok(),
                    modality: comparison.modality,
                    verdict: comparison.verdict,
                }
            })
            .collect();

        Self {
            key: entry.key.clone(),
            frontiers_measured: entry.progress.frontiers_measured,
            finished: entry.progress.finished,
            causes: entry.progress.causes.clone(),
            nodes,
            config: config.clone(),
        }
    }

    pub fn differing(&self) -> impl Iterator<Item = &NodeDiagnostics> {
        self.nodes.iter().filter(|n| n.verdict == Verdict::Different)
    }

    /// Human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!(
            "Cause search for {} ({} vs {})\n",
            self.key.test_case, self.key.version, self.key.version_old
        ));

        if !self.finished {
            report.push_str(&format!(
                "⚠️  SEARCH UNFINISHED after {} frontiers\n",
                self.frontiers_measured
            ));
        } else if self.causes.is_empty() {
            report.push_str("✅ NO ROOT CAUSE FOUND\n");
        } else {
            report.push_str(&format!("❌ ROOT CAUSES FOUND ({})\n", self.causes.len()));
            for cause in &self.causes {
                report.push_str(&format!("  - {}\n", cause));
            }
        }

        report.push_str(&format!(
            "Frontiers measured: {}\nDiffering call sites: {} of {}\nSignificance level: {} ({}% confidence)\n",
            self.frontiers_measured,
            self.differing().count(),
            self.nodes.len(),
            self.config.significance_level,
            (1.0 - self.config.significance_level) * 100.0
        ));

        if self.nodes.is_empty() {
            return report;
        }

        report.push_str("\n📊 Measured call sites:\n");
        for node in &self.nodes {
            let marker = match (node.is_cause, node.verdict) {
                (true, _) => "❌",
                (false, Verdict::Different) => "⚠️ ",
                (false, Verdict::Inconclusive) => "❔",
                (false, Verdict::Same) => "  ",
            };
            let kind = match (node.sentinel, node.modality) {
                (Some(sentinel), _) => format!(" [{}]", sentinel.as_str()),
                (None, Modality::Bimodal(_)) => " [bimodal]".to_string(),
                (None, Modality::Unimodal) => String::new(),
            };
            report.push_str(&format!(
                "{} {}{}{}\n",
                marker,
                "  ".repeat(node.depth),
                node.signature,
                kind
            ));
            report.push_str(&format!(
                "     {}old: {} | new: {}{}\n",
                "  ".repeat(node.depth),
                describe(&node.old, node.old_median),
                describe(&node.new, node.new_median),
                node.change_percent()
                    .map(|p| format!(" ({:+.1}%)", p))
                    .unwrap_or_default()
            ));
        }

        report
    }
}

fn describe(summary: &Summary, median: Option<f32>) -> String {
    if summary.n == 0 {
        return "-".to_string();
    }
    match median {
        Some(median) => format!(
            "mean {:.1}µs ± {:.1}, median {:.1}µs, {} VMs",
            summary.mean, summary.stddev, median, summary.n
        ),
        None => format!("mean {:.1}µs ± {:.1}, {} VMs", summary.mean, summary.stddev, summary.n),
    }
}
