//! perfcause - level-wise root cause search for performance changes
//!
//! Given the call trees of one test in two versions, the search measures the
//! trees level by level and descends only below call sites whose own
//! execution time changed significantly. The result is the set of deepest
//! changed call sites.
//!
//! Collaborators are traits: a [`searcher::Measurer`] produces samples, a
//! [`trace_source::TraceSource`] produces the unpaired trees and a
//! [`cache::CacheStore`] persists progress between frontiers.

pub mod cache;
pub mod call_tree;
pub mod cli;
pub mod command_measurer;
pub mod comparator;
pub mod config;
pub mod error;
pub mod level_selector;
pub mod report;
pub mod searcher;
pub mod stats;
pub mod trace_source;

pub use comparator::{is_different, CompareData};
pub use error::{CauseSearchError, MeasurementError, Result};
pub use searcher::search;
