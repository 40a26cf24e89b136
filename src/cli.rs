//! CLI argument parsing for perfcause

use crate::config::TestCase;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "perfcause")]
#[command(version)]
#[command(about = "Level-wise root cause search for performance changes between two versions", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output (to stderr)
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the call tree of a test for the call sites whose own time changed
    Search {
        /// Settings file ([search], [measurement] and [command] tables)
        #[arg(long = "config", value_name = "FILE")]
        config: PathBuf,

        /// Directory holding <version>/<Class#method>.json trace files
        #[arg(long = "traces", value_name = "DIR")]
        traces: PathBuf,

        /// Directory of the search cache
        #[arg(long = "cache", value_name = "DIR")]
        cache: PathBuf,

        /// Print the per-node diagnostics report instead of the bare causes
        #[arg(long = "report")]
        report: bool,
    },

    /// Print the diagnostics report of a cached search
    Inspect {
        /// Directory of the search cache
        #[arg(long = "cache", value_name = "DIR")]
        cache: PathBuf,

        /// Newer version
        #[arg(long = "version", value_name = "VERSION")]
        new_version: String,

        /// Predecessor version
        #[arg(long = "version-old", value_name = "VERSION")]
        version_old: String,

        /// Test case, written Class#method
        #[arg(long = "test-case", value_name = "CLASS#METHOD")]
        test_case: TestCase,

        /// Settings file to take statistics parameters from
        #[arg(long = "config", value_name = "FILE")]
        config: Option<PathBuf>,
    },
}
