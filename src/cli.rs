//! CLI argument parsing for Spectroscope

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "spectroscope")]
#[command(version)]
#[command(about = "Compare request-flow traces from two periods and rank what changed", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index snapshot files into a trace store
    Index {
        /// Baseline (non-problem) snapshot
        #[arg(long = "snapshot0", value_name = "FILE")]
        snapshot0: PathBuf,

        /// Problem-period snapshot
        #[arg(long = "snapshot1", value_name = "FILE")]
        snapshot1: Option<PathBuf>,

        /// Directory for the store artifacts
        #[arg(long = "out", value_name = "DIR")]
        out: PathBuf,
    },

    /// Compute cluster statistics and write ranked views
    Analyze {
        /// Directory of a built trace store
        #[arg(long = "store", value_name = "DIR")]
        store: PathBuf,

        /// Cluster assignment: one line of input vector ids per cluster
        #[arg(long = "clusters", value_name = "FILE")]
        clusters: PathBuf,

        /// Input vector mapping: one line of global ids per input vector
        #[arg(long = "input-vectors", value_name = "FILE")]
        input_vectors: PathBuf,

        /// Cluster distance matrix (default: edit distance over edge sequences)
        #[arg(long = "distances", value_name = "FILE")]
        distances: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long = "config", value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory for reports and views
        #[arg(long = "out", value_name = "DIR")]
        out: PathBuf,
    },
}
