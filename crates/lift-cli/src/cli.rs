//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Lift - Explain what moves a target probability
#[derive(Parser)]
#[command(name = "lift")]
#[command(about = "Sensitivity analysis over latent-cluster Bayesian networks", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.local/share/lift/config/insight.toml, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// CSV dataset to train on
    #[arg(short, long, global = true)]
    pub data: Option<PathBuf>,

    /// Discrete columns, comma separated (overrides config)
    #[arg(long, value_delimiter = ',', global = true)]
    pub discrete: Vec<String>,

    /// Continuous columns, comma separated (overrides config)
    #[arg(long, value_delimiter = ',', global = true)]
    pub continuous: Vec<String>,

    /// Training seed (overrides config)
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train one model and show how evidence shifts every variable
    Diff {
        /// Evidence to add, as variable$$state tokens
        #[arg(short, long, value_delimiter = ',', required = true)]
        evidence: Vec<String>,

        /// Evidence both sides share, as variable$$state tokens
        #[arg(short, long, value_delimiter = ',')]
        base: Vec<String>,
    },

    /// Find rare states that strongly lift the target
    Exclusive {
        /// Target as variable$$state
        target: String,

        /// Models to train and aggregate over
        #[arg(long)]
        times: Option<usize>,

        /// Ranked entries to keep
        #[arg(long)]
        top: Option<usize>,
    },

    /// Rank single states by how much they lift the target
    Bivariate {
        /// Target as variable$$state
        target: String,

        /// Models to train and aggregate over
        #[arg(long)]
        times: Option<usize>,

        /// Ranked entries to keep
        #[arg(long)]
        top: Option<usize>,
    },

    /// Greedily build evidence combinations, one per model
    Combinations {
        /// Target as variable$$state
        target: String,

        /// Models to train
        #[arg(long)]
        times: Option<usize>,

        /// Evidence items per combination
        #[arg(long)]
        top: Option<usize>,
    },

    /// Grow evidence until the target probability settles
    Converge {
        /// Target as variable$$state
        target: String,

        /// Stop after this many runs end over the probability threshold
        #[arg(long)]
        conditioned: Option<usize>,

        /// Maximum number of runs
        #[arg(long)]
        limit: Option<usize>,

        /// Decimal places compared for convergence
        #[arg(long)]
        dp: Option<u32>,

        /// Also rank the tokens across runs, keeping this many
        /// (bare flag uses search.rationalise_num)
        #[arg(long, num_args = 0..=1, value_name = "NUM")]
        rationalise: Option<Option<usize>>,
    },

    /// Predict target columns for each row from the other columns
    Predict {
        /// Columns to predict, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        target: Vec<String>,

        /// Only scan the first N rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective configuration
    Config,
}
