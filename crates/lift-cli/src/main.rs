//! Lift CLI - Sensitivity analysis over latent-cluster Bayesian networks
//!
//! Usage:
//!   lift --data customers.csv bivariate 'churn$$yes'       Rank single states
//!   lift --data customers.csv converge 'churn$$yes'        Convergent combinations
//!   lift --data customers.csv diff --evidence 'plan$$pro'  Evidence diff
//!   lift config                                             Effective config

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use commands::{Context, Overrides};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let overrides = Overrides {
        discrete: cli.discrete,
        continuous: cli.continuous,
        seed: cli.seed,
    };

    let config_path = cli.config.as_deref();
    let data_path = cli.data.as_deref();
    let json = cli.json;
    let load = || Context::load(config_path, data_path, &overrides, json);

    match cli.command {
        Commands::Diff { evidence, base } => commands::cmd_diff(&load()?, &base, &evidence),
        Commands::Exclusive { target, times, top } => {
            commands::cmd_exclusive(&load()?, &target, times, top)
        }
        Commands::Bivariate { target, times, top } => {
            commands::cmd_bivariate(&load()?, &target, times, top)
        }
        Commands::Combinations { target, times, top } => {
            commands::cmd_combinations(&load()?, &target, times, top)
        }
        Commands::Converge {
            target,
            conditioned,
            limit,
            dp,
            rationalise,
        } => commands::cmd_converge(
            &load()?,
            &target,
            commands::ConvergeArgs {
                conditioned,
                limit,
                dp,
                rationalise,
            },
        ),
        Commands::Predict { target, limit } => commands::cmd_predict(&load()?, &target, limit),
        Commands::Config => {
            let config = commands::load_config(config_path, &overrides)?;
            commands::cmd_config(&config, json)
        }
    }
}
