//! Shared command context and utilities
//!
//! This module contains:
//! - `load_config` - Resolve the config and apply command-line overrides
//! - `Context` - Config, dataset and output mode shared by every command
//! - `parse_target` / `parse_evidence` - Token parsing with CLI-friendly errors

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use lift_core::{
    AutoInsight, Dataset, DiscreteAssignment, EmTrainer, EvidenceSet, LiftConfig, StructureSpec,
};
use serde::Serialize;
use tracing::debug;

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub discrete: Vec<String>,
    pub continuous: Vec<String>,
    pub seed: Option<u64>,
}

/// Load the effective config: file (or defaults) plus overrides
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<LiftConfig> {
    let mut config = LiftConfig::load(path).context("Failed to load config")?;
    if !overrides.discrete.is_empty() {
        config.data.discrete = overrides.discrete.clone();
    }
    if !overrides.continuous.is_empty() {
        config.data.continuous = overrides.continuous.clone();
    }
    if overrides.seed.is_some() {
        config.training.seed = overrides.seed;
    }
    Ok(config)
}

/// Everything a command needs to train and query
pub struct Context {
    pub config: LiftConfig,
    pub data: Arc<Dataset>,
    pub json: bool,
}

impl Context {
    pub fn load(
        config_path: Option<&Path>,
        data_path: Option<&Path>,
        overrides: &Overrides,
        json: bool,
    ) -> Result<Self> {
        let config = load_config(config_path, overrides)?;
        let Some(data_path) = data_path else {
            bail!("No dataset given. Pass --data <csv>");
        };
        let data = Dataset::from_path(data_path)
            .with_context(|| format!("Failed to load dataset {}", data_path.display()))?;
        debug!(rows = data.len(), columns = data.columns().len(), "Loaded dataset");
        Ok(Self::new(config, data, json))
    }

    pub fn new(config: LiftConfig, data: Dataset, json: bool) -> Self {
        Self {
            config,
            data: Arc::new(data),
            json,
        }
    }

    /// Network structure over the configured columns
    pub fn structure(&self) -> Result<StructureSpec> {
        let data = &self.config.data;
        if data.discrete.is_empty() {
            bail!("No discrete columns configured. Set [data] discrete or pass --discrete");
        }
        self.data
            .structure(
                &data.discrete,
                &data.continuous,
                self.config.model.latent_states,
                self.config.model.cluster_states,
            )
            .context("Failed to build network structure")
    }

    /// Insight engine training on every dataset row
    pub fn insight(&self) -> Result<AutoInsight<EmTrainer>> {
        let trainer = EmTrainer::new(self.data.clone(), self.config.training.clone());
        Ok(
            AutoInsight::new(trainer, self.structure()?, self.data.row_indexes())
                .with_options(self.config.search.insight_options()),
        )
    }
}

/// Parse a `variable$$state` target
pub fn parse_target(token: &str) -> Result<DiscreteAssignment> {
    DiscreteAssignment::from_token(token)
        .with_context(|| format!("Invalid target '{}' (use variable$$state)", token))
}

/// Parse `variable$$state` evidence tokens
pub fn parse_evidence(tokens: &[String]) -> Result<EvidenceSet> {
    EvidenceSet::from_tokens(tokens).context("Invalid evidence (use variable$$state)")
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Signed percentage-point display of a probability shift
pub fn format_shift(difference: f64) -> String {
    format!("{:+.2}pp", difference * 100.0)
}
