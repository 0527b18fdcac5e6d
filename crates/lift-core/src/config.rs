//! Insight configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, else the override in the data dir
//!    (~/.local/share/lift/config/insight.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::insight::{ExclusiveThresholds, InsightOptions, MAX_CONVERGENCE_DP};
use crate::model::{EmOptions, DEFAULT_CLUSTER_STATES, DEFAULT_LATENT_STATES};

/// Embedded default config (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/insight.toml");

/// Which dataset columns enter the network
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataConfig {
    pub discrete: Vec<String>,
    pub continuous: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub latent_states: usize,
    pub cluster_states: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            latent_states: DEFAULT_LATENT_STATES,
            cluster_states: DEFAULT_CLUSTER_STATES,
        }
    }
}

/// Defaults for the insight searches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConfig {
    pub times: usize,
    pub top: usize,
    pub combination_times: usize,
    pub combination_top: usize,
    pub conditioned: usize,
    pub total_iterations_limit: usize,
    pub diff_convergence_dp: u32,
    pub over_limit_threshold: f64,
    pub rationalise_num: usize,
    pub exclusive: ExclusiveThresholds,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            times: 1,
            top: 10,
            combination_times: 5,
            combination_top: 3,
            conditioned: 3,
            total_iterations_limit: 10,
            diff_convergence_dp: 4,
            over_limit_threshold: 0.9,
            rationalise_num: 20,
            exclusive: ExclusiveThresholds::default(),
        }
    }
}

impl SearchConfig {
    pub fn insight_options(&self) -> InsightOptions {
        InsightOptions {
            exclusive: self.exclusive,
            over_limit_threshold: self.over_limit_threshold,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiftConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: EmOptions,
    pub search: SearchConfig,
}

impl LiftConfig {
    /// Load from `path`, else the data-dir override, else the embedded defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => read_config(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_config(&path)?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };
        parse_config(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidData(format!("Failed to serialize config: {}", e)))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("lift").join("config").join("insight.toml"))
}

fn read_config(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "Reading config");
    fs::read_to_string(path).map_err(|e| {
        Error::InvalidData(format!(
            "Failed to read config {}: {}",
            path.display(),
            e
        ))
    })
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    data: Option<RawData>,
    model: Option<RawModel>,
    training: Option<EmOptions>,
    search: Option<RawSearch>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    discrete: Option<Vec<String>>,
    continuous: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    latent_states: Option<usize>,
    cluster_states: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    times: Option<usize>,
    top: Option<usize>,
    combination_times: Option<usize>,
    combination_top: Option<usize>,
    conditioned: Option<usize>,
    total_iterations_limit: Option<usize>,
    diff_convergence_dp: Option<u32>,
    over_limit_threshold: Option<f64>,
    rationalise_num: Option<usize>,
    exclusive: Option<ExclusiveThresholds>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<LiftConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::InvalidData(format!("Invalid config TOML: {}", e)))?;

    let mut config = LiftConfig::default();

    if let Some(data) = raw.data {
        if let Some(discrete) = data.discrete {
            config.data.discrete = discrete;
        }
        if let Some(continuous) = data.continuous {
            config.data.continuous = continuous;
        }
    }

    if let Some(model) = raw.model {
        if let Some(latent) = model.latent_states {
            config.model.latent_states = latent;
        }
        if let Some(cluster) = model.cluster_states {
            config.model.cluster_states = cluster;
        }
    }

    if let Some(training) = raw.training {
        config.training = training;
    }

    if let Some(search) = raw.search {
        let s = &mut config.search;
        s.times = search.times.unwrap_or(s.times);
        s.top = search.top.unwrap_or(s.top);
        s.combination_times = search.combination_times.unwrap_or(s.combination_times);
        s.combination_top = search.combination_top.unwrap_or(s.combination_top);
        s.conditioned = search.conditioned.unwrap_or(s.conditioned);
        s.total_iterations_limit = search
            .total_iterations_limit
            .unwrap_or(s.total_iterations_limit);
        s.diff_convergence_dp = search.diff_convergence_dp.unwrap_or(s.diff_convergence_dp);
        s.over_limit_threshold = search
            .over_limit_threshold
            .unwrap_or(s.over_limit_threshold);
        s.rationalise_num = search.rationalise_num.unwrap_or(s.rationalise_num);
        if let Some(exclusive) = search.exclusive {
            s.exclusive = exclusive;
        }
    }

    if !(0.0..=1.0).contains(&config.search.over_limit_threshold) {
        return Err(Error::InvalidData(format!(
            "over_limit_threshold {} is not a probability between 0 and 1",
            config.search.over_limit_threshold
        )));
    }
    if config.search.diff_convergence_dp > MAX_CONVERGENCE_DP {
        return Err(Error::InvalidData(format!(
            "diff_convergence_dp {} is above the {} decimal places an f64 holds",
            config.search.diff_convergence_dp, MAX_CONVERGENCE_DP
        )));
    }
    if config.model.latent_states == 0 {
        return Err(Error::InvalidData(
            "latent_states must be at least 1".to_string(),
        ));
    }

    Ok(config)
}
