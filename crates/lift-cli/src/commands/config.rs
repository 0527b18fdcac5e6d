//! Config command

use anyhow::Result;
use lift_core::{default_config_path, LiftConfig};

use super::print_json;

pub fn cmd_config(config: &LiftConfig, json: bool) -> Result<()> {
    if json {
        return print_json(config);
    }

    if let Some(path) = default_config_path() {
        let state = if path.exists() { "" } else { " (not present)" };
        println!("# Override file: {}{}", path.display(), state);
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
