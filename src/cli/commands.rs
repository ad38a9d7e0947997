//! Subcommand handlers for config actions.

use std::path::Path;

use super::args::ConfigAction;
use crate::config::{default_path, Config, ConfigError};

/// Handle config subcommand actions.
///
/// `path` is the file given with `--config`, if any; `effective` is the
/// configuration after command-line overrides.
pub fn handle_config_action(
    action: ConfigAction,
    path: Option<&Path>,
    effective: &Config,
) -> Result<(), ConfigError> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found, using defaults)", config_path.display());
            }
            println!();
            print!("{}", effective.to_toml()?);
        }
        ConfigAction::Init => {
            Config::init_file(&config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}
