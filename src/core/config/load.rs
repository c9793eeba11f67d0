//! Settings loading with env-var overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Load settings from the given path, or `config/default.toml`, then apply
/// `MMU_PARAMS_FILE`, `MMU_PARAMS_VARS` and `MMU_PARAMS_LOG_LEVEL`.
/// If no path is given and `config/default.toml` does not exist, the built-in
/// defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides {
        parameters_file: env::var("MMU_PARAMS_FILE").ok(),
        variables_file: env::var("MMU_PARAMS_VARS").ok(),
        log_level: env::var("MMU_PARAMS_LOG_LEVEL").ok(),
    };

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, &overrides)
    } else {
        Ok(resolve(RawConfig::default(), &overrides))
    }
}

/// Internal loader: accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    Ok(resolve(parsed, overrides))
}

fn resolve(parsed: RawConfig, overrides: &Overrides) -> Config {
    let log_level = overrides
        .log_level
        .clone()
        .unwrap_or(parsed.tool.log_level);
    let file = overrides
        .parameters_file
        .as_deref()
        .unwrap_or(&parsed.parameters.file)
        .to_string();
    let variables = overrides
        .variables_file
        .clone()
        .or(parsed.parameters.variables);

    Config {
        tool: ToolConfig {
            log_level,
            log_file: parsed.tool.log_file.as_deref().map(expand_home),
        },
        parameters: ParametersConfig {
            file: expand_home(&file),
            section: parsed.parameters.section,
            strict: parsed.parameters.strict,
            variables: variables.as_deref().map(expand_home),
        },
        upgrade: UpgradeConfig {
            target_version: parsed.upgrade.target_version,
        },
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
