//! Tool settings with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `MMU_PARAMS_FILE`, `MMU_PARAMS_VARS` and
//! `MMU_PARAMS_LOG_LEVEL` env overrides.
//!
//! These are the settings of the tooling, not the MMU parameters themselves;
//! those live in the Klipper-style `.cfg` file that `[parameters] file` points at.
//!
//! # Module layout
//!
//! - **types**: Public configuration structs (`Config`, `ParametersConfig`, …).
//! - **raw**: Raw TOML deserialization types. These mirror the file shape
//!   and use serde defaults; kept private.
//! - **load**: Loading logic: `load`, `load_from`, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from};
pub use types::*;

#[cfg(test)]
impl Config {
    /// Settings pointing at the shipped template, no variables file.
    pub fn test_default() -> Self {
        Self {
            tool: ToolConfig {
                log_level: "warn".into(),
                log_file: None,
            },
            parameters: ParametersConfig {
                file: std::path::PathBuf::from(raw::default_parameters_file()),
                section: raw::default_section(),
                strict: false,
                variables: None,
            },
            upgrade: UpgradeConfig {
                target_version: None,
            },
        }
    }
}
