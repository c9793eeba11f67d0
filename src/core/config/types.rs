//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the binaries consume.
//! Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;

/// Logging settings for the tool itself (not the MMU `log_level` parameter).
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// A level, an `EnvFilter` directive, or `"mmu"` to follow the parameters' `log_level`.
    pub log_level: String,
    /// Also append log output here, filtered by `log_file_level` (already expanded, no `~`).
    pub log_file: Option<PathBuf>,
}

/// Where the MMU parameters live and how strictly they are read.
#[derive(Debug, Clone)]
pub struct ParametersConfig {
    /// Path to `mmu_parameters.cfg` (already expanded, no `~`).
    pub file: PathBuf,
    /// Section name holding the parameters.
    pub section: String,
    /// Unknown options are an error instead of a warning.
    pub strict: bool,
    /// Optional `mmu_vars.cfg` with persisted calibration.
    pub variables: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    /// Version the `build`/`upgrade` commands migrate to when none is given.
    pub target_version: Option<String>,
}

/// Fully-resolved tool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub tool: ToolConfig,
    pub parameters: ParametersConfig,
    pub upgrade: UpgradeConfig,
}

/// Values that win over the settings file. `load` fills these from the
/// environment; tests construct them directly.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub parameters_file: Option<String>,
    pub variables_file: Option<String>,
    pub log_level: Option<String>,
}
