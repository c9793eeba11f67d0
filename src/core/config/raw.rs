//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape: serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub tool: RawTool,
    #[serde(default)]
    pub parameters: RawParameters,
    #[serde(default)]
    pub upgrade: RawUpgrade,
}

#[derive(Deserialize)]
pub(super) struct RawTool {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for RawTool {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

// ── Parameters ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawParameters {
    #[serde(default = "default_parameters_file")]
    pub file: String,
    /// Section holding the MMU parameters. `[mmu]` in the shipped template.
    #[serde(default = "default_section")]
    pub section: String,
    /// Reject options the schema does not know instead of warning.
    #[serde(default = "default_false")]
    pub strict: bool,
    #[serde(default)]
    pub variables: Option<String>,
}

impl Default for RawParameters {
    fn default() -> Self {
        Self {
            file: default_parameters_file(),
            section: default_section(),
            strict: false,
            variables: None,
        }
    }
}

// ── Upgrade ─────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(super) struct RawUpgrade {
    #[serde(default)]
    pub target_version: Option<String>,
}

pub(super) fn default_log_level() -> String {
    "warn".to_string()
}

pub(super) fn default_parameters_file() -> String {
    "config/base/mmu_parameters.cfg".to_string()
}

pub(super) fn default_section() -> String {
    "mmu".to_string()
}

fn default_false() -> bool {
    false
}
