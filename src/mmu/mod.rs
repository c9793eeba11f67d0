//! Happy Hare MMU parameters.
//!
//! - **choices**: enumerated option values.
//! - **drying**: `drying_data` presets and heater limits.
//! - **params**: the typed `[mmu]` schema.
//! - **vars**: `mmu_vars.cfg` and the calibration it persists.
//! - **version** / **upgrade** / **carry**: the config build workflow.

pub mod carry;
pub mod choices;
pub mod drying;
pub mod params;
pub mod upgrade;
pub mod vars;
pub mod version;

pub use carry::{BuildOutput, CarryReport, build, carry_over};
pub use drying::{DryingPlanEntry, DryingPreset, DryingTable, HeaterSettings, format_minutes};
pub use params::MmuParameters;
pub use vars::{Calibration, Variables};
pub use version::{HhVersion, VersionStamp, VersionStatus};
