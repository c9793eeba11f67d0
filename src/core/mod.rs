//! Core infrastructure: shared foundation used across the whole crate.
//!
//! - **config**: the tool's own settings (TOML) and resolved types.
//! - **error**: application-wide error enum.

pub mod config;
pub mod error;
