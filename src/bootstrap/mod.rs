//! Bootstrap layer: runs before any config file is touched.
//!
//! - **logger**: tracing-subscriber initialisation.

pub mod logger;
