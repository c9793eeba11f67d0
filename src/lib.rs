// Library root. Both binaries and the integration tests build on it.

pub mod bootstrap;
pub mod cfg;
pub mod core;
pub mod mmu;

pub use self::bootstrap::logger;
pub use self::core::{config, error};
