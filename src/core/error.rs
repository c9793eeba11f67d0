//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("option '{option}' in section [{section}]: {message}")]
    Option {
        section: String,
        option: String,
        message: String,
    },

    #[error("literal error: {0}")]
    Literal(String),

    #[error("upgrade error: {0}")]
    Upgrade(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Shorthand for an [`AppError::Option`] error.
    pub fn option(section: &str, option: &str, message: impl Into<String>) -> Self {
        AppError::Option {
            section: section.to_string(),
            option: option.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        AppError::Parse {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn parse_error_names_line() {
        let e = AppError::parse(42, "missing ':' or '='");
        let msg = e.to_string();
        assert!(msg.contains("line 42"));
        assert!(msg.contains("missing ':'"));
    }

    #[test]
    fn option_error_names_section_and_option() {
        let e = AppError::option("mmu", "gear_max_velocity", "must be above 0");
        let msg = e.to_string();
        assert!(msg.contains("[mmu]"));
        assert!(msg.contains("gear_max_velocity"));
        assert!(msg.contains("must be above 0"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
