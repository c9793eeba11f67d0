//! Logging initialisation via tracing-subscriber.
//!
//! Console output always goes to stderr. When a log file is configured it
//! gets its own layer, filtered by the parameters' `log_file_level` the same
//! way the printer filters `mmu.log`.

use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::AppError;

/// `[tool] log_level` value that defers to the parameters' own `log_level`.
pub const FOLLOW_MMU: &str = "mmu";

/// `log_level` / `log_file_level` as read from the parameters section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmuLogLevels {
    /// Console verbosity, 0..=4.
    pub console: i64,
    /// File verbosity, negative disables the file.
    pub file: i64,
}

/// Verbosity sources, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub struct LogLevels<'a> {
    /// From `-v` flags.
    pub cli: Option<&'a str>,
    /// `[tool] log_level`: a level, an `EnvFilter` directive or [`FOLLOW_MMU`].
    pub tool: &'a str,
    /// `None` when no parameters file was read.
    pub mmu: Option<MmuLogLevels>,
}

impl LogLevels<'_> {
    /// Directive for the console layer. `RUST_LOG` sits between `-v` and the
    /// tool setting.
    pub fn console_directive(&self) -> Result<String, AppError> {
        if let Some(cli) = self.cli {
            parse_level(cli)?;
            return Ok(cli.to_string());
        }
        if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
            if EnvFilter::try_new(&env).is_ok() {
                return Ok(env);
            }
        }
        self.tool_directive()
    }

    fn tool_directive(&self) -> Result<String, AppError> {
        if self.tool == FOLLOW_MMU {
            // Without a parameters file the printer's default console level applies.
            let level = self.mmu.map_or(1, |m| m.console);
            return Ok(level_for_mmu_log_level(level).to_string());
        }
        EnvFilter::try_new(self.tool)
            .map(|_| self.tool.to_string())
            .map_err(|e| AppError::Logger(format!("invalid log level '{}': {e}", self.tool)))
    }

    /// Level for the file layer. `None` disables the file even when a path is
    /// configured. Without parameters the file follows the tool setting, and
    /// a directive that is not a plain level leaves the file unfiltered.
    pub fn file_level(&self) -> Result<Option<LevelFilter>, AppError> {
        match self.mmu {
            Some(m) if m.file < 0 => Ok(None),
            Some(m) => Ok(Some(level_for_mmu_log_level(m.file))),
            None => {
                let directive = self.cli.map_or_else(|| self.tool_directive(), |l| Ok(l.to_string()))?;
                Ok(Some(parse_level(&directive).unwrap_or(LevelFilter::TRACE)))
            }
        }
    }
}

/// Initialise the global tracing subscriber.
///
/// Fails on an invalid `[tool] log_level`, an unopenable `log_file`, or a
/// subscriber that is already set.
pub fn init(levels: &LogLevels<'_>, log_file: Option<&Path>) -> Result<(), AppError> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(levels.console_directive()?));

    let file = match (log_file, levels.file_level()?) {
        (Some(path), Some(level)) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(level),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Parse a plain level name into a [`LevelFilter`].
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

/// Map `-v` repetitions onto a level. Zero means "use the configured level".
pub fn level_for_verbosity(count: u8) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Map an MMU `log_level` / `log_file_level` (0..=4) onto a tracing level.
pub fn level_for_mmu_log_level(mmu_level: i64) -> LevelFilter {
    match mmu_level {
        i64::MIN..=0 => LevelFilter::ERROR,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
