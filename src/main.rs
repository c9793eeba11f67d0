//! mmu-params: load and report Happy Hare MMU parameters.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load tool settings
//!   3. Parse the parameters file
//!   4. Init logger once (CLI `-v` flags > RUST_LOG > settings, file layer
//!      filtered by the parameters' `log_file_level`)
//!   5. Build the typed parameters
//!   6. Overlay persisted calibration from the variables file
//!   7. Report the version stamp against the configured target
//!   8. Print the resolved parameters

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use mmu_params::cfg::Document;
use mmu_params::error::AppError;
use mmu_params::mmu::{Calibration, HhVersion, MmuParameters, Variables, version};
use mmu_params::logger::{LogLevels, MmuLogLevels};
use mmu_params::{config, logger};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let params_path = args
        .params_path
        .map(PathBuf::from)
        .unwrap_or_else(|| config.parameters.file.clone());
    let vars_path = args
        .vars_path
        .map(PathBuf::from)
        .or_else(|| config.parameters.variables.clone());

    let text = fs::read_to_string(&params_path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", params_path.display())))?;
    let doc = Document::parse(&text)?;

    let levels = LogLevels {
        cli: args.log_level,
        tool: &config.tool.log_level,
        mmu: Some(mmu_log_levels(&doc, &config.parameters.section)),
    };
    logger::init(&levels, config.tool.log_file.as_deref())?;

    info!(
        parameters = %params_path.display(),
        section = %config.parameters.section,
        strict = config.parameters.strict,
        log_level = %levels.console_directive()?,
        "settings loaded"
    );

    let mut params = MmuParameters::from_document(&doc, &config.parameters.section, config.parameters.strict)?;

    if let Some(path) = &vars_path {
        let vars = Variables::load(path)?;
        let calibration = Calibration::from_variables(&vars)?;
        for name in calibration.apply_to(&mut params) {
            info!(parameter = name, "overridden by persisted calibration");
        }
    }

    if let Some(target) = &config.upgrade.target_version {
        let target: HhVersion = target.parse()?;
        let status = version::check(&params.version, target);
        match status {
            version::VersionStatus::Downgrade => {
                warn!(current = %params.version, %target, "config is newer than target")
            }
            _ => info!(current = %params.version, %target, %status, "version checked"),
        }
    }

    info!(
        version = %params.version,
        drying_presets = params.drying_data.len(),
        mmu_log_level = params.logging.log_level,
        "parameters ready"
    );

    if args.json {
        let json = serde_json::to_string_pretty(&params)
            .map_err(|e| AppError::Config(format!("cannot serialise parameters: {e}")))?;
        println!("{json}");
    } else {
        print_summary(&params_path, &params);
    }

    Ok(())
}

/// Raw `log_level` / `log_file_level` ahead of the typed load, so the load
/// itself is logged at the printer's verbosity. Unreadable values fall back
/// to the printer defaults and are reported by the typed load.
fn mmu_log_levels(doc: &Document, section: &str) -> MmuLogLevels {
    let int = |option: &str, default: i64| {
        doc.get(section, option)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    };
    MmuLogLevels {
        console: int("log_level", 1),
        file: int("log_file_level", 3),
    }
}

fn print_summary(path: &std::path::Path, params: &MmuParameters) {
    println!("✓ Parameters loaded: {}", path.display());
    println!("  happy_hare_version   {}", params.version);
    println!(
        "  gear speeds          spool {} / buffer {} / unload {} mm/s",
        params.speeds.gear_from_spool_speed,
        params.speeds.gear_from_buffer_speed,
        params.speeds.gear_unload_speed
    );
    println!(
        "  homing               gate {:?} / extruder {:?}",
        params.gate.gate_homing_endstop, params.extruder.extruder_homing_endstop
    );
    println!(
        "  flowguard            {} (encoder mode {:?}, max motion {} mm)",
        if params.flowguard.flowguard_enabled { "enabled" } else { "disabled" },
        params.flowguard.flowguard_encoder_mode,
        params.flowguard.flowguard_encoder_max_motion
    );
    if let Some(gates) = params.gate_map.num_gates() {
        println!("  gate map defaults    {gates} gates");
    }
    if !params.hidden.is_empty() {
        let names: Vec<&str> = params.hidden.keys().map(String::as_str).collect();
        println!("  hidden options       {}", names.join(", "));
    }
    println!("  drying presets       {}", params.drying_data.len());
    for line in params.drying_data.to_string().lines() {
        println!("    {line}");
    }
}

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct CliArgs {
    config_path: Option<String>,
    params_path: Option<String>,
    vars_path: Option<String>,
    log_level: Option<&'static str>,
    json: bool,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut params_path = None;
    let mut vars_path = None;
    let mut json = false;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            params_path = iter.next().or(params_path);
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: mmu-params [OPTIONS] [MMU_PARAMETERS_CFG]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Tool settings file (default: config/default.toml)");
                println!("      --vars <PATH>          mmu_vars.cfg with persisted calibration");
                println!("      --json                 Print the resolved parameters as JSON");
                println!("  -v, -vv, -vvv              Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => config_path = Some(required_value(&mut iter, "-f/--config")),
            "--vars" => vars_path = Some(required_value(&mut iter, "--vars")),
            "--json" => json = true,
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') => {
                eprintln!("error: unknown option '{a}'");
                std::process::exit(1);
            }
            _ => params_path = Some(arg),
        }
    }

    CliArgs {
        config_path,
        params_path,
        vars_path,
        log_level: logger::level_for_verbosity(verbosity),
        json,
    }
}

fn required_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> String {
    match iter.next() {
        Some(value) => value,
        None => {
            eprintln!("error: {flag} requires a path argument");
            std::process::exit(1);
        }
    }
}
