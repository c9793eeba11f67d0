//! `mmu-cfg`: inspect and edit Happy Hare `.cfg` files.
//!
//! Runs a single command against a config file. Edits are written to
//! `--out <path>` when given, otherwise the resulting file goes to stdout.
//!
//! # Usage
//!
//! ```text
//! mmu-cfg [-f <settings.toml>] [-v...] [--out <path>] <command> ...
//!
//! Commands:
//!   check <cfg>                              byte-exact round-trip check
//!   sections <cfg>                           list sections
//!   options <cfg> <section>                  list options of a section
//!   get <cfg> <section> <option>             print one value
//!   set <cfg> <section> <option> <value>     change one value
//!   placeholders <cfg>                       list {placeholders}
//!   render <cfg> NAME=VALUE...               substitute placeholders
//!   drying <cfg> [material...]               drying presets or a plan
//!   version <cfg> <target>                   compare the version stamp
//!   upgrade <cfg> <target>                   apply upgrade steps
//!   build <template> <existing> <version>    build a config for a release
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing::info;

use mmu_params::cfg::{Document, Scope};
use mmu_params::config::Config;
use mmu_params::error::AppError;
use mmu_params::mmu::{self, HhVersion, MmuParameters, VersionStamp, format_minutes, upgrade, version};
use mmu_params::{config, logger};

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct Args {
    config: Option<String>,
    out: Option<PathBuf>,
    verbosity: u8,
    command: Option<String>,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut config = None;
    let mut out = None;
    let mut verbosity = 0u8;
    let mut command = None;
    let mut rest = Vec::new();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-f" => {
                config = iter.next();
            }
            "--out" | "-o" => {
                out = iter.next().map(PathBuf::from);
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            "--" => {
                rest.extend(iter);
                break;
            }
            _ if command.is_none() => command = Some(arg),
            _ => rest.push(arg),
        }
    }

    Args { config, out, verbosity, command, rest }
}

fn print_help() {
    eprintln!("usage: mmu-cfg [-f <settings.toml>] [-v...] [--out <path>] <command> ...");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  check <cfg>                             byte-exact round-trip check");
    eprintln!("  sections <cfg>                          list sections");
    eprintln!("  options <cfg> <section>                 list options of a section");
    eprintln!("  get <cfg> <section> <option>            print one value");
    eprintln!("  set <cfg> <section> <option> <value>    change one value");
    eprintln!("  placeholders <cfg>                      list {{placeholders}}");
    eprintln!("  render <cfg> NAME=VALUE...              substitute placeholders");
    eprintln!("  drying <cfg> [material...]              drying presets or a plan");
    eprintln!("  version <cfg> <target>                  compare the version stamp");
    eprintln!("  upgrade <cfg> <target>                  apply upgrade steps");
    eprintln!("  build <template> <existing> <version>   build a config for a release");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  --config, -f <path>   tool settings file");
    eprintln!("  --out,    -o <path>   write edits here instead of stdout");
    eprintln!("  -v, -vv, -vvv         increase logging verbosity");
    eprintln!("  --help,   -h          print this help");
}

// ── Commands ───────────────────────────────────────────────────────────────

enum Command {
    Check { cfg: PathBuf },
    Sections { cfg: PathBuf },
    Options { cfg: PathBuf, section: String },
    Get { cfg: PathBuf, section: String, option: String },
    Set { cfg: PathBuf, section: String, option: String, value: String },
    Placeholders { cfg: PathBuf },
    Render { cfg: PathBuf, values: BTreeMap<String, String> },
    Drying { cfg: PathBuf, materials: Vec<String> },
    Version { cfg: PathBuf, target: String },
    Upgrade { cfg: PathBuf, target: String },
    Build { template: PathBuf, existing: PathBuf, version: String },
}

fn build_command(cmd: &str, rest: &[String]) -> Result<Command, String> {
    let path = |i: usize, usage: &str| rest.get(i).map(PathBuf::from).ok_or_else(|| usage.to_string());
    let arg = |i: usize, usage: &str| rest.get(i).cloned().ok_or_else(|| usage.to_string());

    match cmd {
        "check" => Ok(Command::Check { cfg: path(0, "usage: mmu-cfg check <cfg>")? }),
        "sections" => Ok(Command::Sections { cfg: path(0, "usage: mmu-cfg sections <cfg>")? }),
        "options" => {
            let usage = "usage: mmu-cfg options <cfg> <section>";
            Ok(Command::Options { cfg: path(0, usage)?, section: arg(1, usage)? })
        }
        "get" => {
            let usage = "usage: mmu-cfg get <cfg> <section> <option>";
            Ok(Command::Get { cfg: path(0, usage)?, section: arg(1, usage)?, option: arg(2, usage)? })
        }
        "set" => {
            let usage = "usage: mmu-cfg set <cfg> <section> <option> <value>";
            Ok(Command::Set {
                cfg: path(0, usage)?,
                section: arg(1, usage)?,
                option: arg(2, usage)?,
                value: arg(3, usage)?,
            })
        }
        "placeholders" => Ok(Command::Placeholders { cfg: path(0, "usage: mmu-cfg placeholders <cfg>")? }),
        "render" => {
            let usage = "usage: mmu-cfg render <cfg> NAME=VALUE...";
            let cfg = path(0, usage)?;
            let mut values = BTreeMap::new();
            for pair in &rest[1..] {
                let (name, value) = pair.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{pair}'"))?;
                values.insert(name.to_string(), value.to_string());
            }
            Ok(Command::Render { cfg, values })
        }
        "drying" => Ok(Command::Drying {
            cfg: path(0, "usage: mmu-cfg drying <cfg> [material...]")?,
            materials: rest.iter().skip(1).cloned().collect(),
        }),
        "version" => {
            let usage = "usage: mmu-cfg version <cfg> <target>";
            Ok(Command::Version { cfg: path(0, usage)?, target: arg(1, usage)? })
        }
        "upgrade" => {
            let usage = "usage: mmu-cfg upgrade <cfg> <target>";
            Ok(Command::Upgrade { cfg: path(0, usage)?, target: arg(1, usage)? })
        }
        "build" => {
            let usage = "usage: mmu-cfg build <template> <existing> <version>";
            Ok(Command::Build { template: path(0, usage)?, existing: path(1, usage)?, version: arg(2, usage)? })
        }
        other => Err(format!("unknown command: {other}\n  run 'mmu-cfg --help' for usage")),
    }
}

fn read(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))
}

fn load(path: &Path) -> Result<Document, AppError> {
    Document::parse(&read(path)?)
}

/// Write an edited document to `out`, or to stdout.
fn emit(doc: &Document, out: Option<&Path>) -> Result<(), AppError> {
    match out {
        Some(path) => {
            fs::write(path, doc.to_string())?;
            info!(path = %path.display(), "config written");
            eprintln!("ok  wrote {}", path.display());
        }
        None => print!("{doc}"),
    }
    Ok(())
}

fn execute(command: Command, settings: &Config, out: Option<&Path>) -> Result<(), AppError> {
    match command {
        Command::Check { cfg } => {
            let text = read(&cfg)?;
            let doc = Document::parse(&text)?;
            let rendered = doc.to_string();
            if rendered != text {
                let line = text
                    .lines()
                    .zip(rendered.lines())
                    .position(|(a, b)| a != b)
                    .unwrap_or_else(|| text.lines().count().min(rendered.lines().count()))
                    + 1;
                return Err(AppError::parse(line, "round trip differs"));
            }
            let reparsed = Document::parse(&doc.to_canonical_string())?;
            if reparsed.entries() != doc.entries() {
                return Err(AppError::Config("canonical form does not re-parse to the same options".into()));
            }
            for dup in doc.duplicates() {
                eprintln!("warn  duplicate [{}] {} on lines {:?}", dup.section, dup.option, dup.lines);
            }
            println!("ok");
        }
        Command::Sections { cfg } => {
            let doc = load(&cfg)?;
            let excluded = doc.sections(Scope::Excluded);
            for name in doc.sections(Scope::All) {
                if excluded.contains(&name) {
                    println!("{name}  (excluded)");
                } else {
                    println!("{name}");
                }
            }
        }
        Command::Options { cfg, section } => {
            let doc = load(&cfg)?;
            if !doc.has_section(&section) {
                return Err(AppError::Config(format!("no section [{section}]")));
            }
            for (name, value) in doc.items(&section) {
                println!("{name}: {value}");
            }
        }
        Command::Get { cfg, section, option } => {
            let doc = load(&cfg)?;
            let value = doc
                .get(&section, &option)
                .ok_or_else(|| AppError::option(&section, &option, "not set"))?;
            println!("{value}");
        }
        Command::Set { cfg, section, option, value } => {
            let mut doc = load(&cfg)?;
            doc.set(&section, &option, &value)?;
            emit(&doc, out)?;
        }
        Command::Placeholders { cfg } => {
            for name in load(&cfg)?.placeholders() {
                println!("{name}");
            }
        }
        Command::Render { cfg, values } => {
            let mut doc = load(&cfg)?;
            for name in doc.render_placeholders(&values) {
                eprintln!("warn  unresolved placeholder {{{name}}}");
            }
            emit(&doc, out)?;
        }
        Command::Drying { cfg, materials } => {
            let doc = load(&cfg)?;
            let params = MmuParameters::from_document(&doc, &settings.parameters.section, false)?;
            if materials.is_empty() {
                print!("{}", params.drying_data);
                return Ok(());
            }
            let materials: Vec<&str> = materials.iter().map(String::as_str).collect();
            for entry in params.drying_data.plan(&materials, &params.heater) {
                println!(
                    "{}: {}°C for {}{}",
                    entry.material.to_uppercase(),
                    entry.temp,
                    format_minutes(entry.minutes),
                    if entry.known { "" } else { "  (default)" }
                );
            }
        }
        Command::Version { cfg, target } => {
            let target: HhVersion = target.parse()?;
            let stamp = VersionStamp::read(&load(&cfg)?)?;
            println!("{stamp} -> {target}: {}", version::check(&stamp, target));
        }
        Command::Upgrade { cfg, target } => {
            let target: HhVersion = target.parse()?;
            let mut doc = load(&cfg)?;
            let from = VersionStamp::read(&doc)?
                .version()
                .ok_or_else(|| AppError::Upgrade(format!("{} has no happy_hare_version to upgrade from", cfg.display())))?;
            let reached = upgrade::upgrade(&mut doc, from, target)?;
            eprintln!("ok  {} upgrade step(s) from {from}", reached.len());
            emit(&doc, out)?;
        }
        Command::Build { template, existing, version } => {
            let version: HhVersion = version.parse()?;
            let template = read(&template)?;
            let existing = if existing.exists() {
                Some(read(&existing)?)
            } else {
                eprintln!("warn  {} not found, building a fresh config", existing.display());
                None
            };
            let output = mmu::build(&template, existing.as_deref(), version, &settings.parameters.section)?;
            if let Some(stamp) = &output.existing_version {
                eprintln!("ok  existing config at {stamp}, {} upgrade step(s)", output.upgraded.len());
            }
            if let Some(report) = &output.report {
                eprintln!("ok  {} option(s) carried over", report.copied.len() + report.reinserted.len());
                if report.excluded_preserved {
                    eprintln!("ok  excluded sections preserved");
                }
                for (section, option) in &report.dropped {
                    eprintln!("warn  dropped [{section}] {option}");
                }
            }
            for name in &output.unresolved {
                eprintln!("warn  unresolved placeholder {{{name}}}");
            }
            emit(&output.document, out)?;
        }
    }
    Ok(())
}

fn main() {
    let _ = dotenvy::dotenv();
    let args = parse_args();

    let Some(cmd) = args.command.as_deref() else {
        print_help();
        process::exit(1);
    };

    let command = match build_command(cmd, &args.rest) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(command, &args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(command: Command, args: &Args) -> Result<(), AppError> {
    let settings = config::load(args.config.as_deref())?;
    // Commands work on arbitrary files, so there are no parameter levels to follow.
    let levels = logger::LogLevels {
        cli: logger::level_for_verbosity(args.verbosity),
        tool: &settings.tool.log_level,
        mmu: None,
    };
    logger::init(&levels, settings.tool.log_file.as_deref())?;
    execute(command, &settings, args.out.as_deref())
}
