//! Typed option reads with Klipper-style bounds.
//!
//! [`OptionReader`] wraps one section of a [`Document`]. Each getter takes a
//! default used when the option is absent or empty, checks the parsed value
//! against [`Bounds`], and records the option as used so that
//! [`OptionReader::unused`] can report options nothing asked for.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::AppError;

use super::document::{Document, is_gcode_option};
use super::literal::Literal;
use super::parse::comment_start;

/// Inclusive (`min`, `max`) and exclusive (`above`, `below`) limits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub above: Option<f64>,
    pub below: Option<f64>,
}

impl Bounds {
    pub const NONE: Bounds = Bounds {
        min: None,
        max: None,
        above: None,
        below: None,
    };

    pub fn range(min: f64, max: f64) -> Self {
        Bounds {
            min: Some(min),
            max: Some(max),
            ..Bounds::NONE
        }
    }

    pub fn min(min: f64) -> Self {
        Bounds {
            min: Some(min),
            ..Bounds::NONE
        }
    }

    pub fn above(above: f64) -> Self {
        Bounds {
            above: Some(above),
            ..Bounds::NONE
        }
    }

    pub fn with_max(self, max: f64) -> Self {
        Bounds {
            max: Some(max),
            ..self
        }
    }

    pub fn with_below(self, below: f64) -> Self {
        Bounds {
            below: Some(below),
            ..self
        }
    }

    /// The reason `v` is out of bounds, if it is.
    pub fn violation(&self, v: f64) -> Option<String> {
        if let Some(min) = self.min {
            if v < min {
                return Some(format!("must have minimum of {min}"));
            }
        }
        if let Some(max) = self.max {
            if v > max {
                return Some(format!("must have maximum of {max}"));
            }
        }
        if let Some(above) = self.above {
            if v <= above {
                return Some(format!("must be above {above}"));
            }
        }
        if let Some(below) = self.below {
            if v >= below {
                return Some(format!("must be below {below}"));
            }
        }
        None
    }
}

/// A closed set of accepted option values.
pub trait Choice: Copy + Sized + 'static {
    const ALL: &'static [Self];

    /// The spelling used in config files.
    fn as_str(self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

/// Best-effort shape of a raw value, independent of any schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Int(i64),
    Float(f64),
    /// The whole value is `{name}`.
    Placeholder(String),
    /// A `{ ... }` literal such as `drying_data`.
    Dict(Literal),
    List(Vec<String>),
    Str(String),
}

impl Value {
    pub fn infer(raw: &str) -> Value {
        let v = raw.trim();
        if v.is_empty() {
            return Value::Empty;
        }
        if let Ok(i) = v.parse::<i64>() {
            return Value::Int(i);
        }
        if v.contains(|c: char| c.is_ascii_digit()) {
            if let Ok(f) = v.parse::<f64>() {
                return Value::Float(f);
            }
        }
        if v.starts_with('{') {
            if let Ok(lit @ Literal::Dict(_)) = Literal::parse(v) {
                return Value::Dict(lit);
            }
            if let Some(inner) = v.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Value::Placeholder(inner.to_string());
                }
            }
        }
        if v.contains(',') {
            return Value::List(split_list(v));
        }
        Value::Str(v.to_string())
    }
}

/// Comma-separated items, trimmed, empty items dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The value as Klipper hands it to the runtime. The document keeps `gcode*`
/// values verbatim, but Klipper still strips their inline comments.
fn runtime_value(name: &str, value: &str) -> String {
    if !is_gcode_option(name) {
        return value.to_string();
    }
    value
        .lines()
        .map(|line| line[..comment_start(line, true).unwrap_or(line.len())].trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Typed, access-tracked view of one section.
pub struct OptionReader {
    section: String,
    /// Lower-cased name to (name as written, value).
    values: BTreeMap<String, (String, String)>,
    used: BTreeSet<String>,
}

impl OptionReader {
    /// Collect the options of every header named `section`; later headers win.
    pub fn new(doc: &Document, section: &str) -> Result<Self, AppError> {
        if !doc.has_section(section) {
            return Err(AppError::Config(format!("section [{section}] not found")));
        }
        let mut values = BTreeMap::new();
        for s in doc.sections.iter().filter(|s| s.name() == section) {
            for opt in s.options() {
                values.insert(
                    opt.name().to_ascii_lowercase(),
                    (opt.name().to_string(), runtime_value(opt.name(), opt.value())),
                );
            }
        }
        Ok(Self {
            section: section.to_string(),
            values,
            used: BTreeSet::new(),
        })
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    pub fn error(&self, name: &str, message: impl Into<String>) -> AppError {
        AppError::option(&self.section, name, message)
    }

    /// Raw value, marking the option used. Empty values count as absent.
    fn raw(&mut self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        let (_, value) = self.values.get(&key)?;
        let value = value.trim().to_string();
        self.used.insert(key);
        (!value.is_empty()).then_some(value)
    }

    fn check(&self, name: &str, v: f64, bounds: Bounds) -> Result<(), AppError> {
        match bounds.violation(v) {
            Some(reason) => Err(self.error(name, reason)),
            None => Ok(()),
        }
    }

    pub fn get_opt_str(&mut self, name: &str) -> Option<String> {
        self.raw(name)
    }

    pub fn get_str(&mut self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&mut self, name: &str, default: i64, bounds: Bounds) -> Result<i64, AppError> {
        Ok(self.get_opt_int(name, bounds)?.unwrap_or(default))
    }

    pub fn get_opt_int(&mut self, name: &str, bounds: Bounds) -> Result<Option<i64>, AppError> {
        let Some(raw) = self.raw(name) else {
            return Ok(None);
        };
        let v: i64 = raw
            .parse()
            .map_err(|_| self.error(name, format!("expected an integer, got '{raw}'")))?;
        self.check(name, v as f64, bounds)?;
        Ok(Some(v))
    }

    pub fn get_float(&mut self, name: &str, default: f64, bounds: Bounds) -> Result<f64, AppError> {
        Ok(self.get_opt_float(name, bounds)?.unwrap_or(default))
    }

    pub fn get_opt_float(&mut self, name: &str, bounds: Bounds) -> Result<Option<f64>, AppError> {
        let Some(raw) = self.raw(name) else {
            return Ok(None);
        };
        let v: f64 = raw
            .parse()
            .map_err(|_| self.error(name, format!("expected a number, got '{raw}'")))?;
        if !v.is_finite() {
            return Err(self.error(name, format!("expected a finite number, got '{raw}'")));
        }
        self.check(name, v, bounds)?;
        Ok(Some(v))
    }

    /// A 0/1 flag.
    pub fn get_bool01(&mut self, name: &str, default: bool) -> Result<bool, AppError> {
        let v = self.get_int(name, i64::from(default), Bounds::range(0.0, 1.0))?;
        Ok(v == 1)
    }

    pub fn get_list(&mut self, name: &str, default: &[&str]) -> Vec<String> {
        match self.raw(name) {
            Some(raw) => split_list(&raw),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Comma list, `None` when absent.
    pub fn get_opt_list(&mut self, name: &str) -> Option<Vec<String>> {
        self.raw(name).map(|raw| split_list(&raw))
    }

    pub fn get_opt_int_list(&mut self, name: &str) -> Result<Option<Vec<i64>>, AppError> {
        let Some(items) = self.get_opt_list(name) else {
            return Ok(None);
        };
        items
            .iter()
            .map(|item| {
                item.parse::<i64>()
                    .map_err(|_| self.error(name, format!("expected integers, got '{item}'")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn get_opt_float_list(&mut self, name: &str) -> Result<Option<Vec<f64>>, AppError> {
        let Some(items) = self.get_opt_list(name) else {
            return Ok(None);
        };
        items
            .iter()
            .map(|item| {
                item.parse::<f64>()
                    .map_err(|_| self.error(name, format!("expected numbers, got '{item}'")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// A `[a, b]` literal list of integers, as the CAD gate overrides use.
    pub fn get_opt_literal_int_list(&mut self, name: &str) -> Result<Option<Vec<i64>>, AppError> {
        let Some(lit) = self.get_literal(name)? else {
            return Ok(None);
        };
        let items = lit
            .as_items()
            .ok_or_else(|| self.error(name, format!("expected a list, got {}", lit.kind())))?;
        items
            .iter()
            .map(|item| {
                item.as_int()
                    .ok_or_else(|| self.error(name, format!("expected integers, got {item}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn get_choice<C: Choice>(&mut self, name: &str, default: C) -> Result<C, AppError> {
        let Some(raw) = self.raw(name) else {
            return Ok(default);
        };
        C::from_name(&raw).ok_or_else(|| {
            self.error(
                name,
                format!("'{raw}' is not one of: {}", C::names().join(", ")),
            )
        })
    }

    /// Comma list where every item must be a valid choice.
    pub fn get_choice_list<C: Choice>(&mut self, name: &str, default: &[C]) -> Result<Vec<C>, AppError> {
        let Some(items) = self.get_opt_list(name) else {
            return Ok(default.to_vec());
        };
        items
            .iter()
            .map(|item| {
                C::from_name(item).ok_or_else(|| {
                    self.error(
                        name,
                        format!("'{item}' is not one of: {}", C::names().join(", ")),
                    )
                })
            })
            .collect()
    }

    pub fn get_literal(&mut self, name: &str) -> Result<Option<Literal>, AppError> {
        let Some(raw) = self.raw(name) else {
            return Ok(None);
        };
        Literal::parse(&raw)
            .map(Some)
            .map_err(|e| self.error(name, format!("unparsable value: {e}")))
    }

    /// Mark options as known without interpreting them.
    pub fn take_raw(&mut self, names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .filter_map(|name| self.raw(name).map(|v| (name.to_string(), v)))
            .collect()
    }

    /// Options present in the section that no getter asked for, as written.
    pub fn unused(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(key, _)| !self.used.contains(*key))
            .map(|(_, (name, _))| name.as_str())
            .collect()
    }
}
