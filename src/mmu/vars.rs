//! `mmu_vars.cfg`: Klipper `save_variables` storage and the calibration it holds.
//!
//! The file is one `[Variables]` section of `name = <python literal>` lines.
//! Klipper reads it without inline comment handling and lower-cases names, so
//! this parser does the same rather than going through [`crate::cfg::Document`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::cfg::Literal;
use crate::error::AppError;

use super::choices::EncoderMode;
use super::params::MmuParameters;

pub const VARIABLES_SECTION: &str = "Variables";

pub const VAR_BOWDEN_LENGTHS: &str = "mmu_calibration_bowden_lengths";
pub const VAR_BOWDEN_HOME: &str = "mmu_calibration_bowden_home";
pub const VAR_GEAR_ROTATION_DISTANCES: &str = "mmu_gear_rotation_distances";
pub const VAR_ENCODER_RESOLUTION: &str = "mmu_encoder_resolution";
pub const VAR_CLOG_LENGTH: &str = "mmu_calibration_clog_length";
pub const VAR_SELECTOR_OFFSETS: &str = "mmu_selector_offsets";
pub const VAR_SELECTOR_BYPASS: &str = "mmu_selector_bypass";
pub const VAR_REVISION: &str = "mmu__revision";

/// Persisted variables, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Variables {
    values: BTreeMap<String, Literal>,
}

impl Variables {
    /// Read a variables file. A missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let vars = Self::parse(&text)?;
                debug!(path = %path.display(), count = vars.len(), "variables loaded");
                Ok(vars)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no variables file, starting empty");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(text: &str) -> Result<Self, AppError> {
        let mut values = BTreeMap::new();
        let mut in_section = false;
        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                if name.trim() != VARIABLES_SECTION {
                    return Err(AppError::parse(
                        lineno,
                        format!("unexpected section [{name}], expected [{VARIABLES_SECTION}]"),
                    ));
                }
                in_section = true;
                continue;
            }
            if !in_section {
                return Err(AppError::parse(lineno, "variable outside [Variables] section"));
            }
            let (name, raw) = trimmed
                .split_once('=')
                .ok_or_else(|| AppError::parse(lineno, format!("expected 'name = value' in '{trimmed}'")))?;
            let name = name.trim().to_ascii_lowercase();
            let value = Literal::parse(raw.trim())
                .map_err(|e| AppError::parse(lineno, format!("variable '{name}': {e}")))?;
            values.insert(name, value);
        }
        Ok(Self { values })
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        fs::write(path, self.to_string())?;
        debug!(path = %path.display(), count = self.len(), "variables saved");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.values.get(&name.to_ascii_lowercase())
    }

    pub fn set(&mut self, name: &str, value: impl Into<Literal>) {
        self.values.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Literal> {
        self.values.remove(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Literal)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn float(&self, name: &str) -> Result<Option<f64>, AppError> {
        match self.get(name) {
            None | Some(Literal::None) => Ok(None),
            Some(lit) => lit
                .as_float()
                .map(Some)
                .ok_or_else(|| wrong_type(name, "a number", lit)),
        }
    }

    fn float_list(&self, name: &str) -> Result<Option<Vec<f64>>, AppError> {
        let Some(lit) = self.get(name) else {
            return Ok(None);
        };
        let items = lit.as_items().ok_or_else(|| wrong_type(name, "a list", lit))?;
        items
            .iter()
            .map(|item| item.as_float().ok_or_else(|| wrong_type(name, "a list of numbers", lit)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

fn wrong_type(name: &str, expected: &str, got: &Literal) -> AppError {
    AppError::Config(format!("variable '{name}' should be {expected}, got {got}"))
}

impl fmt::Display for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{VARIABLES_SECTION}]")?;
        for (name, value) in &self.values {
            writeln!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

/// Calibration results persisted by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Calibration {
    /// Per gate; negative entries are uncalibrated.
    pub bowden_lengths: Option<Vec<f64>>,
    pub bowden_home: Option<String>,
    pub gear_rotation_distances: Option<Vec<f64>>,
    pub encoder_resolution: Option<f64>,
    pub clog_length: Option<f64>,
    pub selector_offsets: Option<Vec<f64>>,
    pub selector_bypass: Option<f64>,
    pub revision: Option<i64>,
}

impl Calibration {
    pub fn from_variables(vars: &Variables) -> Result<Self, AppError> {
        let bowden_home = match vars.get(VAR_BOWDEN_HOME) {
            None | Some(Literal::None) => None,
            Some(lit) => Some(
                lit.as_str()
                    .ok_or_else(|| wrong_type(VAR_BOWDEN_HOME, "a string", lit))?
                    .to_string(),
            ),
        };
        let revision = match vars.get(VAR_REVISION) {
            None => None,
            Some(lit) => Some(lit.as_int().ok_or_else(|| wrong_type(VAR_REVISION, "an integer", lit))?),
        };
        Ok(Self {
            bowden_lengths: vars.float_list(VAR_BOWDEN_LENGTHS)?,
            bowden_home,
            gear_rotation_distances: vars.float_list(VAR_GEAR_ROTATION_DISTANCES)?,
            encoder_resolution: vars.float(VAR_ENCODER_RESOLUTION)?,
            clog_length: vars.float(VAR_CLOG_LENGTH)?,
            selector_offsets: vars.float_list(VAR_SELECTOR_OFFSETS)?,
            selector_bypass: vars.float(VAR_SELECTOR_BYPASS)?,
            revision,
        })
    }

    /// Calibrated bowden length for `gate`. Without per-gate lengths, or for
    /// a negative gate (bypass / unknown), gate 0's length is used.
    pub fn bowden_length(&self, gate: i64, variable_lengths: bool) -> Option<f64> {
        let lengths = self.bowden_lengths.as_ref()?;
        let idx = if variable_lengths && gate >= 0 {
            usize::try_from(gate).ok()?
        } else {
            0
        };
        lengths.get(idx).copied().filter(|len| *len >= 0.0)
    }

    /// Apply persisted values that override configured parameters. Returns
    /// the names of the parameters that changed.
    pub fn apply_to(&self, params: &mut MmuParameters) -> Vec<&'static str> {
        let mut applied = Vec::new();
        if params.flowguard.flowguard_encoder_mode == EncoderMode::Automatic {
            if let Some(clog) = self.clog_length.filter(|c| *c > 0.0) {
                debug!(
                    configured = params.flowguard.flowguard_encoder_max_motion,
                    calibrated = clog,
                    "using calibrated clog length"
                );
                params.flowguard.flowguard_encoder_max_motion = clog;
                applied.push("flowguard_encoder_max_motion");
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Document;

    const SAMPLE: &str = "[Variables]\n\
mmu__revision = 3\n\
mmu_calibration_bowden_home = 'encoder'\n\
mmu_calibration_bowden_lengths = [700.5, 702.0, -1]\n\
mmu_calibration_clog_length = 14.2\n\
mmu_encoder_resolution = 1.0\n\
mmu_gate_color = ['red', '#00ff00 ; x']\n";

    fn params(text: &str) -> MmuParameters {
        let doc = Document::parse(text).unwrap();
        MmuParameters::from_document(&doc, "mmu", false).unwrap()
    }

    #[test]
    fn parse_keeps_hash_inside_strings() {
        let vars = Variables::parse(SAMPLE).unwrap();
        assert_eq!(vars.len(), 6);
        let colors = vars.get("mmu_gate_color").unwrap().as_items().unwrap();
        assert_eq!(colors[1].as_str(), Some("#00ff00 ; x"));
    }

    #[test]
    fn names_are_lower_cased() {
        let vars = Variables::parse("[Variables]\nMMU_Thing = 1\n").unwrap();
        assert_eq!(vars.get("mmu_thing"), Some(&Literal::Int(1)));
    }

    #[test]
    fn rejects_other_sections_and_bad_values() {
        assert!(Variables::parse("[mmu]\na = 1\n").is_err());
        assert!(Variables::parse("a = 1\n").is_err());
        let err = Variables::parse("[Variables]\n\na = [1,\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn write_is_sorted_repr() {
        let mut vars = Variables::default();
        vars.set("mmu_selector_bypass", 182.5);
        vars.set("mmu__revision", 1i64);
        vars.set("mmu_calibration_bowden_home", "encoder");
        assert_eq!(
            vars.to_string(),
            "[Variables]\nmmu__revision = 1\nmmu_calibration_bowden_home = 'encoder'\nmmu_selector_bypass = 182.5\n"
        );
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mmu_vars.cfg");
        let vars = Variables::parse(SAMPLE).unwrap();
        vars.save(&path).unwrap();
        assert_eq!(Variables::load(&path).unwrap(), vars);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = Variables::load(&dir.path().join("absent.cfg")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn calibration_values() {
        let cal = Calibration::from_variables(&Variables::parse(SAMPLE).unwrap()).unwrap();
        assert_eq!(cal.revision, Some(3));
        assert_eq!(cal.bowden_home.as_deref(), Some("encoder"));
        assert_eq!(cal.encoder_resolution, Some(1.0));
        assert_eq!(cal.gear_rotation_distances, None);
    }

    #[test]
    fn calibration_type_errors_name_variable() {
        let vars = Variables::parse("[Variables]\nmmu_encoder_resolution = 'fast'\n").unwrap();
        let err = Calibration::from_variables(&vars).unwrap_err();
        assert!(err.to_string().contains("mmu_encoder_resolution"));
    }

    #[test]
    fn bowden_length_per_gate() {
        let cal = Calibration::from_variables(&Variables::parse(SAMPLE).unwrap()).unwrap();
        assert_eq!(cal.bowden_length(1, true), Some(702.0));
        assert_eq!(cal.bowden_length(1, false), Some(700.5));
        assert_eq!(cal.bowden_length(-2, true), Some(700.5));
        assert_eq!(cal.bowden_length(2, true), None);
        assert_eq!(cal.bowden_length(9, true), None);
        assert_eq!(Calibration::default().bowden_length(0, true), None);
    }

    #[test]
    fn clog_length_overrides_in_automatic_mode() {
        let cal = Calibration::from_variables(&Variables::parse(SAMPLE).unwrap()).unwrap();

        let mut p = params("[mmu]\nflowguard_encoder_mode: 2\nflowguard_encoder_max_motion: 20\n");
        assert_eq!(cal.apply_to(&mut p), vec!["flowguard_encoder_max_motion"]);
        assert_eq!(p.flowguard.flowguard_encoder_max_motion, 14.2);

        let mut p = params("[mmu]\nflowguard_encoder_mode: 1\nflowguard_encoder_max_motion: 20\n");
        assert!(cal.apply_to(&mut p).is_empty());
        assert_eq!(p.flowguard.flowguard_encoder_max_motion, 20.0);
    }
}
