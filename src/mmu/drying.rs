//! Filament drying presets (`drying_data`) and the heater settings that bound them.

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::cfg::Literal;
use crate::error::AppError;

/// Drying temperature (°C) and duration (minutes) for one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DryingPreset {
    pub temp: u32,
    pub minutes: u32,
}

impl DryingPreset {
    pub fn new(temp: u32, minutes: u32) -> Self {
        Self { temp, minutes }
    }
}

/// Heater limits and defaults used when a material has no preset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaterSettings {
    /// Never exceeded, whatever a preset says.
    pub max_temp: f64,
    pub default_dry_temp: f64,
    pub default_dry_time: f64,
    pub default_humidity: f64,
    pub vent_macro: String,
    pub vent_interval: f64,
    pub rotate_interval: f64,
}

impl HeaterSettings {
    /// Fallback preset for unknown materials.
    pub fn default_preset(&self) -> DryingPreset {
        DryingPreset {
            temp: self.default_dry_temp.round().max(0.0) as u32,
            minutes: self.default_dry_time.round().max(0.0) as u32,
        }
    }
}

/// One line of a drying plan: the preset clamped to the heater's limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DryingPlanEntry {
    pub material: String,
    pub temp: f64,
    pub minutes: u32,
    /// `false` when the material had no preset and defaults were used.
    pub known: bool,
}

/// Material presets keyed by lower-case material name, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DryingTable {
    presets: Vec<(String, DryingPreset)>,
}

impl DryingTable {
    /// Parse the `{ 'pla': (45, 300), ... }` literal.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let lit = Literal::parse(raw)
            .map_err(|e| AppError::Config(format!("unparsable drying_data: {e}")))?;
        Self::from_literal(&lit)
    }

    /// Keys are lower-cased; if two differ only by case the later one wins.
    pub fn from_literal(lit: &Literal) -> Result<Self, AppError> {
        let pairs = lit.as_dict().ok_or_else(|| {
            AppError::Config(format!("drying_data must be a dict, got {}", lit.kind()))
        })?;

        let mut table = DryingTable::default();
        for (key, value) in pairs {
            let name = key.as_str().ok_or_else(|| {
                AppError::Config(format!("drying_data keys must be strings, got {key}"))
            })?;
            let preset = preset_from_literal(name, value)?;
            table.insert(name, preset);
        }
        Ok(table)
    }

    fn insert(&mut self, name: &str, preset: DryingPreset) {
        let key = name.trim().to_lowercase();
        match self.presets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                warn!(material = %key, "duplicate drying_data entry, last one wins");
                *existing = preset;
            }
            None => self.presets.push((key, preset)),
        }
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DryingPreset)> {
        self.presets.iter().map(|(k, p)| (k.as_str(), *p))
    }

    /// Case-insensitive lookup.
    pub fn lookup(&self, material: &str) -> Option<DryingPreset> {
        let key = material.trim().to_lowercase();
        self.presets.iter().find(|(k, _)| *k == key).map(|(_, p)| *p)
    }

    pub fn preset_or_default(&self, material: &str, defaults: DryingPreset) -> DryingPreset {
        self.lookup(material).unwrap_or(defaults)
    }

    /// Settings that suit every material at once: the lowest temperature and
    /// the longest time. `defaults` when `materials` is empty.
    pub fn max_drying(&self, materials: &[&str], defaults: DryingPreset) -> DryingPreset {
        let mut presets = materials.iter().map(|m| self.preset_or_default(m, defaults));
        let Some(first) = presets.next() else {
            return defaults;
        };
        presets.fold(first, |acc, p| DryingPreset {
            temp: acc.temp.min(p.temp),
            minutes: acc.minutes.max(p.minutes),
        })
    }

    /// Per-material plan, temperatures clamped to `heater.max_temp`.
    pub fn plan(&self, materials: &[&str], heater: &HeaterSettings) -> Vec<DryingPlanEntry> {
        let defaults = heater.default_preset();
        materials
            .iter()
            .map(|m| {
                let found = self.lookup(m);
                let preset = found.unwrap_or(defaults);
                DryingPlanEntry {
                    material: m.to_string(),
                    temp: heater.max_temp.min(f64::from(preset.temp)),
                    minutes: preset.minutes,
                    known: found.is_some(),
                }
            })
            .collect()
    }

    /// Re-serialise in the template's `{ 'pla': (45, 300), ... }` form.
    pub fn to_literal_string(&self) -> String {
        if self.presets.is_empty() {
            return "{}".to_string();
        }
        let body: Vec<String> = self
            .presets
            .iter()
            .map(|(k, p)| format!("{}: ({}, {})", Literal::Str(k.clone()), p.temp, p.minutes))
            .collect();
        format!("{{ {} }}", body.join(", "))
    }
}

impl Serialize for DryingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.presets.iter().map(|(k, p)| (k, p)))
    }
}

/// Human-readable table, one material per line, sorted by name.
impl fmt::Display for DryingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rows: Vec<_> = self.presets.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (material, preset) in rows {
            writeln!(
                f,
                "{}: {}°C for {}",
                material.to_uppercase(),
                preset.temp,
                format_minutes(preset.minutes)
            )?;
        }
        Ok(())
    }
}

/// `90` → `"1 hour 30 minutes"`.
pub fn format_minutes(minutes: u32) -> String {
    let (hours, mins) = (minutes / 60, minutes % 60);
    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours} hour{}", if hours == 1 { "" } else { "s" }));
    }
    if mins > 0 {
        parts.push(format!("{mins} minute{}", if mins == 1 { "" } else { "s" }));
    }
    if parts.is_empty() {
        parts.push("<1 minute".to_string());
    }
    parts.join(" ")
}

fn preset_from_literal(name: &str, value: &Literal) -> Result<DryingPreset, AppError> {
    let items = value
        .as_items()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| {
            AppError::Config(format!(
                "drying_data entry '{name}' must be (temperature, minutes), got {value}"
            ))
        })?;
    let temp = whole_number(name, "temperature", &items[0])?;
    let minutes = whole_number(name, "minutes", &items[1])?;
    Ok(DryingPreset { temp, minutes })
}

/// Integers, or floats with no fractional part, in `u32` range.
fn whole_number(name: &str, what: &str, lit: &Literal) -> Result<u32, AppError> {
    let bad = || {
        AppError::Config(format!(
            "drying_data entry '{name}': {what} must be a whole non-negative number, got {lit}"
        ))
    };
    match lit {
        Literal::Int(i) => u32::try_from(*i).map_err(|_| bad()),
        Literal::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX) => {
            Ok(*f as u32)
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE_DATA: &str = "{ 'pla': (45, 300), 'pla+': (55, 300), 'petg': (60, 300), 'tpu': (55, 300), 'abs': (70, 300), 'abs+': (75, 300), 'asa': (65, 300), 'nylon': (75, 600), 'pc': (75, 600), 'pva': (75, 600), 'hips': (75, 600) }";

    fn heater() -> HeaterSettings {
        HeaterSettings {
            max_temp: 70.0,
            default_dry_temp: 45.0,
            default_dry_time: 300.0,
            default_humidity: 25.0,
            vent_macro: "_MMU_VENT".into(),
            vent_interval: 0.0,
            rotate_interval: 5.0,
        }
    }

    #[test]
    fn template_table_parses() {
        let table = DryingTable::parse(TEMPLATE_DATA).unwrap();
        assert_eq!(table.len(), 11);
        assert_eq!(table.lookup("pla"), Some(DryingPreset::new(45, 300)));
        assert_eq!(table.lookup("abs+"), Some(DryingPreset::new(75, 300)));
        assert!(table.iter().all(|(k, _)| k == k.to_lowercase()));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = DryingTable::parse(TEMPLATE_DATA).unwrap();
        assert_eq!(table.lookup("PETG"), Some(DryingPreset::new(60, 300)));
        assert_eq!(table.lookup(" Nylon "), Some(DryingPreset::new(75, 600)));
        assert_eq!(table.lookup("wood"), None);
    }

    #[test]
    fn case_collision_last_wins() {
        let table = DryingTable::parse("{'PLA': (40, 100), 'pla': (50, 200)}").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("pla"), Some(DryingPreset::new(50, 200)));
    }

    #[test]
    fn whole_floats_accepted_fractions_rejected() {
        let table = DryingTable::parse("{'pla': (45.0, 300)}").unwrap();
        assert_eq!(table.lookup("pla"), Some(DryingPreset::new(45, 300)));
        assert!(DryingTable::parse("{'pla': (45.5, 300)}").is_err());
        assert!(DryingTable::parse("{'pla': (-5, 300)}").is_err());
    }

    #[test]
    fn malformed_tables_rejected() {
        assert!(DryingTable::parse("[1, 2]").is_err());
        assert!(DryingTable::parse("{'pla': (45,)}").is_err());
        assert!(DryingTable::parse("{'pla': 45}").is_err());
        assert!(DryingTable::parse("{1: (45, 300)}").is_err());
        assert!(DryingTable::parse("{'pla': (45, 300)").is_err());
    }

    #[test]
    fn max_drying_takes_lowest_temp_longest_time() {
        let table = DryingTable::parse(TEMPLATE_DATA).unwrap();
        let defaults = heater().default_preset();
        assert_eq!(
            table.max_drying(&["abs", "pla", "nylon"], defaults),
            DryingPreset::new(45, 600)
        );
        assert_eq!(table.max_drying(&[], defaults), defaults);
        assert_eq!(
            table.max_drying(&["unobtainium", "pc"], defaults),
            DryingPreset::new(45, 600)
        );
    }

    #[test]
    fn plan_clamps_to_heater_max() {
        let table = DryingTable::parse(TEMPLATE_DATA).unwrap();
        let plan = table.plan(&["abs+", "pla", "mystery"], &heater());
        assert_eq!(plan[0].temp, 70.0);
        assert_eq!(plan[0].minutes, 300);
        assert_eq!(plan[1].temp, 45.0);
        assert!(!plan[2].known);
        assert_eq!(plan[2].minutes, 300);
    }

    #[test]
    fn literal_string_reparses_to_same_table() {
        let table = DryingTable::parse(TEMPLATE_DATA).unwrap();
        let text = table.to_literal_string();
        assert!(text.starts_with("{ 'pla': (45, 300), 'pla+': (55, 300)"));
        assert_eq!(DryingTable::parse(&text).unwrap(), table);
    }

    #[test]
    fn display_sorted_upper_case() {
        let table = DryingTable::parse("{'pla': (45, 90), 'abs': (70, 60)}").unwrap();
        assert_eq!(
            table.to_string(),
            "ABS: 70°C for 1 hour\nPLA: 45°C for 1 hour 30 minutes\n"
        );
    }

    #[test]
    fn minutes_formatting() {
        assert_eq!(format_minutes(0), "<1 minute");
        assert_eq!(format_minutes(1), "1 minute");
        assert_eq!(format_minutes(600), "10 hours");
    }
}
