//! Checks against the shipped `config/base/mmu_parameters.cfg` template.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use mmu_params::cfg::{Document, Literal, Value};
use mmu_params::mmu::{DryingPreset, MmuParameters, VersionStamp};
use mmu_params::mmu::choices::{EncoderMode, ExtruderEndstop, GateEndstop};

fn template_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config/base/mmu_parameters.cfg")
}

fn template_text() -> String {
    fs::read_to_string(template_path()).expect("template file missing")
}

fn template() -> Document {
    Document::parse(&template_text()).expect("template should parse")
}

#[test]
fn test_template_round_trips_byte_for_byte() {
    let text = template_text();
    assert_eq!(template().to_string(), text);
}

#[test]
fn test_template_canonical_form_reparses_to_same_options() {
    let doc = template();
    let reparsed = Document::parse(&doc.to_canonical_string()).unwrap();
    assert_eq!(reparsed.entries(), doc.entries());
}

#[test]
fn test_option_lines_split_on_first_colon() {
    let doc = template();
    let mut section = String::new();
    let mut checked = 0;
    for line in template_text().lines() {
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with(char::is_whitespace) {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.to_string();
            continue;
        }
        let (key, _) = line.split_once(':').expect("option line without ':'");
        assert!(doc.has_option(&section, key.trim()), "[{section}] {key} not parsed");
        checked += 1;
    }
    assert!(checked > 100, "only {checked} option lines found");
}

#[test]
fn test_template_keys_are_unique() {
    let doc = template();
    assert!(doc.duplicates().is_empty(), "{:?}", doc.duplicates());
    doc.check_unique().unwrap();
    let names: BTreeSet<&str> = doc.options("mmu").into_iter().collect();
    assert_eq!(names.len(), doc.options("mmu").len());
}

#[test]
fn test_gear_max_velocity_is_integer() {
    let doc = template();
    let raw = doc.get("mmu", "gear_max_velocity").unwrap();
    assert!(matches!(Value::infer(raw), Value::Int(300)));
}

#[test]
fn test_drying_data_literal() {
    let doc = template();
    let raw = doc.get("mmu", "drying_data").unwrap();
    let lit = Literal::parse(raw).unwrap();
    let entries = lit.as_dict().expect("drying_data should be a dict");
    assert!(!entries.is_empty());
    for (key, value) in entries {
        let key = key.as_str().expect("drying_data keys are strings");
        assert_eq!(key, key.to_lowercase(), "key '{key}' is not lower-case");
        let pair = value.as_items().expect("drying_data values are tuples");
        assert_eq!(pair.len(), 2);
        assert!(pair.iter().all(|v| v.as_float().is_some()));
    }
    assert_eq!(
        entries.first().map(|(k, v)| (k.clone(), v.clone())),
        Some((
            Literal::Str("pla".into()),
            Literal::Tuple(vec![Literal::Int(45), Literal::Int(300)])
        ))
    );
}

#[test]
fn test_only_placeholder_is_version() {
    assert_eq!(template().placeholders(), vec!["happy_hare_version"]);
}

#[test]
fn test_strict_load_of_template() {
    let doc = template();
    let params = MmuParameters::from_document(&doc, "mmu", true).unwrap();

    assert_eq!(params.version, VersionStamp::Unrendered("happy_hare_version".into()));
    assert_eq!(params.hardware.gear_max_velocity, 300.0);
    assert_eq!(params.logging.log_level, 1);
    assert_eq!(params.speeds.gear_from_spool_speed, 80.0);
    assert_eq!(params.gate.gate_homing_endstop, GateEndstop::Encoder);
    assert_eq!(params.extruder.extruder_homing_endstop, ExtruderEndstop::Collision);
    assert_eq!(params.heater.max_temp, 70.0);
    assert_eq!(params.flowguard.flowguard_encoder_mode, EncoderMode::Automatic);
    assert!(!params.workflow.gcode_load_sequence);
    assert_eq!(params.drying_data.lookup("PLA"), Some(DryingPreset::new(45, 300)));
    assert_eq!(params.drying_data.lookup("nylon"), Some(DryingPreset::new(75, 600)));
    assert_eq!(params.gate_map.num_gates(), None);
}

#[test]
fn test_parameters_serialise_to_json() {
    let doc = template();
    let params = MmuParameters::from_document(&doc, "mmu", true).unwrap();
    let json = serde_json::to_value(&params).unwrap();
    assert_eq!(json["hardware"]["gear_max_velocity"], 300.0);
    assert_eq!(json["drying_data"]["pla"]["temp"], 45);
    assert_eq!(json["version"]["kind"], "unrendered");
}
