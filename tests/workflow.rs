//! Config build workflow against the shipped template: upgrade an old user
//! config, carry its settings into the template, and overlay calibration.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mmu_params::cfg::{Document, EXCLUSION_MARKER, Literal};
use mmu_params::mmu::{self, Calibration, HhVersion, MmuParameters, Variables, VersionStamp};

fn template_text() -> String {
    let path: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/base/mmu_parameters.cfg");
    fs::read_to_string(path).expect("template file missing")
}

const OLD_CONFIG: &str = "\
[mmu]
happy_hare_version: 2.73
gear_max_velocity: 250          # tuned
log_level: 3
mmu_num_gates: 8
auto_calibrate_gates: 1
endless_spool_final_eject: 40
z_hop_height_error: 5
gate_material: PLA, PLA, ABS, ABS, PETG, PETG, TPU, PLA
error_macro: MY_ERROR
gcode_load_sequence: 1
drying_data: { 'pla': (50, 240), 'asa': (65, 300) }

# EXCLUDE FROM CONFIG BUILDER
[gcode_macro MY_MACRO]
gcode:
    RESPOND MSG=hi
";

#[test]
fn test_build_from_old_config() {
    let target = HhVersion::new(3, 20);
    let out = mmu::build(&template_text(), Some(OLD_CONFIG), target, "mmu").unwrap();

    assert_eq!(out.existing_version, Some(VersionStamp::Version(HhVersion::new(2, 73))));
    assert_eq!(
        out.upgraded,
        vec![HhVersion::new(3, 0), HhVersion::new(3, 10), HhVersion::new(3, 20)]
    );
    assert!(out.unresolved.is_empty());

    let doc = &out.document;
    assert_eq!(doc.get("mmu", "happy_hare_version"), Some("3.20"));
    assert_eq!(doc.get("mmu", "gear_max_velocity"), Some("250"));
    assert_eq!(doc.get("mmu", "log_level"), Some("3"));
    assert_eq!(doc.get("mmu", "autotune_rotation_distance"), Some("1"));
    assert_eq!(doc.get("mmu", "gate_final_eject_distance"), Some("40"));
    assert_eq!(doc.get("mmu", "gcode_load_sequence"), Some("0"));
    assert_eq!(doc.get("mmu", "drying_data"), Some("{ 'pla': (50, 240), 'asa': (65, 300) }"));
    assert_eq!(doc.get("mmu", "gate_material"), Some("PLA, PLA, ABS, ABS, PETG, PETG, TPU, PLA"));
    assert_eq!(doc.get("mmu", "error_macro"), Some("MY_ERROR"));

    // Template comments survive the carry-over.
    assert!(doc.to_string().contains("gear_max_velocity: 250\t\t\t# Never to be exceeded"));

    let report = out.report.unwrap();
    // The template has no excluded block to replace.
    assert!(!report.excluded_preserved);
    assert!(report.reinserted.contains(&"gate_material".to_string()));
    assert!(report.dropped.contains(&("mmu".to_string(), "z_hop_height_error".to_string())));
    assert!(report.dropped.contains(&("mmu_machine".to_string(), "num_gates".to_string())));

    // The user's excluded macro has nowhere to go.
    assert!(report.dropped.contains(&("gcode_macro MY_MACRO".to_string(), "gcode".to_string())));
    assert!(!report.is_lossless());
    let text = doc.to_string();
    assert!(!text.contains(EXCLUSION_MARKER));

    // The result loads and re-parses identically.
    let reparsed = Document::parse(&text).unwrap();
    assert_eq!(reparsed.to_string(), text);
    let params = MmuParameters::from_document(&reparsed, "mmu", true).unwrap();
    assert_eq!(params.version, VersionStamp::Version(target));
    assert_eq!(params.hardware.gear_max_velocity, 250.0);
    assert_eq!(params.drying_data.len(), 2);
    assert_eq!(params.gate_map.num_gates(), Some(8));
    assert_eq!(params.hidden.get("error_macro").map(String::as_str), Some("MY_ERROR"));
}

#[test]
fn test_excluded_block_swapped_when_template_has_one() {
    let template = format!("{}\n{EXCLUSION_MARKER}\n[gcode_macro TEMPLATE_ONLY]\ngcode:\n    M117\n", template_text());
    let out = mmu::build(&template, Some(OLD_CONFIG), HhVersion::new(3, 20), "mmu").unwrap();
    assert!(out.report.unwrap().excluded_preserved);
    assert!(out.document.has_section("gcode_macro MY_MACRO"));
    assert!(!out.document.has_section("gcode_macro TEMPLATE_ONLY"));
}

#[test]
fn test_build_rejects_unsupported_version() {
    let old = "[mmu]\nhappy_hare_version: 2.5\n";
    let err = mmu::build(&template_text(), Some(old), HhVersion::new(3, 20), "mmu").unwrap_err();
    assert!(err.to_string().contains("2.70"), "{err}");
}

#[test]
fn test_variables_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mmu_vars.cfg");

    let mut vars = Variables::default();
    vars.set("mmu_calibration_clog_length", Literal::Float(14.5));
    vars.set(
        "mmu_calibration_bowden_lengths",
        Literal::List(vec![Literal::Float(700.5), Literal::Int(702), Literal::Int(-1)]),
    );
    vars.set("mmu_calibration_bowden_home", Literal::Str("encoder".into()));
    vars.save(&path).unwrap();

    let loaded = Variables::load(&path).unwrap();
    assert_eq!(loaded, vars);

    let cal = Calibration::from_variables(&loaded).unwrap();
    assert_eq!(cal.clog_length, Some(14.5));
    assert_eq!(cal.bowden_length(1, true), Some(702.0));
    assert_eq!(cal.bowden_length(2, true), None);
    assert_eq!(cal.bowden_length(2, false), Some(700.5));
    assert_eq!(cal.bowden_home.as_deref(), Some("encoder"));
}

#[test]
fn test_missing_variables_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let vars = Variables::load(&dir.path().join("absent.cfg")).unwrap();
    assert!(vars.is_empty());
}

#[test]
fn test_calibrated_clog_length_overrides_template() {
    let doc = Document::parse(&template_text()).unwrap();
    let mut params = MmuParameters::from_document(&doc, "mmu", true).unwrap();
    assert_eq!(params.flowguard.flowguard_encoder_max_motion, 20.0);

    let vars = Variables::parse("[Variables]\nmmu_calibration_clog_length = 12.5\n").unwrap();
    let applied = Calibration::from_variables(&vars).unwrap().apply_to(&mut params);
    assert_eq!(applied, vec!["flowguard_encoder_max_motion"]);
    assert_eq!(params.flowguard.flowguard_encoder_max_motion, 12.5);
}
