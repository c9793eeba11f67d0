//! Config upgrades between Happy Hare releases.
//!
//! Each step rewrites a combined document (parameters, hardware and macro
//! variable sections) from one release to the next. [`upgrade`] chains them
//! and stamps `happy_hare_version` after every step, so an interrupted run
//! can resume from where it stopped.

use tracing::{info, warn};

use crate::cfg::{Document, Literal};
use crate::error::AppError;

use super::version::{HhVersion, VERSION_OPTION, VERSION_SECTION};

#[derive(Debug, Clone, Copy)]
pub struct UpgradeStep {
    pub from: HhVersion,
    pub to: HhVersion,
    apply: fn(&mut Document) -> Result<(), AppError>,
}

impl UpgradeStep {
    pub fn apply(&self, doc: &mut Document) -> Result<(), AppError> {
        (self.apply)(doc)
    }
}

static STEPS: &[UpgradeStep] = &[
    UpgradeStep {
        from: HhVersion::new(2, 70),
        to: HhVersion::new(2, 71),
        apply: upgrade_2_70_to_2_71,
    },
    UpgradeStep {
        from: HhVersion::new(2, 71),
        to: HhVersion::new(2, 72),
        apply: upgrade_2_71_to_2_72,
    },
    UpgradeStep {
        from: HhVersion::new(2, 72),
        to: HhVersion::new(2, 73),
        apply: upgrade_2_72_to_2_73,
    },
    UpgradeStep {
        from: HhVersion::new(2, 73),
        to: HhVersion::new(3, 0),
        apply: upgrade_2_73_to_3_00,
    },
    UpgradeStep {
        from: HhVersion::new(3, 0),
        to: HhVersion::new(3, 10),
        apply: upgrade_3_00_to_3_10,
    },
    UpgradeStep {
        from: HhVersion::new(3, 10),
        to: HhVersion::new(3, 20),
        apply: upgrade_3_10_to_3_20,
    },
];

/// All known steps, oldest first.
pub fn steps() -> &'static [UpgradeStep] {
    STEPS
}

/// The steps that take `from` to `to`.
pub fn plan(from: HhVersion, to: HhVersion) -> Result<Vec<&'static UpgradeStep>, AppError> {
    if from >= to {
        return Ok(Vec::new());
    }
    if let Some(first) = STEPS.first() {
        if from < first.from {
            return Err(AppError::Upgrade(format!(
                "upgrade path from {from} to {to} is not supported, try upgrading to {} first",
                first.from
            )));
        }
    }
    Ok(STEPS
        .iter()
        .filter(|step| step.to > from && step.to <= to)
        .collect())
}

/// Apply every step between `from` and `to`. Returns the versions reached.
pub fn upgrade(doc: &mut Document, from: HhVersion, to: HhVersion) -> Result<Vec<HhVersion>, AppError> {
    if from > to {
        warn!(%from, %to, "config is newer than target, not downgrading");
        return Ok(Vec::new());
    }
    let mut reached = Vec::new();
    let mut current = from;
    for step in plan(from, to)? {
        info!(from = %current, to = %step.to, "upgrading config");
        step.apply(doc)?;
        doc.set(VERSION_SECTION, VERSION_OPTION, &step.to.to_string())?;
        current = step.to;
        reached.push(step.to);
    }
    Ok(reached)
}

/// Float text with a fractional part, as the macro variables store it.
fn float_text(v: f64) -> String {
    Literal::Float(v).to_string()
}

fn require_float(doc: &Document, section: &str, option: &str) -> Result<f64, AppError> {
    doc.get_float(section, option)?
        .ok_or_else(|| AppError::Upgrade(format!("[{section}] {option} is required to upgrade")))
}

fn upgrade_2_70_to_2_71(doc: &mut Document) -> Result<(), AppError> {
    let section = "gcode_macro _MMU_CUT_TIP_VARS";
    doc.rename_option(section, "variable_pin_park_x_dist", "variable_pin_park_dist");
    doc.rename_option(section, "variable_pin_loc_x_compressed", "variable_pin_loc_compressed");

    let section = "gcode_macro _MMU_SEQUENCE_VARS";
    doc.rename_option(section, "variable_lift_speed", "variable_park_lift_speed");

    if let Some(xy) = doc.get(section, "variable_park_xy").map(str::to_string) {
        let z_hop_toolchange = doc.get("mmu", "z_hop_height_toolchange").unwrap_or("1").to_string();
        let z_hop_error = doc.get("mmu", "z_hop_height_error").unwrap_or("5").to_string();
        doc.set(section, "variable_park_toolchange", &format!("{xy}, {z_hop_toolchange}, 0, 2"))?;
        doc.set(section, "variable_park_pause", &format!("{xy}, {z_hop_error}, 0, 2"))?;
        doc.remove_option(section, "variable_park_xy");
        doc.remove_option("mmu", "z_hop_height_toolchange");
        doc.remove_option("mmu", "z_hop_height_error");
    }

    if doc.has_option(section, "variable_enable_park") {
        let printing = if doc.get_bool(section, "variable_enable_park").unwrap_or(false) {
            "'toolchange,load,unload,pause,cancel'"
        } else if doc.get_bool(section, "variable_enable_park_runout").unwrap_or(false) {
            "'toolchange,load,unload,runout,pause,cancel'"
        } else {
            "'pause,cancel'"
        };
        doc.set(section, "variable_enable_park_printing", printing)?;
        doc.remove_option(section, "variable_enable_park");
        doc.remove_option(section, "variable_enable_park_runout");
    }

    if let Some(standalone) = doc.get_bool(section, "variable_enable_park_standalone") {
        let value = if standalone {
            "'toolchange,load,unload,pause,cancel'"
        } else {
            "'pause,cancel'"
        };
        doc.set(section, "variable_enable_park_standalone", value)?;
    }
    Ok(())
}

fn upgrade_2_71_to_2_72(doc: &mut Document) -> Result<(), AppError> {
    let residual = doc.get("mmu", "toolhead_residual_filament");
    let ooze = doc.get("mmu", "toolhead_ooze_reduction");
    if let (Some("0"), Some(ooze)) = (residual, ooze) {
        if ooze != "0" {
            let ooze = ooze.to_string();
            doc.set("mmu", "toolhead_residual_filament", &ooze)?;
            doc.set("mmu", "toolhead_ooze_reduction", "0")?;
        }
    }
    Ok(())
}

fn upgrade_2_72_to_2_73(doc: &mut Document) -> Result<(), AppError> {
    let section = "gcode_macro BLOBIFIER";
    if !doc.has_option(section, "variable_iteration_z_raise") {
        return Ok(());
    }
    let per_blob = doc
        .get_int(section, "variable_max_iterations_per_blob")?
        .ok_or_else(|| AppError::Upgrade(format!("[{section}] variable_max_iterations_per_blob is required to upgrade")))?
        as f64;
    let z_raise = require_float(doc, section, "variable_iteration_z_raise")?;
    let z_change = require_float(doc, section, "variable_iteration_z_change")?;
    let max_length = require_float(doc, section, "variable_max_iteration_length")?;

    let total_raise = z_raise * per_blob - (per_blob * (per_blob - 1.0) / 2.0) * z_change;
    doc.set(section, "variable_z_raise", &float_text(total_raise))?;
    doc.set(section, "variable_purge_length_maximum", &float_text(max_length * per_blob))?;
    for option in [
        "variable_max_iterations_per_blob",
        "variable_iteration_z_raise",
        "variable_iteration_z_change",
        "variable_max_iteration_length",
    ] {
        doc.remove_option(section, option);
    }
    Ok(())
}

fn upgrade_2_73_to_3_00(doc: &mut Document) -> Result<(), AppError> {
    if doc.rename_section("mmu_servo mmu_servo", "mmu_servo selector_servo")
        && doc.get("mmu_servo selector_servo", "pin") == Some("mmu:MMU_SERVO")
    {
        // Pin alias was renamed; let the new template default apply.
        doc.remove_option("mmu_servo selector_servo", "pin");
    }

    doc.add_section("mmu_machine");
    doc.move_option("mmu", "mmu_num_gates", "mmu_machine", Some("num_gates"))?;
    doc.move_option("mmu", "mmu_vendor", "mmu_machine", None)?;
    doc.move_option("mmu", "mmu_version", "mmu_machine", None)?;

    doc.rename_option("mmu", "auto_calibrate_gates", "autotune_rotation_distance");
    doc.rename_option("mmu", "auto_calibrate_bowden", "autotune_bowden_length");
    doc.rename_option("mmu", "endless_spool_final_eject", "gate_final_eject_distance");
    doc.rename_option("gcode_macro _MMU_SOFTWARE_VARS", "variable_eject_tool", "variable_unload_tool");
    doc.rename_option(
        "gcode_macro _MMU_CLIENT_VARS",
        "variable_eject_tool_on_cancel",
        "variable_unload_tool_on_cancel",
    );
    Ok(())
}

fn upgrade_3_00_to_3_10(doc: &mut Document) -> Result<(), AppError> {
    if doc.has_option("mmu", "homing_extruder") {
        doc.add_section("mmu_machine");
        doc.move_option("mmu", "homing_extruder", "mmu_machine", None)?;
    }
    Ok(())
}

/// DC espooler motors are numbered from 0 instead of 1.
fn upgrade_3_10_to_3_20(doc: &mut Document) -> Result<(), AppError> {
    for i in 0..12 {
        let section = format!("output_pin _mmu_dc_espooler_rwd_{i}");
        if doc.get(&section, "pin") == Some(format!("mmu:MMU_DC_MOT_{}_A", i + 1).as_str()) {
            doc.remove_option(&section, "pin");
        }
        let section = format!("output_pin _mmu_dc_espooler_en_{i}");
        if doc.get(&section, "pin") == Some(format!("mmu:MMU_DC_MOT_{}_EN", i + 1).as_str()) {
            doc.remove_option(&section, "pin");
        }
    }

    let Some(aliases) = doc.get("board_pins mmu", "aliases").filter(|a| !a.is_empty()) else {
        return Ok(());
    };
    let mut renumbered = aliases.to_string();
    for i in 0..12 {
        for suffix in ["A", "B", "EN"] {
            renumbered = renumbered.replace(
                &format!("MMU_DC_MOT_{}_{suffix}", i + 1),
                &format!("MMU_DC_MOT_{i}_{suffix}"),
            );
        }
    }
    if renumbered != aliases {
        doc.set("board_pins mmu", "aliases", &renumbered)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> HhVersion {
        s.parse().unwrap()
    }

    #[test]
    fn steps_are_contiguous() {
        for pair in steps().windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
    }

    #[test]
    fn plan_covers_range() {
        let plan = plan(v("2.72"), v("3.10")).unwrap();
        let targets: Vec<String> = plan.iter().map(|s| s.to.to_string()).collect();
        assert_eq!(targets, vec!["2.73", "3.00", "3.10"]);
        assert!(super::plan(v("3.20"), v("3.20")).unwrap().is_empty());
    }

    #[test]
    fn too_old_names_first_supported_version() {
        let err = plan(v("2.5"), v("3.20")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2.50"), "{msg}");
        assert!(msg.contains("try upgrading to 2.70 first"), "{msg}");
    }

    #[test]
    fn stamps_version_after_each_step() {
        let mut doc = Document::parse("[mmu]\nhappy_hare_version: 3.00\nhoming_extruder: 1\n").unwrap();
        let reached = upgrade(&mut doc, v("3.00"), v("3.20")).unwrap();
        assert_eq!(reached, vec![v("3.10"), v("3.20")]);
        assert_eq!(doc.get("mmu", "happy_hare_version"), Some("3.20"));
        assert!(!doc.has_option("mmu", "homing_extruder"));
        assert_eq!(doc.get("mmu_machine", "homing_extruder"), Some("1"));
    }

    #[test]
    fn downgrade_is_a_no_op() {
        let mut doc = Document::parse("[mmu]\nhappy_hare_version: 3.20\n").unwrap();
        assert!(upgrade(&mut doc, v("3.20"), v("3.10")).unwrap().is_empty());
        assert_eq!(doc.get("mmu", "happy_hare_version"), Some("3.20"));
    }

    #[test]
    fn park_settings_rewrite() {
        let mut doc = Document::parse(
            "[mmu]\nz_hop_height_toolchange: 2\n\n\
             [gcode_macro _MMU_SEQUENCE_VARS]\nvariable_park_xy: 50, 50\nvariable_lift_speed: 10\n\
             variable_enable_park: False\nvariable_enable_park_runout: True\nvariable_enable_park_standalone: 1\n",
        )
        .unwrap();
        upgrade_2_70_to_2_71(&mut doc).unwrap();
        let s = "gcode_macro _MMU_SEQUENCE_VARS";
        assert_eq!(doc.get(s, "variable_park_toolchange"), Some("50, 50, 2, 0, 2"));
        assert_eq!(doc.get(s, "variable_park_pause"), Some("50, 50, 5, 0, 2"));
        assert_eq!(doc.get(s, "variable_park_lift_speed"), Some("10"));
        assert_eq!(
            doc.get(s, "variable_enable_park_printing"),
            Some("'toolchange,load,unload,runout,pause,cancel'")
        );
        assert_eq!(
            doc.get(s, "variable_enable_park_standalone"),
            Some("'toolchange,load,unload,pause,cancel'")
        );
        assert!(!doc.has_option(s, "variable_park_xy"));
        assert!(!doc.has_option(s, "variable_enable_park"));
        assert!(!doc.has_option("mmu", "z_hop_height_toolchange"));
    }

    #[test]
    fn residual_filament_takes_ooze_value() {
        let mut doc =
            Document::parse("[mmu]\ntoolhead_residual_filament: 0\ntoolhead_ooze_reduction: 3  # mm\n").unwrap();
        upgrade_2_71_to_2_72(&mut doc).unwrap();
        assert_eq!(doc.get("mmu", "toolhead_residual_filament"), Some("3"));
        assert_eq!(doc.get("mmu", "toolhead_ooze_reduction"), Some("0"));
        assert!(doc.to_string().contains("toolhead_ooze_reduction: 0  # mm"));
    }

    #[test]
    fn blobifier_rewrite() {
        let mut doc = Document::parse(
            "[gcode_macro BLOBIFIER]\nvariable_max_iterations_per_blob: 3\nvariable_iteration_z_raise: 1.0\n\
             variable_iteration_z_change: 0.5\nvariable_max_iteration_length: 50\n",
        )
        .unwrap();
        upgrade_2_72_to_2_73(&mut doc).unwrap();
        let s = "gcode_macro BLOBIFIER";
        assert_eq!(doc.get(s, "variable_z_raise"), Some("1.5"));
        assert_eq!(doc.get(s, "variable_purge_length_maximum"), Some("150.0"));
        assert_eq!(doc.options(s), vec!["variable_z_raise", "variable_purge_length_maximum"]);
    }

    #[test]
    fn servo_and_machine_moves() {
        let mut doc = Document::parse(
            "[mmu]\nmmu_num_gates: 9\nmmu_vendor: ERCF\nauto_calibrate_gates: 1\n\n\
             [mmu_servo mmu_servo]\npin: mmu:MMU_SERVO\n",
        )
        .unwrap();
        upgrade_2_73_to_3_00(&mut doc).unwrap();
        assert!(doc.has_section("mmu_servo selector_servo"));
        assert!(!doc.has_option("mmu_servo selector_servo", "pin"));
        assert_eq!(doc.get("mmu_machine", "num_gates"), Some("9"));
        assert_eq!(doc.get("mmu_machine", "mmu_vendor"), Some("ERCF"));
        assert!(!doc.has_option("mmu", "mmu_num_gates"));
        assert_eq!(doc.get("mmu", "autotune_rotation_distance"), Some("1"));
    }

    #[test]
    fn dc_espooler_pins_renumbered() {
        let mut doc = Document::parse(
            "[board_pins mmu]\naliases:\n    MMU_DC_MOT_1_A=PA1,\n    MMU_DC_MOT_2_EN=PA2\n\n\
             [output_pin _mmu_dc_espooler_rwd_0]\npin: mmu:MMU_DC_MOT_1_A\n\n\
             [output_pin _mmu_dc_espooler_en_1]\npin: mmu:MMU_DC_MOT_9_EN\n",
        )
        .unwrap();
        upgrade_3_10_to_3_20(&mut doc).unwrap();
        assert!(!doc.has_option("output_pin _mmu_dc_espooler_rwd_0", "pin"));
        assert!(doc.has_option("output_pin _mmu_dc_espooler_en_1", "pin"));
        let aliases = doc.get("board_pins mmu", "aliases").unwrap();
        assert!(aliases.contains("MMU_DC_MOT_0_A=PA1"), "{aliases}");
        assert!(aliases.contains("MMU_DC_MOT_1_EN=PA2"), "{aliases}");
    }
}
