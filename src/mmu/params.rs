//! Typed `[mmu]` parameters.
//!
//! Defaults and limits match what the Happy Hare runtime applies when it reads
//! `mmu_parameters.cfg`, so a file that loads here will load on the printer.
//! Groups follow the order of the shipped template.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cfg::{Bounds, Document, OptionReader};
use crate::error::AppError;

use super::choices::{
    EncoderMode, EspoolerOperation, ExtruderEndstop, GateEndstop, GateStat, SpoolmanSupport,
    StatColumn, StatRow, TMacroColor,
};
use super::drying::{DryingTable, HeaterSettings};
use super::version::{VERSION_OPTION, VersionStamp};

/// Options the runtime reads but the template does not show.
pub const HIDDEN_PARAMS: &[&str] = &[
    "serious",
    "suppress_kalico_warning",
    "test_random_failures",
    "test_force_in_print",
    "error_dialog_macro",
    "error_macro",
    "toolhead_homing_macro",
    "park_macro",
    "save_position_macro",
    "restore_position_macro",
    "clear_position_macro",
    "encoder_dwell",
    "encoder_move_step_size",
    "gear_buzz_accel",
];

/// Options the template only shows commented out.
pub const SUPPLEMENTAL_PARAMS: &[&str] = &[
    "cad_gate0_pos",
    "cad_gate_width",
    "cad_bypass_offset",
    "cad_last_gate_offset",
    "cad_block_width",
    "cad_bypass_block_width",
    "cad_bypass_block_delta",
    "cad_selector_tolerance",
    "cad_gate_directions",
    "cad_release_gates",
    "gate_status",
    "gate_filament_name",
    "gate_material",
    "gate_color",
    "gate_temperature",
    "gate_spool_id",
    "gate_speed_override",
    "endless_spool_groups",
    "tool_to_gate_map",
];

const PERCENT: Bounds = Bounds {
    min: Some(0.0),
    max: Some(100.0),
    above: None,
    below: None,
};

const CURRENT: Bounds = Bounds {
    min: Some(10.0),
    max: Some(100.0),
    above: None,
    below: None,
};

const TIP_CURRENT: Bounds = Bounds {
    min: Some(100.0),
    max: Some(150.0),
    above: None,
    below: None,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareLimits {
    pub gear_max_velocity: f64,
    pub gear_max_accel: f64,
    pub selector_max_velocity: f64,
    pub selector_max_accel: f64,
}

impl HardwareLimits {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            gear_max_velocity: r.get_float("gear_max_velocity", 300.0, Bounds::above(0.0))?,
            gear_max_accel: r.get_float("gear_max_accel", 500.0, Bounds::above(0.0))?,
            selector_max_velocity: r.get_float("selector_max_velocity", 250.0, Bounds::above(0.0))?,
            selector_max_accel: r.get_float("selector_max_accel", 1500.0, Bounds::above(0.0))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Logging {
    /// Console verbosity, 0..=4.
    pub log_level: i64,
    /// File verbosity, -1 disables the log file.
    pub log_file_level: i64,
    pub log_statistics: bool,
    pub log_visual: i64,
    pub log_startup_status: i64,
    pub log_m117_messages: bool,
}

impl Logging {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            log_level: r.get_int("log_level", 1, Bounds::range(0.0, 4.0))?,
            log_file_level: r.get_int("log_file_level", 3, Bounds::range(-1.0, 4.0))?,
            log_statistics: r.get_bool01("log_statistics", false)?,
            log_visual: r.get_int("log_visual", 1, Bounds::range(0.0, 2.0))?,
            log_startup_status: r.get_int("log_startup_status", 1, Bounds::range(0.0, 2.0))?,
            log_m117_messages: r.get_bool01("log_m117_messages", true)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Speeds {
    pub gear_from_spool_speed: f64,
    pub gear_from_spool_accel: f64,
    pub gear_from_buffer_speed: f64,
    pub gear_from_buffer_accel: f64,
    pub gear_unload_speed: f64,
    pub gear_unload_accel: f64,
    pub gear_short_move_speed: f64,
    pub gear_short_move_accel: f64,
    pub gear_short_move_threshold: f64,
    pub gear_homing_speed: f64,
    pub extruder_load_speed: f64,
    pub extruder_unload_speed: f64,
    pub extruder_sync_load_speed: f64,
    pub extruder_sync_unload_speed: f64,
    pub extruder_homing_speed: f64,
    pub selector_move_speed: f64,
    pub selector_homing_speed: f64,
    pub selector_touch_speed: f64,
    pub selector_touch_enabled: bool,
    /// 0 means the printer's own maximum.
    pub macro_toolhead_max_accel: f64,
    pub macro_toolhead_min_cruise_ratio: f64,
}

impl Speeds {
    fn read(r: &mut OptionReader, gate_homing_max: f64) -> Result<Self, AppError> {
        let min10 = Bounds::min(10.0);
        let min1 = Bounds::min(1.0);
        let gear_from_spool_speed = r.get_float("gear_from_spool_speed", 60.0, min10)?;
        let gear_from_spool_accel = r.get_float("gear_from_spool_accel", 100.0, min10)?;
        Ok(Self {
            gear_from_spool_speed,
            gear_from_spool_accel,
            gear_from_buffer_speed: r.get_float("gear_from_buffer_speed", 150.0, min10)?,
            gear_from_buffer_accel: r.get_float("gear_from_buffer_accel", 400.0, min10)?,
            gear_unload_speed: r.get_float("gear_unload_speed", gear_from_spool_speed, min10)?,
            gear_unload_accel: r.get_float("gear_unload_accel", gear_from_spool_accel, min10)?,
            gear_short_move_speed: r.get_float("gear_short_move_speed", 60.0, min1)?,
            gear_short_move_accel: r.get_float("gear_short_move_accel", 400.0, min10)?,
            gear_short_move_threshold: r.get_float("gear_short_move_threshold", gate_homing_max, min1)?,
            gear_homing_speed: r.get_float("gear_homing_speed", 150.0, min1)?,
            extruder_load_speed: r.get_float("extruder_load_speed", 15.0, min1)?,
            extruder_unload_speed: r.get_float("extruder_unload_speed", 15.0, min1)?,
            extruder_sync_load_speed: r.get_float("extruder_sync_load_speed", 15.0, min1)?,
            extruder_sync_unload_speed: r.get_float("extruder_sync_unload_speed", 15.0, min1)?,
            extruder_homing_speed: r.get_float("extruder_homing_speed", 15.0, min1)?,
            selector_move_speed: r.get_float("selector_move_speed", 200.0, min1)?,
            selector_homing_speed: r.get_float("selector_homing_speed", 100.0, min1)?,
            selector_touch_speed: r.get_float("selector_touch_speed", 60.0, min1)?,
            selector_touch_enabled: r.get_bool01("selector_touch_enabled", true)?,
            macro_toolhead_max_accel: r.get_float("macro_toolhead_max_accel", 0.0, Bounds::min(0.0))?,
            macro_toolhead_min_cruise_ratio: r.get_float(
                "macro_toolhead_min_cruise_ratio",
                0.5,
                Bounds::min(0.0).with_below(1.0),
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateSettings {
    pub gate_homing_endstop: GateEndstop,
    pub gate_homing_max: f64,
    pub gate_preload_homing_max: f64,
    /// Can be negative.
    pub gate_preload_parking_distance: f64,
    pub gate_unload_buffer: f64,
    pub gate_load_retries: i64,
    /// Can be negative.
    pub gate_parking_distance: f64,
    pub gate_endstop_to_encoder: f64,
    pub gate_autoload: bool,
    pub gate_final_eject_distance: f64,
}

impl GateSettings {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        let gate_homing_max = r.get_float("gate_homing_max", 100.0, Bounds::min(10.0))?;
        Ok(Self {
            gate_homing_endstop: r.get_choice("gate_homing_endstop", GateEndstop::Encoder)?,
            gate_homing_max,
            gate_preload_homing_max: r.get_float("gate_preload_homing_max", gate_homing_max, Bounds::NONE)?,
            gate_preload_parking_distance: r.get_float("gate_preload_parking_distance", -10.0, Bounds::NONE)?,
            gate_unload_buffer: r.get_float("gate_unload_buffer", 30.0, Bounds::min(0.0))?,
            gate_load_retries: r.get_int("gate_load_retries", 1, Bounds::range(1.0, 5.0))?,
            gate_parking_distance: r.get_float("gate_parking_distance", 23.0, Bounds::NONE)?,
            gate_endstop_to_encoder: r.get_float("gate_endstop_to_encoder", 0.0, Bounds::min(0.0))?,
            gate_autoload: r.get_bool01("gate_autoload", true)?,
            gate_final_eject_distance: r.get_float("gate_final_eject_distance", 0.0, Bounds::NONE)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BowdenSettings {
    pub bowden_homing_max: f64,
    pub bowden_apply_correction: bool,
    pub bowden_allowable_load_delta: f64,
    pub bowden_pre_unload_test: bool,
    pub bowden_pre_unload_error_tolerance: f64,
    pub bowden_fast_load_portion: f64,
    pub bowden_fast_unload_portion: f64,
}

impl BowdenSettings {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        let portion = Bounds::range(50.0, 100.0);
        Ok(Self {
            bowden_homing_max: r.get_float("bowden_homing_max", 2000.0, Bounds::min(100.0))?,
            bowden_apply_correction: r.get_bool01("bowden_apply_correction", false)?,
            bowden_allowable_load_delta: r.get_float("bowden_allowable_load_delta", 10.0, Bounds::min(1.0))?,
            bowden_pre_unload_test: r.get_bool01("bowden_pre_unload_test", false)?,
            bowden_pre_unload_error_tolerance: r.get_float(
                "bowden_pre_unload_error_tolerance",
                100.0,
                PERCENT,
            )?,
            bowden_fast_load_portion: r.get_float("bowden_fast_load_portion", 95.0, portion)?,
            bowden_fast_unload_portion: r.get_float("bowden_fast_unload_portion", 95.0, portion)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtruderHoming {
    pub extruder_homing_max: f64,
    pub extruder_homing_endstop: ExtruderEndstop,
    pub extruder_homing_buffer: f64,
    pub extruder_collision_homing_current: i64,
    pub extruder_collision_homing_step: i64,
    pub extruder_force_homing: bool,
}

impl ExtruderHoming {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            extruder_homing_max: r.get_float("extruder_homing_max", 50.0, Bounds::above(10.0))?,
            extruder_homing_endstop: r.get_choice("extruder_homing_endstop", ExtruderEndstop::None)?,
            extruder_homing_buffer: r.get_float("extruder_homing_buffer", 30.0, Bounds::min(0.0))?,
            extruder_collision_homing_current: r.get_int(
                "extruder_collision_homing_current",
                50,
                CURRENT,
            )?,
            extruder_collision_homing_step: r.get_int(
                "extruder_collision_homing_step",
                3,
                Bounds::range(2.0, 5.0),
            )?,
            extruder_force_homing: r.get_bool01("extruder_force_homing", false)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolheadSettings {
    pub toolhead_homing_max: f64,
    /// `None` until the user measures it.
    pub toolhead_extruder_to_nozzle: Option<f64>,
    pub toolhead_sensor_to_nozzle: Option<f64>,
    pub toolhead_entry_to_extruder: Option<f64>,
    pub toolhead_residual_filament: f64,
    pub toolhead_ooze_reduction: f64,
    pub toolhead_unload_safety_margin: f64,
    pub toolhead_post_load_tighten: i64,
    pub toolhead_post_load_tension_adjust: bool,
    pub toolhead_entry_tension_test: bool,
    pub toolhead_move_error_tolerance: f64,
}

impl ToolheadSettings {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            toolhead_homing_max: r.get_float("toolhead_homing_max", 20.0, Bounds::min(0.0))?,
            toolhead_extruder_to_nozzle: r.get_opt_float("toolhead_extruder_to_nozzle", Bounds::min(5.0))?,
            toolhead_sensor_to_nozzle: r.get_opt_float("toolhead_sensor_to_nozzle", Bounds::min(5.0))?,
            toolhead_entry_to_extruder: r.get_opt_float("toolhead_entry_to_extruder", Bounds::min(0.0))?,
            toolhead_residual_filament: r.get_float(
                "toolhead_residual_filament",
                0.0,
                Bounds::range(0.0, 50.0),
            )?,
            toolhead_ooze_reduction: r.get_float("toolhead_ooze_reduction", 0.0, Bounds::range(-5.0, 20.0))?,
            toolhead_unload_safety_margin: r.get_float("toolhead_unload_safety_margin", 10.0, Bounds::min(0.0))?,
            toolhead_post_load_tighten: r.get_int("toolhead_post_load_tighten", 60, PERCENT)?,
            toolhead_post_load_tension_adjust: r.get_bool01("toolhead_post_load_tension_adjust", true)?,
            toolhead_entry_tension_test: r.get_bool01("toolhead_entry_tension_test", true)?,
            toolhead_move_error_tolerance: r.get_float("toolhead_move_error_tolerance", 60.0, PERCENT)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipForming {
    pub force_form_tip_standalone: bool,
    pub form_tip_macro: String,
    pub extruder_form_tip_current: i64,
    pub slicer_tip_park_pos: f64,
}

impl TipForming {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            force_form_tip_standalone: r.get_bool01("force_form_tip_standalone", false)?,
            form_tip_macro: r.get_str("form_tip_macro", "_MMU_FORM_TIP"),
            extruder_form_tip_current: r.get_int("extruder_form_tip_current", 100, TIP_CURRENT)?,
            slicer_tip_park_pos: r.get_float("slicer_tip_park_pos", 0.0, Bounds::min(0.0))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Purging {
    pub force_purge_standalone: bool,
    /// Empty disables standalone purging.
    pub purge_macro: String,
    pub extruder_purge_current: i64,
}

impl Purging {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            force_purge_standalone: r.get_bool01("force_purge_standalone", false)?,
            purge_macro: r.get_str("purge_macro", ""),
            extruder_purge_current: r.get_int("extruder_purge_current", 100, TIP_CURRENT)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSettings {
    pub sync_to_extruder: bool,
    pub sync_gear_current: i64,
    pub sync_form_tip: bool,
    pub sync_purge: bool,
    pub sync_feedback_enabled: bool,
    pub sync_feedback_buffer_range: f64,
    pub sync_feedback_buffer_maxrange: f64,
    pub sync_feedback_speed_multiplier: f64,
    pub sync_feedback_boost_multiplier: f64,
    pub sync_feedback_extrude_threshold: f64,
    pub sync_feedback_debug_log: bool,
}

impl SyncSettings {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        let multiplier = Bounds::range(1.0, 50.0);
        Ok(Self {
            sync_to_extruder: r.get_bool01("sync_to_extruder", false)?,
            sync_gear_current: r.get_int("sync_gear_current", 50, CURRENT)?,
            sync_form_tip: r.get_bool01("sync_form_tip", false)?,
            sync_purge: r.get_bool01("sync_purge", false)?,
            sync_feedback_enabled: r.get_bool01("sync_feedback_enabled", false)?,
            sync_feedback_buffer_range: r.get_float("sync_feedback_buffer_range", 10.0, Bounds::min(0.0))?,
            sync_feedback_buffer_maxrange: r.get_float(
                "sync_feedback_buffer_maxrange",
                10.0,
                Bounds::min(0.0),
            )?,
            sync_feedback_speed_multiplier: r.get_float("sync_feedback_speed_multiplier", 5.0, multiplier)?,
            sync_feedback_boost_multiplier: r.get_float("sync_feedback_boost_multiplier", 5.0, multiplier)?,
            sync_feedback_extrude_threshold: r.get_float(
                "sync_feedback_extrude_threshold",
                5.0,
                Bounds::above(1.0),
            )?,
            sync_feedback_debug_log: r.get_bool01("sync_feedback_debug_log", false)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EspoolerSettings {
    pub espooler_min_distance: f64,
    pub espooler_max_stepper_speed: f64,
    pub espooler_min_stepper_speed: f64,
    pub espooler_speed_exponent: f64,
    pub espooler_assist_reduced_speed: i64,
    pub espooler_printing_power: i64,
    pub espooler_operations: Vec<EspoolerOperation>,
    pub espooler_assist_extruder_move_length: f64,
    pub espooler_assist_burst_power: i64,
    pub espooler_assist_burst_duration: f64,
    pub espooler_assist_burst_trigger: bool,
    pub espooler_assist_burst_trigger_max: i64,
    pub espooler_rewind_burst_power: i64,
    pub espooler_rewind_burst_duration: f64,
}

impl EspoolerSettings {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        let max_speed = r.get_float("espooler_max_stepper_speed", 300.0, Bounds::above(0.0))?;
        let burst = Bounds::above(0.0).with_max(10.0);
        Ok(Self {
            espooler_min_distance: r.get_float("espooler_min_distance", 50.0, Bounds::above(0.0))?,
            espooler_max_stepper_speed: max_speed,
            espooler_min_stepper_speed: r.get_float(
                "espooler_min_stepper_speed",
                0.0,
                Bounds::min(0.0).with_below(max_speed),
            )?,
            espooler_speed_exponent: r.get_float("espooler_speed_exponent", 0.5, Bounds::above(0.0))?,
            espooler_assist_reduced_speed: r.get_int("espooler_assist_reduced_speed", 50, PERCENT)?,
            espooler_printing_power: r.get_int("espooler_printing_power", 0, PERCENT)?,
            espooler_operations: r.get_choice_list(
                "espooler_operations",
                &[
                    EspoolerOperation::Rewind,
                    EspoolerOperation::Assist,
                    EspoolerOperation::Print,
                ],
            )?,
            espooler_assist_extruder_move_length: r.get_float(
                "espooler_assist_extruder_move_length",
                100.0,
                Bounds::above(10.0),
            )?,
            espooler_assist_burst_power: r.get_int("espooler_assist_burst_power", 50, PERCENT)?,
            espooler_assist_burst_duration: r.get_float("espooler_assist_burst_duration", 0.4, burst)?,
            espooler_assist_burst_trigger: r.get_bool01("espooler_assist_burst_trigger", false)?,
            espooler_assist_burst_trigger_max: r.get_int(
                "espooler_assist_burst_trigger_max",
                3,
                Bounds::min(1.0),
            )?,
            espooler_rewind_burst_power: r.get_int("espooler_rewind_burst_power", 50, PERCENT)?,
            espooler_rewind_burst_duration: r.get_float("espooler_rewind_burst_duration", 0.4, burst)?,
        })
    }

    /// PWM duty (0..=1) for a rewind/assist move at `speed` mm/s.
    pub fn pwm_for_speed(&self, speed: f64) -> f64 {
        let speed = speed.abs();
        if speed == 0.0 || speed < self.espooler_min_stepper_speed {
            return 0.0;
        }
        (speed / self.espooler_max_stepper_speed)
            .min(1.0)
            .powf(self.espooler_speed_exponent)
    }

    pub fn is_enabled_for(&self, op: EspoolerOperation) -> bool {
        !self.espooler_operations.contains(&EspoolerOperation::Off) && self.espooler_operations.contains(&op)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowguardSettings {
    pub flowguard_enabled: bool,
    pub flowguard_max_relief: f64,
    pub flowguard_encoder_mode: EncoderMode,
    pub flowguard_encoder_max_motion: f64,
}

impl FlowguardSettings {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            flowguard_enabled: r.get_bool01("flowguard_enabled", true)?,
            flowguard_max_relief: r.get_float("flowguard_max_relief", 8.0, Bounds::above(1.0))?,
            flowguard_encoder_mode: r.get_choice("flowguard_encoder_mode", EncoderMode::Automatic)?,
            flowguard_encoder_max_motion: r.get_float(
                "flowguard_encoder_max_motion",
                20.0,
                Bounds::above(0.0),
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilamentManagement {
    pub endless_spool_enabled: bool,
    pub endless_spool_on_load: bool,
    /// -1 ejects into the current gate.
    pub endless_spool_eject_gate: i64,
    pub spoolman_support: SpoolmanSupport,
    /// Seconds; -1 never expires.
    pub pending_spool_id_timeout: i64,
    pub t_macro_color: TMacroColor,
}

impl FilamentManagement {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            endless_spool_enabled: r.get_bool01("endless_spool_enabled", false)?,
            endless_spool_on_load: r.get_bool01("endless_spool_on_load", false)?,
            endless_spool_eject_gate: r.get_int("endless_spool_eject_gate", -1, Bounds::min(-1.0))?,
            spoolman_support: r.get_choice("spoolman_support", SpoolmanSupport::Off)?,
            pending_spool_id_timeout: r.get_int("pending_spool_id_timeout", 20, Bounds::min(-1.0))?,
            t_macro_color: r.get_choice("t_macro_color", TMacroColor::Slicer)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleStats {
    pub console_stat_columns: Vec<StatColumn>,
    pub console_stat_rows: Vec<StatRow>,
    pub console_gate_stat: GateStat,
    pub console_always_output_full: bool,
}

impl ConsoleStats {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            console_stat_columns: r.get_choice_list(
                "console_stat_columns",
                &[StatColumn::Unload, StatColumn::Load, StatColumn::Total],
            )?,
            console_stat_rows: r.get_choice_list(
                "console_stat_rows",
                &[StatRow::Total, StatRow::TotalAverage, StatRow::Job, StatRow::JobAverage, StatRow::Last],
            )?,
            console_gate_stat: r.get_choice("console_gate_stat", GateStat::Emoticon)?,
            console_always_output_full: r.get_bool01("console_always_output_full", true)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub autocal_bowden_length: bool,
    pub autotune_bowden_length: bool,
    pub skip_cal_rotation_distance: bool,
    pub autotune_rotation_distance: bool,
    pub skip_cal_encoder: bool,
    pub autotune_encoder: bool,
}

impl Calibration {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            autocal_bowden_length: r.get_bool01("autocal_bowden_length", true)?,
            autotune_bowden_length: r.get_bool01("autotune_bowden_length", false)?,
            skip_cal_rotation_distance: r.get_bool01("skip_cal_rotation_distance", false)?,
            autotune_rotation_distance: r.get_bool01("autotune_rotation_distance", false)?,
            skip_cal_encoder: r.get_bool01("skip_cal_encoder", false)?,
            autotune_encoder: r.get_bool01("autotune_encoder", false)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub timeout_pause: i64,
    pub disable_heater: i64,
    pub default_extruder_temp: f64,
    pub extruder_temp_variance: f64,
    pub startup_home_if_unloaded: bool,
    pub startup_reset_ttg_map: bool,
    pub show_error_dialog: bool,
    pub preload_attempts: i64,
    pub strict_filament_recovery: bool,
    pub filament_recovery_on_pause: bool,
    pub retry_tool_change_on_error: bool,
    pub bypass_autoload: bool,
    pub has_filament_buffer: bool,
    pub encoder_move_validation: bool,
    pub print_start_detection: bool,
    /// Name of the toolhead extruder the MMU feeds.
    pub extruder: String,
    pub gcode_load_sequence: bool,
    pub gcode_unload_sequence: bool,
}

impl Workflow {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            timeout_pause: r.get_int("timeout_pause", 72000, Bounds::min(0.0))?,
            disable_heater: r.get_int("disable_heater", 600, Bounds::min(0.0))?,
            default_extruder_temp: r.get_float("default_extruder_temp", 200.0, Bounds::min(0.0))?,
            extruder_temp_variance: r.get_float("extruder_temp_variance", 2.0, Bounds::min(1.0))?,
            startup_home_if_unloaded: r.get_bool01("startup_home_if_unloaded", false)?,
            startup_reset_ttg_map: r.get_bool01("startup_reset_ttg_map", false)?,
            show_error_dialog: r.get_bool01("show_error_dialog", true)?,
            preload_attempts: r.get_int("preload_attempts", 1, Bounds::range(1.0, 20.0))?,
            strict_filament_recovery: r.get_bool01("strict_filament_recovery", false)?,
            filament_recovery_on_pause: r.get_bool01("filament_recovery_on_pause", true)?,
            retry_tool_change_on_error: r.get_bool01("retry_tool_change_on_error", false)?,
            bypass_autoload: r.get_bool01("bypass_autoload", true)?,
            has_filament_buffer: r.get_bool01("has_filament_buffer", true)?,
            encoder_move_validation: r.get_bool01("encoder_move_validation", true)?,
            print_start_detection: r.get_bool01("print_start_detection", true)?,
            extruder: r.get_str("extruder", "extruder"),
            gcode_load_sequence: r.get_bool01("gcode_load_sequence", false)?,
            gcode_unload_sequence: r.get_bool01("gcode_unload_sequence", false)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KlipperTuning {
    pub update_trsync: bool,
    pub canbus_comms_retries: i64,
    pub update_bit_max_time: bool,
    pub update_aht10_commands: bool,
}

impl KlipperTuning {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        Ok(Self {
            update_trsync: r.get_bool01("update_trsync", false)?,
            canbus_comms_retries: r.get_int("canbus_comms_retries", 3, Bounds::range(1.0, 10.0))?,
            update_bit_max_time: r.get_bool01("update_bit_max_time", false)?,
            update_aht10_commands: r.get_bool01("update_aht10_commands", false)?,
        })
    }
}

/// Names of the user-overridable macros.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macros {
    pub pause_macro: String,
    pub action_changed_macro: String,
    pub print_state_changed_macro: String,
    pub mmu_event_macro: String,
    pub pre_unload_macro: String,
    pub post_form_tip_macro: String,
    pub post_unload_macro: String,
    pub pre_load_macro: String,
    pub post_load_macro: String,
    pub unload_sequence_macro: String,
    pub load_sequence_macro: String,
}

impl Macros {
    fn read(r: &mut OptionReader) -> Self {
        Self {
            pause_macro: r.get_str("pause_macro", "PAUSE"),
            action_changed_macro: r.get_str("action_changed_macro", "_MMU_ACTION_CHANGED"),
            print_state_changed_macro: r.get_str("print_state_changed_macro", "_MMU_PRINT_STATE_CHANGED"),
            mmu_event_macro: r.get_str("mmu_event_macro", "_MMU_EVENT"),
            pre_unload_macro: r.get_str("pre_unload_macro", "_MMU_PRE_UNLOAD"),
            post_form_tip_macro: r.get_str("post_form_tip_macro", "_MMU_POST_FORM_TIP"),
            post_unload_macro: r.get_str("post_unload_macro", "_MMU_POST_UNLOAD"),
            pre_load_macro: r.get_str("pre_load_macro", "_MMU_PRE_LOAD"),
            post_load_macro: r.get_str("post_load_macro", "_MMU_POST_LOAD"),
            unload_sequence_macro: r.get_str("unload_sequence_macro", "_MMU_UNLOAD_SEQUENCE"),
            load_sequence_macro: r.get_str("load_sequence_macro", "_MMU_LOAD_SEQUENCE"),
        }
    }
}

/// Values the gate map, TTG map and EndlessSpool groups reset to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateMapDefaults {
    pub gate_status: Option<Vec<i64>>,
    pub gate_filament_name: Option<Vec<String>>,
    pub gate_material: Option<Vec<String>>,
    pub gate_color: Option<Vec<String>>,
    pub gate_temperature: Option<Vec<i64>>,
    pub gate_spool_id: Option<Vec<i64>>,
    pub gate_speed_override: Option<Vec<i64>>,
    pub endless_spool_groups: Option<Vec<i64>>,
    pub tool_to_gate_map: Option<Vec<i64>>,
}

impl GateMapDefaults {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        let defaults = Self {
            gate_status: r.get_opt_int_list("gate_status")?,
            gate_filament_name: r.get_opt_list("gate_filament_name"),
            gate_material: r.get_opt_list("gate_material"),
            gate_color: r.get_opt_list("gate_color"),
            gate_temperature: r.get_opt_int_list("gate_temperature")?,
            gate_spool_id: r.get_opt_int_list("gate_spool_id")?,
            gate_speed_override: r.get_opt_int_list("gate_speed_override")?,
            endless_spool_groups: r.get_opt_int_list("endless_spool_groups")?,
            tool_to_gate_map: r.get_opt_int_list("tool_to_gate_map")?,
        };
        if let Some(bad) = defaults
            .gate_status
            .iter()
            .flatten()
            .find(|s| !(-1..=2).contains(*s))
        {
            return Err(r.error("gate_status", format!("{bad} is not one of -1, 0, 1, 2")));
        }
        defaults.check_lengths(r.section())?;
        Ok(defaults)
    }

    fn lengths(&self) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        let mut push = |name, len: Option<usize>| {
            if let Some(len) = len {
                out.push((name, len));
            }
        };
        push("gate_status", self.gate_status.as_ref().map(Vec::len));
        push("gate_filament_name", self.gate_filament_name.as_ref().map(Vec::len));
        push("gate_material", self.gate_material.as_ref().map(Vec::len));
        push("gate_color", self.gate_color.as_ref().map(Vec::len));
        push("gate_temperature", self.gate_temperature.as_ref().map(Vec::len));
        push("gate_spool_id", self.gate_spool_id.as_ref().map(Vec::len));
        push("gate_speed_override", self.gate_speed_override.as_ref().map(Vec::len));
        push("endless_spool_groups", self.endless_spool_groups.as_ref().map(Vec::len));
        push("tool_to_gate_map", self.tool_to_gate_map.as_ref().map(Vec::len));
        out
    }

    /// Every list that is present covers the same number of gates.
    fn check_lengths(&self, section: &str) -> Result<(), AppError> {
        let lengths = self.lengths();
        let Some(&(first, expected)) = lengths.first() else {
            return Ok(());
        };
        match lengths.iter().find(|(_, len)| *len != expected) {
            None => Ok(()),
            Some((name, len)) => Err(AppError::option(
                section,
                name,
                format!("has {len} entries but {first} has {expected}"),
            )),
        }
    }

    /// Number of gates the lists describe, if any list is set.
    pub fn num_gates(&self) -> Option<usize> {
        self.lengths().first().map(|(_, len)| *len)
    }
}

/// Selector geometry overrides for custom MMUs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CadOverrides {
    pub cad_gate0_pos: Option<f64>,
    pub cad_gate_width: Option<f64>,
    pub cad_bypass_offset: Option<f64>,
    pub cad_last_gate_offset: Option<f64>,
    pub cad_block_width: Option<f64>,
    pub cad_bypass_block_width: Option<f64>,
    pub cad_bypass_block_delta: Option<f64>,
    pub cad_selector_tolerance: Option<f64>,
    pub cad_gate_directions: Option<Vec<i64>>,
    pub cad_release_gates: Option<Vec<i64>>,
}

impl CadOverrides {
    fn read(r: &mut OptionReader) -> Result<Self, AppError> {
        let min0 = Bounds::min(0.0);
        let cad = Self {
            cad_gate0_pos: r.get_opt_float("cad_gate0_pos", min0)?,
            cad_gate_width: r.get_opt_float("cad_gate_width", Bounds::above(0.0))?,
            cad_bypass_offset: r.get_opt_float("cad_bypass_offset", min0)?,
            cad_last_gate_offset: r.get_opt_float("cad_last_gate_offset", min0)?,
            cad_block_width: r.get_opt_float("cad_block_width", min0)?,
            cad_bypass_block_width: r.get_opt_float("cad_bypass_block_width", min0)?,
            cad_bypass_block_delta: r.get_opt_float("cad_bypass_block_delta", min0)?,
            cad_selector_tolerance: r.get_opt_float("cad_selector_tolerance", min0)?,
            cad_gate_directions: r.get_opt_literal_int_list("cad_gate_directions")?,
            cad_release_gates: r.get_opt_literal_int_list("cad_release_gates")?,
        };
        if let Some(bad) = cad
            .cad_gate_directions
            .iter()
            .flatten()
            .find(|d| !(0..=1).contains(*d))
        {
            return Err(r.error("cad_gate_directions", format!("{bad} is not 0 or 1")));
        }
        Ok(cad)
    }
}

/// Everything in the `[mmu]` parameters section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MmuParameters {
    pub version: VersionStamp,
    pub hardware: HardwareLimits,
    pub logging: Logging,
    pub speeds: Speeds,
    pub gate: GateSettings,
    pub bowden: BowdenSettings,
    pub extruder: ExtruderHoming,
    pub toolhead: ToolheadSettings,
    pub tip_forming: TipForming,
    pub purging: Purging,
    pub sync: SyncSettings,
    pub espooler: EspoolerSettings,
    pub heater: HeaterSettings,
    pub drying_data: DryingTable,
    pub flowguard: FlowguardSettings,
    pub filament: FilamentManagement,
    pub console: ConsoleStats,
    pub calibration: Calibration,
    pub workflow: Workflow,
    pub klipper: KlipperTuning,
    pub macros: Macros,
    pub gate_map: GateMapDefaults,
    pub cad: CadOverrides,
    /// Hidden options that were set, kept as written.
    pub hidden: BTreeMap<String, String>,
}

impl MmuParameters {
    /// Load `section` of `doc`. Duplicate options in `section` are an error; options the
    /// schema does not know are logged, or rejected when `strict`.
    pub fn from_document(doc: &Document, section: &str, strict: bool) -> Result<Self, AppError> {
        doc.check_unique_in(section)?;
        let mut reader = OptionReader::new(doc, section)?;
        let params = Self::from_reader(&mut reader)?;

        let unused = reader.unused();
        if !unused.is_empty() {
            if strict {
                return Err(AppError::option(section, unused[0], "unknown option"));
            }
            for name in &unused {
                warn!(section, option = %name, "unknown option ignored");
            }
        }
        debug!(section, "parameters loaded");
        Ok(params)
    }

    pub fn from_reader(r: &mut OptionReader) -> Result<Self, AppError> {
        let version = VersionStamp::from_value(r.get_opt_str(VERSION_OPTION).as_deref())?;
        let gate = GateSettings::read(r)?;
        let speeds = Speeds::read(r, gate.gate_homing_max)?;
        let heater = read_heater(r)?;
        let drying_data = match r.get_opt_str("drying_data") {
            Some(raw) => DryingTable::parse(&raw).map_err(|e| r.error("drying_data", e.to_string()))?,
            None => DryingTable::default(),
        };

        Ok(Self {
            version,
            hardware: HardwareLimits::read(r)?,
            logging: Logging::read(r)?,
            speeds,
            gate,
            bowden: BowdenSettings::read(r)?,
            extruder: ExtruderHoming::read(r)?,
            toolhead: ToolheadSettings::read(r)?,
            tip_forming: TipForming::read(r)?,
            purging: Purging::read(r)?,
            sync: SyncSettings::read(r)?,
            espooler: EspoolerSettings::read(r)?,
            heater,
            drying_data,
            flowguard: FlowguardSettings::read(r)?,
            filament: FilamentManagement::read(r)?,
            console: ConsoleStats::read(r)?,
            calibration: Calibration::read(r)?,
            workflow: Workflow::read(r)?,
            klipper: KlipperTuning::read(r)?,
            macros: Macros::read(r),
            gate_map: GateMapDefaults::read(r)?,
            cad: CadOverrides::read(r)?,
            hidden: r.take_raw(HIDDEN_PARAMS),
        })
    }
}

fn read_heater(r: &mut OptionReader) -> Result<HeaterSettings, AppError> {
    Ok(HeaterSettings {
        max_temp: r.get_float("heater_max_temp", 65.0, Bounds::above(0.0))?,
        default_dry_temp: r.get_float("heater_default_dry_temp", 45.0, Bounds::above(0.0))?,
        default_dry_time: r.get_float("heater_default_dry_time", 300.0, Bounds::above(0.0))?,
        default_humidity: r.get_float("heater_default_humidity", 10.0, Bounds::above(0.0))?,
        vent_macro: r.get_str("heater_vent_macro", ""),
        vent_interval: r.get_float("heater_vent_interval", 0.0, Bounds::min(0.0))?,
        rotate_interval: r.get_float("heater_rotate_interval", 5.0, Bounds::min(1.0))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmu::drying::DryingPreset;

    fn load(text: &str) -> Result<MmuParameters, AppError> {
        let doc = Document::parse(text)?;
        MmuParameters::from_document(&doc, "mmu", true)
    }

    #[test]
    fn empty_section_takes_defaults() {
        let p = load("[mmu]\n").unwrap();
        assert_eq!(p.version, VersionStamp::Missing);
        assert_eq!(p.hardware.gear_max_velocity, 300.0);
        assert_eq!(p.logging.log_level, 1);
        assert_eq!(p.gate.gate_homing_endstop, GateEndstop::Encoder);
        assert_eq!(p.heater.max_temp, 65.0);
        assert_eq!(p.flowguard.flowguard_max_relief, 8.0);
        assert_eq!(p.flowguard.flowguard_encoder_mode, EncoderMode::Automatic);
        assert!(p.drying_data.is_empty());
        assert!(p.hidden.is_empty());
        assert_eq!(p.gate_map, GateMapDefaults::default());
    }

    #[test]
    fn dependent_defaults_follow_their_source() {
        let p = load("[mmu]\ngear_from_spool_speed: 80\ngear_from_spool_accel: 120\ngate_homing_max: 70\n").unwrap();
        assert_eq!(p.speeds.gear_unload_speed, 80.0);
        assert_eq!(p.speeds.gear_unload_accel, 120.0);
        assert_eq!(p.speeds.gear_short_move_threshold, 70.0);
        assert_eq!(p.gate.gate_preload_homing_max, 70.0);

        let p = load("[mmu]\ngear_from_spool_speed: 80\ngear_unload_speed: 40\n").unwrap();
        assert_eq!(p.speeds.gear_unload_speed, 40.0);
    }

    #[test]
    fn bounds_violation_names_option() {
        let err = load("[mmu]\ngear_from_spool_speed: 5\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("gear_from_spool_speed"), "{msg}");
        assert!(msg.contains("minimum of 10"), "{msg}");

        let err = load("[mmu]\nsync_feedback_speed_multiplier: 51\n").unwrap_err();
        assert!(err.to_string().contains("maximum of 50"));

        let err = load("[mmu]\nextruder_form_tip_current: 90\n").unwrap_err();
        assert!(err.to_string().contains("extruder_form_tip_current"));
    }

    #[test]
    fn espooler_min_speed_must_be_below_max() {
        let err = load("[mmu]\nespooler_max_stepper_speed: 200\nespooler_min_stepper_speed: 200\n").unwrap_err();
        assert!(err.to_string().contains("must be below 200"));
    }

    #[test]
    fn espooler_pwm_curve() {
        let p = load("[mmu]\nespooler_max_stepper_speed: 400\nespooler_min_stepper_speed: 10\nespooler_speed_exponent: 0.5\n").unwrap();
        let e = &p.espooler;
        assert_eq!(e.pwm_for_speed(0.0), 0.0);
        assert_eq!(e.pwm_for_speed(5.0), 0.0);
        assert!((e.pwm_for_speed(100.0) - 0.5).abs() < 1e-9);
        assert_eq!(e.pwm_for_speed(-400.0), 1.0);
        assert_eq!(e.pwm_for_speed(1000.0), 1.0);
    }

    #[test]
    fn espooler_operations_off_disables_all() {
        let p = load("[mmu]\nespooler_operations: off, rewind\n").unwrap();
        assert!(!p.espooler.is_enabled_for(EspoolerOperation::Rewind));
        let p = load("[mmu]\nespooler_operations: rewind\n").unwrap();
        assert!(p.espooler.is_enabled_for(EspoolerOperation::Rewind));
        assert!(!p.espooler.is_enabled_for(EspoolerOperation::Print));
    }

    #[test]
    fn bad_choice_lists_accepted_values() {
        let err = load("[mmu]\nspoolman_support: maybe\n").unwrap_err();
        assert!(err.to_string().contains("off, readonly, push, pull"));
        let err = load("[mmu]\nconsole_stat_rows: total, sometimes\n").unwrap_err();
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn drying_data_is_parsed() {
        let p = load("[mmu]\ndrying_data: { 'pla': (45, 300), 'PETG': (60, 300) }\n").unwrap();
        assert_eq!(p.drying_data.lookup("pla"), Some(DryingPreset::new(45, 300)));
        assert_eq!(p.drying_data.lookup("petg"), Some(DryingPreset::new(60, 300)));

        let err = load("[mmu]\ndrying_data: { 'pla': 45 }\n").unwrap_err();
        assert!(err.to_string().contains("drying_data"));
    }

    #[test]
    fn gate_map_lists_must_agree() {
        let p = load("[mmu]\ngate_status: 1, 0, -1\ngate_material: PLA, ABS, PETG\ntool_to_gate_map: 0, 1, 2\n").unwrap();
        assert_eq!(p.gate_map.num_gates(), Some(3));
        assert_eq!(p.gate_map.gate_material.as_deref().map(<[String]>::len), Some(3));

        let err = load("[mmu]\ngate_status: 1, 0, 1\ngate_color: red, blue\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("gate_color"), "{msg}");
        assert!(msg.contains("has 2 entries but gate_status has 3"), "{msg}");

        let err = load("[mmu]\ngate_status: 1, 3\n").unwrap_err();
        assert!(err.to_string().contains("gate_status"));
    }

    #[test]
    fn cad_overrides_and_literal_lists() {
        let p = load("[mmu]\ncad_gate_width: 21.0\ncad_gate_directions = [1, 1, 0, 0]\ncad_release_gates = [2, 3, 0, 1]\n").unwrap();
        assert_eq!(p.cad.cad_gate_width, Some(21.0));
        assert_eq!(p.cad.cad_gate_directions, Some(vec![1, 1, 0, 0]));
        assert_eq!(p.cad.cad_release_gates, Some(vec![2, 3, 0, 1]));
        assert!(load("[mmu]\ncad_gate_directions = [1, 2]\n").is_err());
    }

    #[test]
    fn hidden_params_are_kept_raw() {
        let p = load("[mmu]\nserious: 1\nerror_macro: MY_ERROR\n").unwrap();
        assert_eq!(p.hidden.get("serious").map(String::as_str), Some("1"));
        assert_eq!(p.hidden.get("error_macro").map(String::as_str), Some("MY_ERROR"));
    }

    #[test]
    fn unknown_options_fail_only_in_strict_mode() {
        let doc = Document::parse("[mmu]\nmystery_knob: 3\n").unwrap();
        let err = MmuParameters::from_document(&doc, "mmu", true).unwrap_err();
        assert!(err.to_string().contains("mystery_knob"));
        assert!(MmuParameters::from_document(&doc, "mmu", false).is_ok());
    }

    #[test]
    fn duplicate_options_are_rejected() {
        let err = load("[mmu]\nlog_level: 1\nlog_level: 2\n").unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn duplicates_elsewhere_do_not_block_loading() {
        let p = load("[mmu]\nlog_level: 2\n\n[gcode_macro X]\ngcode: M117\ngcode: M118\n").unwrap();
        assert_eq!(p.logging.log_level, 2);
    }

    #[test]
    fn version_stamp_is_read() {
        let p = load("[mmu]\nhappy_hare_version: {happy_hare_version}\n").unwrap();
        assert_eq!(p.version, VersionStamp::Unrendered("happy_hare_version".into()));
    }

    #[test]
    fn serialises_to_json() {
        let p = load("[mmu]\nspoolman_support: push\n").unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["filament"]["spoolman_support"], "push");
        assert_eq!(json["version"]["kind"], "missing");
    }
}
