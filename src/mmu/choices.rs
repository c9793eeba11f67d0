//! Enumerated parameter values.

use serde::Serialize;

use crate::cfg::Choice;

/// Sensor used to home filament at the gate (`gate_homing_endstop`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateEndstop {
    MmuGate,
    Encoder,
    MmuGear,
    Extruder,
}

impl Choice for GateEndstop {
    const ALL: &'static [Self] = &[
        GateEndstop::MmuGate,
        GateEndstop::Encoder,
        GateEndstop::MmuGear,
        GateEndstop::Extruder,
    ];

    fn as_str(self) -> &'static str {
        match self {
            GateEndstop::MmuGate => "mmu_gate",
            GateEndstop::Encoder => "encoder",
            GateEndstop::MmuGear => "mmu_gear",
            GateEndstop::Extruder => "extruder",
        }
    }
}

/// How the extruder entrance is found (`extruder_homing_endstop`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtruderEndstop {
    Collision,
    MmuGearTouch,
    Extruder,
    None,
    FilamentCompression,
}

impl Choice for ExtruderEndstop {
    const ALL: &'static [Self] = &[
        ExtruderEndstop::Collision,
        ExtruderEndstop::MmuGearTouch,
        ExtruderEndstop::Extruder,
        ExtruderEndstop::None,
        ExtruderEndstop::FilamentCompression,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ExtruderEndstop::Collision => "collision",
            ExtruderEndstop::MmuGearTouch => "mmu_gear_touch",
            ExtruderEndstop::Extruder => "extruder",
            ExtruderEndstop::None => "none",
            ExtruderEndstop::FilamentCompression => "filament_compression",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpoolmanSupport {
    Off,
    Readonly,
    Push,
    Pull,
}

impl Choice for SpoolmanSupport {
    const ALL: &'static [Self] = &[
        SpoolmanSupport::Off,
        SpoolmanSupport::Readonly,
        SpoolmanSupport::Push,
        SpoolmanSupport::Pull,
    ];

    fn as_str(self) -> &'static str {
        match self {
            SpoolmanSupport::Off => "off",
            SpoolmanSupport::Readonly => "readonly",
            SpoolmanSupport::Push => "push",
            SpoolmanSupport::Pull => "pull",
        }
    }
}

/// Source of the `Tx` macro colours (`t_macro_color`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TMacroColor {
    Gatemap,
    Slicer,
    Allgates,
    Off,
}

impl Choice for TMacroColor {
    const ALL: &'static [Self] = &[
        TMacroColor::Gatemap,
        TMacroColor::Slicer,
        TMacroColor::Allgates,
        TMacroColor::Off,
    ];

    fn as_str(self) -> &'static str {
        match self {
            TMacroColor::Gatemap => "gatemap",
            TMacroColor::Slicer => "slicer",
            TMacroColor::Allgates => "allgates",
            TMacroColor::Off => "off",
        }
    }
}

/// Per-gate statistic format (`console_gate_stat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStat {
    String,
    Percentage,
    Emoticon,
}

impl Choice for GateStat {
    const ALL: &'static [Self] = &[GateStat::String, GateStat::Percentage, GateStat::Emoticon];

    fn as_str(self) -> &'static str {
        match self {
            GateStat::String => "string",
            GateStat::Percentage => "percentage",
            GateStat::Emoticon => "emoticon",
        }
    }
}

/// Printer operations the espooler is active for (`espooler_operations`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EspoolerOperation {
    Off,
    Rewind,
    Assist,
    Print,
}

impl Choice for EspoolerOperation {
    const ALL: &'static [Self] = &[
        EspoolerOperation::Off,
        EspoolerOperation::Rewind,
        EspoolerOperation::Assist,
        EspoolerOperation::Print,
    ];

    fn as_str(self) -> &'static str {
        match self {
            EspoolerOperation::Off => "off",
            EspoolerOperation::Rewind => "rewind",
            EspoolerOperation::Assist => "assist",
            EspoolerOperation::Print => "print",
        }
    }
}

/// Columns of the toolchange statistics table (`console_stat_columns`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatColumn {
    PreUnload,
    FormTip,
    Unload,
    PostUnload,
    PreLoad,
    Load,
    Purge,
    PostLoad,
    Total,
}

impl Choice for StatColumn {
    const ALL: &'static [Self] = &[
        StatColumn::PreUnload,
        StatColumn::FormTip,
        StatColumn::Unload,
        StatColumn::PostUnload,
        StatColumn::PreLoad,
        StatColumn::Load,
        StatColumn::Purge,
        StatColumn::PostLoad,
        StatColumn::Total,
    ];

    fn as_str(self) -> &'static str {
        match self {
            StatColumn::PreUnload => "pre_unload",
            StatColumn::FormTip => "form_tip",
            StatColumn::Unload => "unload",
            StatColumn::PostUnload => "post_unload",
            StatColumn::PreLoad => "pre_load",
            StatColumn::Load => "load",
            StatColumn::Purge => "purge",
            StatColumn::PostLoad => "post_load",
            StatColumn::Total => "total",
        }
    }
}

/// Rows of the toolchange statistics table (`console_stat_rows`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatRow {
    Total,
    TotalAverage,
    Job,
    JobAverage,
    Last,
}

impl Choice for StatRow {
    const ALL: &'static [Self] = &[
        StatRow::Total,
        StatRow::TotalAverage,
        StatRow::Job,
        StatRow::JobAverage,
        StatRow::Last,
    ];

    fn as_str(self) -> &'static str {
        match self {
            StatRow::Total => "total",
            StatRow::TotalAverage => "total_average",
            StatRow::Job => "job",
            StatRow::JobAverage => "job_average",
            StatRow::Last => "last",
        }
    }
}

/// Encoder clog detection mode (`flowguard_encoder_mode`), written as 0/1/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderMode {
    Disabled,
    Static,
    Automatic,
}

impl Choice for EncoderMode {
    const ALL: &'static [Self] = &[EncoderMode::Disabled, EncoderMode::Static, EncoderMode::Automatic];

    fn as_str(self) -> &'static str {
        match self {
            EncoderMode::Disabled => "0",
            EncoderMode::Static => "1",
            EncoderMode::Automatic => "2",
        }
    }
}
