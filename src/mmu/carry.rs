//! Carry a user's settings from an existing config into a fresh template.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cfg::{Document, Scope};
use crate::error::AppError;

use super::params::{HIDDEN_PARAMS, SUPPLEMENTAL_PARAMS};
use super::upgrade;
use super::version::{self, HhVersion, VERSION_OPTION, VersionStamp, VersionStatus};

/// What [`carry_over`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CarryReport {
    /// `(section, option)` values copied into the template.
    pub copied: Vec<(String, String)>,
    /// Supplemental or hidden parameters re-added to the parameters section.
    pub reinserted: Vec<String>,
    /// Existing options with no place in the template.
    pub dropped: Vec<(String, String)>,
    /// The existing excluded block replaced the template's.
    pub excluded_preserved: bool,
}

impl CarryReport {
    pub fn is_lossless(&self) -> bool {
        self.dropped.is_empty()
    }
}

fn unique_sections(doc: &Document, scope: Scope) -> Vec<String> {
    let mut seen = BTreeSet::new();
    doc.sections(scope)
        .into_iter()
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// Copy values from `existing` into `template`.
///
/// Every included template option that `existing` also defines takes the
/// existing value, except `gcode*` options and the version stamp which
/// always come from the template. Supplemental and hidden parameters set in `existing`'s
/// `parameters_section` are added back. When both documents have an excluded
/// block, the existing one replaces the template's; otherwise the existing
/// excluded options are reported as dropped.
pub fn carry_over(
    template: &mut Document,
    existing: &Document,
    parameters_section: &str,
) -> Result<CarryReport, AppError> {
    let mut report = CarryReport::default();
    let mut used: BTreeSet<(String, String)> = BTreeSet::new();

    for section in unique_sections(template, Scope::Included) {
        let options: Vec<String> = template.options(&section).into_iter().map(str::to_string).collect();
        for option in options {
            let Some(value) = existing.get(&section, &option) else {
                continue;
            };
            used.insert((section.clone(), option.to_ascii_lowercase()));
            if option.starts_with("gcode") || (section == parameters_section && option == VERSION_OPTION) {
                continue;
            }
            let value = value.to_string();
            template.set(&section, &option, &value)?;
            report.copied.push((section.clone(), option));
        }
    }

    if template.has_section(parameters_section) {
        for param in SUPPLEMENTAL_PARAMS.iter().chain(HIDDEN_PARAMS) {
            if template.has_option(parameters_section, param) {
                continue;
            }
            if template.copy_option(existing, parameters_section, param)? {
                debug!(option = param, "reinserting supplemental option");
                used.insert((parameters_section.to_string(), param.to_string()));
                report.reinserted.push(param.to_string());
            }
        }
    }

    if existing.has_excluded() && template.has_excluded() {
        info!("preserving existing excluded config sections");
        template.delete_excluded();
        report.excluded_preserved = template.copy_excluded_from(existing);
    } else if existing.has_excluded() {
        warn!("template has no excluded block, existing excluded sections are dropped");
    }

    let scope = if report.excluded_preserved { Scope::Included } else { Scope::All };
    for section in unique_sections(existing, scope) {
        for option in existing.options(&section) {
            if !used.contains(&(section.clone(), option.to_ascii_lowercase())) {
                report.dropped.push((section.clone(), option.to_string()));
            }
        }
    }

    info!(
        copied = report.copied.len(),
        reinserted = report.reinserted.len(),
        dropped = report.dropped.len(),
        "carried over existing config"
    );
    Ok(report)
}

/// Result of [`build`].
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub document: Document,
    /// Version stamp found in the existing config.
    pub existing_version: Option<VersionStamp>,
    /// Upgrade steps applied to the existing config, by target version.
    pub upgraded: Vec<HhVersion>,
    pub report: Option<CarryReport>,
    /// Template placeholders left without a value.
    pub unresolved: Vec<String>,
}

/// Build a parameters file for `version` from the `template` text.
///
/// The template's `{happy_hare_version}` is rendered. When `existing` is
/// given it is first upgraded from its own stamp to `version`, then its
/// settings are carried into the template.
pub fn build(
    template: &str,
    existing: Option<&str>,
    version: HhVersion,
    parameters_section: &str,
) -> Result<BuildOutput, AppError> {
    let mut document = Document::parse(template)?;
    let values = BTreeMap::from([(VERSION_OPTION.to_string(), version.to_string())]);
    let unresolved = document.render_placeholders(&values);
    for name in &unresolved {
        warn!(placeholder = %name, "template placeholder left unresolved");
    }

    let mut output = BuildOutput {
        document,
        existing_version: None,
        upgraded: Vec::new(),
        report: None,
        unresolved,
    };
    let Some(existing) = existing else {
        info!(%version, "fresh config built from template");
        return Ok(output);
    };

    let mut existing = Document::parse(existing)?;
    let stamp = VersionStamp::read(&existing)?;
    match (version::check(&stamp, version), stamp.version()) {
        (VersionStatus::Upgrade, Some(from)) => {
            output.upgraded = upgrade::upgrade(&mut existing, from, version)?;
        }
        (VersionStatus::Downgrade, Some(from)) => {
            warn!(%from, to = %version, "existing config is newer than the template");
        }
        (status, _) => debug!(%stamp, %status, "no upgrade needed"),
    }
    output.existing_version = Some(stamp);
    output.report = Some(carry_over(&mut output.document, &existing, parameters_section)?);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::EXCLUSION_MARKER;

    const TEMPLATE: &str = "\
[mmu]
happy_hare_version: {happy_hare_version}
gear_max_velocity: 300   # mm/s
log_level: 1
gcode_load_sequence: 0

[mmu_extra]
thing: 1
";

    #[test]
    fn copies_existing_values_and_keeps_comments() {
        let mut template = Document::parse(TEMPLATE).unwrap();
        let existing = Document::parse("[mmu]\ngear_max_velocity: 250\nlog_level: 3\n").unwrap();
        let report = carry_over(&mut template, &existing, "mmu").unwrap();

        assert_eq!(template.get("mmu", "gear_max_velocity"), Some("250"));
        assert!(template.to_string().contains("gear_max_velocity: 250   # mm/s\n"));
        assert_eq!(template.get("mmu", "log_level"), Some("3"));
        assert_eq!(report.copied.len(), 2);
        assert!(report.is_lossless());
    }

    #[test]
    fn gcode_options_come_from_template() {
        let mut template = Document::parse(TEMPLATE).unwrap();
        let existing = Document::parse("[mmu]\ngcode_load_sequence: 1\n").unwrap();
        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert_eq!(template.get("mmu", "gcode_load_sequence"), Some("0"));
        assert!(report.copied.is_empty());
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn reinserts_supplemental_and_hidden_params() {
        let mut template = Document::parse(TEMPLATE).unwrap();
        let existing =
            Document::parse("[mmu]\ngate_material: PLA, ABS\nerror_macro: MY_ERR\ncad_gate_width: 23\n").unwrap();
        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert_eq!(template.get("mmu", "gate_material"), Some("PLA, ABS"));
        assert_eq!(template.get("mmu", "error_macro"), Some("MY_ERR"));
        assert_eq!(
            report.reinserted,
            vec!["cad_gate_width", "gate_material", "error_macro"]
        );
        assert!(report.is_lossless());
    }

    #[test]
    fn reports_dropped_options() {
        let mut template = Document::parse(TEMPLATE).unwrap();
        let existing = Document::parse("[mmu]\nz_hop_height_error: 5\n\n[old_section]\nx: 1\n").unwrap();
        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert_eq!(
            report.dropped,
            vec![
                ("mmu".to_string(), "z_hop_height_error".to_string()),
                ("old_section".to_string(), "x".to_string()),
            ]
        );
        assert!(!template.has_option("mmu", "z_hop_height_error"));
    }

    #[test]
    fn existing_excluded_block_wins() {
        let template_text = format!("{TEMPLATE}\n{EXCLUSION_MARKER}\n[template_only]\na: 1\n");
        let existing_text = format!("[mmu]\nlog_level: 2\n\n{EXCLUSION_MARKER}\n[user_macro]\nb: 2\n");
        let mut template = Document::parse(&template_text).unwrap();
        let existing = Document::parse(&existing_text).unwrap();

        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert!(report.excluded_preserved);
        assert!(template.has_section("user_macro"));
        assert!(!template.has_section("template_only"));
        assert!(report.is_lossless());
    }

    #[test]
    fn excluded_sections_dropped_when_template_has_no_block() {
        let existing_text = format!("[mmu]\nlog_level: 2\n\n{EXCLUSION_MARKER}\n[user_macro]\nb: 2\n");
        let mut template = Document::parse(TEMPLATE).unwrap();
        let existing = Document::parse(&existing_text).unwrap();

        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert!(!report.excluded_preserved);
        assert!(!template.has_section("user_macro"));
        assert_eq!(report.dropped, vec![("user_macro".to_string(), "b".to_string())]);
        assert!(!report.is_lossless());
    }

    #[test]
    fn excluded_block_kept_when_existing_has_none() {
        let template_text = format!("{TEMPLATE}\n{EXCLUSION_MARKER}\n[template_only]\na: 1\n");
        let mut template = Document::parse(&template_text).unwrap();
        let existing = Document::parse("[mmu]\nlog_level: 2\n").unwrap();
        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert!(!report.excluded_preserved);
        assert!(template.has_section("template_only"));
    }

    #[test]
    fn existing_version_stamp_is_not_carried() {
        let mut template = Document::parse(TEMPLATE).unwrap();
        let existing = Document::parse("[mmu]\nhappy_hare_version: 3.10\n").unwrap();
        let report = carry_over(&mut template, &existing, "mmu").unwrap();
        assert_eq!(template.get("mmu", "happy_hare_version"), Some("{happy_hare_version}"));
        assert!(report.copied.is_empty());
        assert!(report.is_lossless());
    }

    #[test]
    fn build_without_existing_renders_version() {
        let out = build(TEMPLATE, None, HhVersion::new(3, 20), "mmu").unwrap();
        assert_eq!(out.document.get("mmu", "happy_hare_version"), Some("3.20"));
        assert!(out.report.is_none());
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn build_upgrades_existing_before_carrying() {
        let existing = "[mmu]\nhappy_hare_version: 3.00\nlog_level: 2\nhoming_extruder: 1\n";
        let out = build(TEMPLATE, Some(existing), HhVersion::new(3, 10), "mmu").unwrap();
        assert_eq!(out.existing_version, Some(VersionStamp::Version(HhVersion::new(3, 0))));
        assert_eq!(out.upgraded, vec![HhVersion::new(3, 10)]);
        assert_eq!(out.document.get("mmu", "happy_hare_version"), Some("3.10"));
        assert_eq!(out.document.get("mmu", "log_level"), Some("2"));
        let report = out.report.unwrap();
        assert_eq!(report.dropped, vec![("mmu_machine".to_string(), "homing_extruder".to_string())]);
    }

    #[test]
    fn build_leaves_newer_config_alone() {
        let existing = "[mmu]\nhappy_hare_version: 3.20\nlog_level: 4\n";
        let out = build(TEMPLATE, Some(existing), HhVersion::new(3, 10), "mmu").unwrap();
        assert!(out.upgraded.is_empty());
        assert_eq!(out.document.get("mmu", "happy_hare_version"), Some("3.10"));
        assert_eq!(out.document.get("mmu", "log_level"), Some("4"));
    }
}
