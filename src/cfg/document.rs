//! Layout-preserving document tree for Klipper-style `.cfg` files.
//!
//! A [`Document`] keeps every input line, so `to_string()` reproduces the
//! parsed text byte for byte. Comments and blank lines are stored as opaque
//! [`Item::Line`]s; options keep their raw lines next to the parsed value.
//!
//! Sections after the `# EXCLUDE FROM CONFIG BUILDER` marker are *excluded*:
//! they belong to the user and are never rewritten by the config builder.

use std::fmt;

/// Comment line that starts the user-owned block at the end of a file.
pub const EXCLUSION_MARKER: &str = "# EXCLUDE FROM CONFIG BUILDER";

/// Which sections an iteration covers, relative to the exclusion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Included,
    Excluded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Comment, blank or decorative line, kept verbatim (with its line ending).
    Line(String),
    Option(OptionEntry),
}

/// One `name: value` option and the raw lines it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry {
    pub(crate) name: String,
    pub(crate) value: String,
    /// `name`, separator and the whitespace before the value, e.g. `"gear_max_velocity: "`.
    pub(crate) prefix: String,
    /// Whitespace and inline comment after the value, plus the line ending.
    pub(crate) suffix: String,
    /// Indented lines after the first, verbatim.
    pub(crate) continuation: Vec<String>,
    /// 1-based source line, 0 when created by an edit.
    pub(crate) line: usize,
}

impl OptionEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value with inline comments removed; continuation lines are joined
    /// with `\n`.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// `gcode*` options keep their value verbatim.
    pub fn is_gcode(&self) -> bool {
        is_gcode_option(&self.name)
    }

    /// Inline comment on the first line, without the leading whitespace.
    pub fn comment(&self) -> Option<&str> {
        let trimmed = self.suffix.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    pub(crate) fn write_to(&self, out: &mut String) {
        out.push_str(&self.prefix);
        out.push_str(self.first_line_value());
        out.push_str(&self.suffix);
        for line in &self.continuation {
            out.push_str(line);
        }
    }

    /// The part of `value` that sits on the option line itself.
    pub(crate) fn first_line_value(&self) -> &str {
        self.value.split('\n').next().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub(crate) name: String,
    /// Raw header line, e.g. `"[mmu]\n"`.
    pub(crate) header: String,
    pub(crate) items: Vec<Item>,
    pub(crate) excluded: bool,
}

impl Section {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn options(&self) -> impl Iterator<Item = &OptionEntry> {
        self.items.iter().filter_map(|item| match item {
            Item::Option(opt) => Some(opt),
            Item::Line(_) => None,
        })
    }

    pub fn option(&self, name: &str) -> Option<&OptionEntry> {
        self.options().find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn option_mut(&mut self, name: &str) -> Option<&mut OptionEntry> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Option(opt) if opt.name.eq_ignore_ascii_case(name) => Some(opt),
            _ => None,
        })
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.header);
        for item in &self.items {
            match item {
                Item::Line(line) => out.push_str(line),
                Item::Option(opt) => opt.write_to(out),
            }
        }
    }
}

/// Duplicate option found by [`Document::duplicates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub section: String,
    pub option: String,
    /// Source lines of every occurrence.
    pub lines: Vec<usize>,
}

/// Parsed `.cfg` file.
///
/// Excluded sections always sit after the included ones, preceded by the
/// marker line and anything between it and the first excluded section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Lines before the first section (comments and blanks only).
    pub(crate) head: Vec<Item>,
    pub(crate) sections: Vec<Section>,
    /// Marker line and following lines up to the first excluded section.
    pub(crate) exclusion: Option<Vec<String>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Section names in file order. Repeated headers are listed once per header.
    pub fn sections(&self, scope: Scope) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| match scope {
                Scope::All => true,
                Scope::Included => !s.excluded,
                Scope::Excluded => s.excluded,
            })
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// First section with this name, in any scope.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub(crate) fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// Option names of the first section called `name`; empty if there is none.
    pub fn options(&self, section: &str) -> Vec<&str> {
        self.section(section)
            .map(|s| s.options().map(|o| o.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn has_option(&self, section: &str, option: &str) -> bool {
        self.option(section, option).is_some()
    }

    pub fn option(&self, section: &str, option: &str) -> Option<&OptionEntry> {
        self.section(section)?.option(option)
    }

    /// Value of an option, `None` if the section or option is missing.
    /// An option with an empty value is reported as `Some("")`.
    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.option(section, option).map(|o| o.value.as_str())
    }

    /// `(name, value)` pairs of the first section called `section`.
    pub fn items(&self, section: &str) -> Vec<(&str, &str)> {
        self.section(section)
            .map(|s| {
                s.options()
                    .map(|o| (o.name.as_str(), o.value.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every `(section, option, value)` in file order, across all scopes.
    pub fn entries(&self) -> Vec<(String, String, String)> {
        let mut out = Vec::new();
        for section in &self.sections {
            for opt in section.options() {
                out.push((section.name.clone(), opt.name.clone(), opt.value.clone()));
            }
        }
        out
    }

    /// Options that occur more than once in a section. Repeated section
    /// headers are merged before checking, as Klipper does.
    pub fn duplicates(&self) -> Vec<Duplicate> {
        let mut seen: Vec<Duplicate> = Vec::new();
        for section in &self.sections {
            for opt in section.options() {
                match seen.iter_mut().find(|d| {
                    d.section == section.name && d.option.eq_ignore_ascii_case(&opt.name)
                }) {
                    Some(d) => d.lines.push(opt.line),
                    None => seen.push(Duplicate {
                        section: section.name.clone(),
                        option: opt.name.clone(),
                        lines: vec![opt.line],
                    }),
                }
            }
        }
        seen.retain(|d| d.lines.len() > 1);
        seen
    }

    pub fn has_excluded(&self) -> bool {
        self.exclusion.is_some()
    }

    /// Text of the excluded block from the marker line to the end of file.
    pub fn excluded_block(&self) -> Option<String> {
        let lines = self.exclusion.as_ref()?;
        let mut out = String::new();
        for line in lines {
            out.push_str(line);
        }
        for section in self.sections.iter().filter(|s| s.excluded) {
            section.write_to(&mut out);
        }
        Some(out)
    }

    /// Only sections and options, each as `name: value`. Comments, blank
    /// lines and layout are dropped; the excluded block keeps its marker.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        let mut marker_written = false;
        for section in &self.sections {
            if section.excluded && !marker_written {
                out.push_str(EXCLUSION_MARKER);
                out.push('\n');
                marker_written = true;
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for opt in section.options() {
                out.push_str(&canonical_option(&opt.name, &opt.value));
            }
            out.push('\n');
        }
        if self.exclusion.is_some() && !marker_written {
            out.push_str(EXCLUSION_MARKER);
            out.push('\n');
        }
        out
    }
}

/// Byte-exact serialisation of the document.
impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for item in &self.head {
            if let Item::Line(line) = item {
                out.push_str(line);
            }
        }
        for section in self.sections.iter().filter(|s| !s.excluded) {
            section.write_to(&mut out);
        }
        if let Some(block) = self.excluded_block() {
            out.push_str(&block);
        }
        f.write_str(&out)
    }
}

pub(crate) fn is_gcode_option(name: &str) -> bool {
    name.starts_with("gcode")
}

/// `name: value` lines; continuation lines indented four spaces.
pub(crate) fn canonical_option(name: &str, value: &str) -> String {
    let mut lines = value.split('\n');
    let first = lines.next().unwrap_or("");
    let mut out = if first.is_empty() {
        format!("{name}:\n")
    } else if first.starts_with(['#', ';']) {
        format!("{name}:{first}\n")
    } else {
        format!("{name}: {first}\n")
    };
    for line in lines {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out
}
