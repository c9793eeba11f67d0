//! Queries and mutations on a parsed [`Document`].
//!
//! Edits touch as little layout as possible: `set` rewrites only the value
//! between an option's name and its inline comment, renames rewrite only the
//! name. Lookups target the first section with a matching name.

use std::collections::BTreeMap;

use crate::error::AppError;

use super::document::{Document, Duplicate, Item, OptionEntry, Section, is_gcode_option};
use super::parse::{comment_start, continuation_value, is_comment};

impl Document {
    /// Integer value, `None` when missing or empty.
    pub fn get_int(&self, section: &str, option: &str) -> Result<Option<i64>, AppError> {
        match self.get(section, option).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| {
                AppError::option(section, option, format!("expected an integer, got '{v}'"))
            }),
        }
    }

    /// Float value, `None` when missing or empty.
    pub fn get_float(&self, section: &str, option: &str) -> Result<Option<f64>, AppError> {
        match self.get(section, option).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| {
                AppError::option(section, option, format!("expected a number, got '{v}'"))
            }),
        }
    }

    /// `1`, `true`, `yes` and `on` are true; anything else non-empty is false.
    pub fn get_bool(&self, section: &str, option: &str) -> Option<bool> {
        match self.get(section, option).map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(matches!(
                v.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )),
        }
    }

    /// Fails on the first option that occurs twice in a section.
    pub fn check_unique(&self) -> Result<(), AppError> {
        match self.duplicates().into_iter().next() {
            None => Ok(()),
            Some(dup) => Err(duplicate_error(&dup)),
        }
    }

    /// [`Document::check_unique`] limited to one section name.
    pub fn check_unique_in(&self, section: &str) -> Result<(), AppError> {
        match self.duplicates().into_iter().find(|d| d.section == section) {
            None => Ok(()),
            Some(dup) => Err(duplicate_error(&dup)),
        }
    }

    /// Set an option, creating it after the section's last option if needed.
    /// An existing inline comment is kept. Lines after the first of a
    /// multi-line value are indented four spaces.
    /// A non-gcode value containing something that would parse as a comment
    /// is rejected.
    pub fn set(&mut self, section: &str, option: &str, value: &str) -> Result<(), AppError> {
        if !is_gcode_option(option) && value.lines().any(|l| comment_start(l.trim(), true).is_some()) {
            return Err(AppError::option(section, option, "value would be read back as a comment"));
        }
        let target = self
            .section_mut(section)
            .ok_or_else(|| AppError::option(section, option, "section not found"))?;

        if let Some(opt) = target.option_mut(option) {
            opt.replace_value(value);
            return Ok(());
        }

        let mut entry = OptionEntry {
            name: option.to_string(),
            value: String::new(),
            prefix: format!("{option}: "),
            suffix: "\n".to_string(),
            continuation: Vec::new(),
            line: 0,
        };
        entry.replace_value(value);

        let at = target
            .items
            .iter()
            .rposition(|item| matches!(item, Item::Option(_)))
            .map(|i| i + 1)
            .or_else(|| {
                target
                    .items
                    .iter()
                    .position(|item| matches!(item, Item::Line(l) if l.trim().is_empty()))
            })
            .unwrap_or(target.items.len());
        if at == 0 {
            terminate(&mut target.header);
        } else if let Some(prev) = target.items.get_mut(at - 1) {
            terminate_item(prev);
        }
        target.items.insert(at, Item::Option(entry));
        Ok(())
    }

    /// Remove every occurrence of an option from every section with this
    /// name. Returns whether anything was removed.
    pub fn remove_option(&mut self, section: &str, option: &str) -> bool {
        let mut removed = false;
        for s in self.sections.iter_mut().filter(|s| s.name == section) {
            let before = s.items.len();
            s.items.retain(|item| {
                !matches!(item, Item::Option(o) if o.name.eq_ignore_ascii_case(option))
            });
            removed |= s.items.len() != before;
        }
        removed
    }

    /// Rename an option in place, keeping its value and comment.
    pub fn rename_option(&mut self, section: &str, option: &str, new_name: &str) -> bool {
        let Some(opt) = self.section_mut(section).and_then(|s| s.option_mut(option)) else {
            return false;
        };
        let tail = opt.prefix[opt.name.len()..].to_string();
        opt.prefix = format!("{new_name}{tail}");
        opt.name = new_name.to_string();
        true
    }

    /// Move an option to another (existing) section, optionally renaming it.
    /// Returns `Ok(false)` when the option does not exist.
    pub fn move_option(
        &mut self,
        section: &str,
        option: &str,
        new_section: &str,
        new_name: Option<&str>,
    ) -> Result<bool, AppError> {
        let Some(value) = self.get(section, option).map(str::to_string) else {
            return Ok(false);
        };
        self.set(new_section, new_name.unwrap_or(option), &value)?;
        self.remove_option(section, option);
        Ok(true)
    }

    /// Copy one option's value from `other` into this document.
    pub fn copy_option(&mut self, other: &Document, section: &str, option: &str) -> Result<bool, AppError> {
        match other.get(section, option) {
            Some(value) => self.set(section, option, value).map(|_| true),
            None => Ok(false),
        }
    }

    /// Add an empty section at the end of the included part. Returns `false`
    /// if it already exists.
    pub fn add_section(&mut self, name: &str) -> bool {
        if self.has_section(name) {
            return false;
        }
        self.separate_included_tail();
        let at = self
            .sections
            .iter()
            .position(|s| s.excluded)
            .unwrap_or(self.sections.len());
        self.sections.insert(
            at,
            Section {
                name: name.to_string(),
                header: format!("[{name}]\n"),
                items: Vec::new(),
                excluded: false,
            },
        );
        true
    }

    /// Remove every section with this name.
    pub fn remove_section(&mut self, name: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != name);
        self.sections.len() != before
    }

    /// Rename every section with this name, keeping any header comment.
    pub fn rename_section(&mut self, name: &str, new_name: &str) -> bool {
        let mut renamed = false;
        for s in self.sections.iter_mut().filter(|s| s.name == name) {
            let tail = s.header.find(']').map(|i| &s.header[i + 1..]).unwrap_or("\n");
            s.header = format!("[{new_name}]{tail}");
            s.name = new_name.to_string();
            renamed = true;
        }
        renamed
    }

    /// `{name}` placeholders in option values, first occurrence order.
    /// Comments and `gcode*` values are not searched.
    pub fn placeholders(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for opt in self.sections.iter().flat_map(|s| s.options()) {
            if opt.is_gcode() {
                continue;
            }
            for name in find_placeholders(&opt.value) {
                if !out.iter().any(|n| n == name) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }

    /// Substitute known placeholders. Returns the names left unresolved.
    pub fn render_placeholders(&mut self, values: &BTreeMap<String, String>) -> Vec<String> {
        let mut unresolved: Vec<String> = Vec::new();
        for section in &mut self.sections {
            for item in &mut section.items {
                let Item::Option(opt) = item else { continue };
                if opt.is_gcode() {
                    continue;
                }
                let names: Vec<String> = find_placeholders(&opt.value)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    continue;
                }
                let mut value = opt.value.clone();
                for name in names {
                    match values.get(&name) {
                        Some(v) => value = value.replace(&format!("{{{name}}}"), v),
                        None if !unresolved.contains(&name) => unresolved.push(name),
                        None => {}
                    }
                }
                if value != opt.value {
                    opt.replace_value(&value);
                }
            }
        }
        unresolved.sort();
        unresolved
    }

    /// Drop the excluded block. Returns whether there was one.
    pub fn delete_excluded(&mut self) -> bool {
        self.sections.retain(|s| !s.excluded);
        self.exclusion.take().is_some()
    }

    /// Replace this document's excluded block with a copy of `other`'s.
    /// Returns `false`, leaving this document untouched, if `other` has none.
    pub fn copy_excluded_from(&mut self, other: &Document) -> bool {
        let Some(lines) = other.exclusion.clone() else {
            return false;
        };
        self.delete_excluded();
        self.separate_included_tail();
        self.exclusion = Some(lines);
        self.sections
            .extend(other.sections.iter().filter(|s| s.excluded).cloned());
        true
    }

    /// Make the included text end in a blank line so something can follow it.
    fn separate_included_tail(&mut self) {
        let mut text = String::new();
        for item in &self.head {
            if let Item::Line(line) = item {
                text.push_str(line);
            }
        }
        for s in self.sections.iter().filter(|s| !s.excluded) {
            text.push_str(&s.header);
            for item in &s.items {
                match item {
                    Item::Line(line) => text.push_str(line),
                    Item::Option(opt) => opt.write_to(&mut text),
                }
            }
        }
        if text.is_empty() || text.ends_with("\n\n") {
            return;
        }
        let filler = if text.ends_with('\n') { "\n" } else { "\n\n" };
        let line = Item::Line(filler.to_string());
        match self.sections.iter_mut().rev().find(|s| !s.excluded) {
            Some(s) => s.items.push(line),
            None => self.head.push(line),
        }
    }
}

fn duplicate_error(dup: &Duplicate) -> AppError {
    let lines: Vec<String> = dup.lines.iter().map(ToString::to_string).collect();
    AppError::option(
        &dup.section,
        &dup.option,
        format!("defined more than once (lines {})", lines.join(", ")),
    )
}

impl OptionEntry {
    /// Rewrite the value, keeping the name, separator and inline comment.
    /// Comment-only continuation lines survive unless the option is `gcode*`.
    pub(crate) fn replace_value(&mut self, value: &str) {
        let value = value.trim_end();
        let next_line_start = value.trim_start_matches([' ', '\t']).starts_with(['\n', '\r']);
        let mut lines = value.trim_start().lines().filter(|l| !l.trim().is_empty());
        let first = if next_line_start {
            ""
        } else {
            lines.next().unwrap_or("").trim()
        };

        let ending = if self.suffix.ends_with("\r\n") { "\r\n" } else { "\n" };
        let gcode = self.is_gcode();
        let kept: Vec<String> = if gcode {
            Vec::new()
        } else {
            self.continuation
                .drain(..)
                .filter(|l| is_comment(l.trim()))
                .collect()
        };

        if !first.is_empty() {
            if !self.prefix.ends_with([' ', '\t']) {
                self.prefix.push(' ');
            }
            if is_comment(&self.suffix) {
                self.suffix.insert(0, ' ');
            }
        }

        let mut joined = first.to_string();
        let mut continuation = Vec::new();
        for line in lines {
            let line = line.trim_end();
            let raw = if line.starts_with([' ', '\t']) {
                format!("{line}{ending}")
            } else {
                format!("    {line}{ending}")
            };
            if let Some(part) = continuation_value(line.trim(), gcode) {
                joined.push('\n');
                joined.push_str(part);
            }
            continuation.push(raw);
        }
        continuation.extend(kept);
        if !continuation.is_empty() && !self.suffix.ends_with('\n') {
            self.suffix.push_str(ending);
        }

        self.value = joined;
        self.continuation = continuation;
    }
}

/// `{identifier}` spans inside `text`.
fn find_placeholders(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                let valid = name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if valid {
                    out.push(name);
                    rest = &after[close + 1..];
                } else {
                    rest = after;
                }
            }
            None => break,
        }
    }
    out
}

fn terminate(line: &mut String) {
    if !line.ends_with('\n') {
        line.push('\n');
    }
}

fn terminate_item(item: &mut Item) {
    match item {
        Item::Line(line) => terminate(line),
        Item::Option(opt) => match opt.continuation.last_mut() {
            Some(last) => terminate(last),
            None => terminate(&mut opt.suffix),
        },
    }
}
