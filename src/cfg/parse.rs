//! Line-oriented parser producing a [`Document`].
//!
//! Rules, in the order they are checked for each line:
//!
//! 1. A blank line is kept and ends any multi-line value.
//! 2. An indented line continues the open option. Comment-only continuation
//!    lines are kept for layout but add nothing to the value (except for
//!    `gcode*` options, which keep everything).
//! 3. A column-0 `#`/`;` line is a comment; the first one starting with
//!    [`EXCLUSION_MARKER`] opens the excluded block, which runs to end of file.
//! 4. `[name]` starts a section.
//! 5. Anything else is `name: value` or `name = value`, split on the first
//!    `:` or `=`. An inline comment starts at a `#`/`;` preceded by whitespace.

use std::str::FromStr;

use crate::error::AppError;

use super::document::{Document, EXCLUSION_MARKER, Item, OptionEntry, Section, is_gcode_option};

impl Document {
    /// Parse `.cfg` text. Duplicate options are accepted here; see
    /// [`Document::check_unique`].
    pub fn parse(text: &str) -> Result<Document, AppError> {
        let mut doc = Document::new();
        let mut option_open = false;

        for (idx, raw) in text.split_inclusive('\n').enumerate() {
            let lineno = idx + 1;
            let content = raw.trim_end_matches(['\n', '\r']);
            let trimmed = content.trim();

            if trimmed.is_empty() {
                option_open = false;
                doc.push_line(raw);
                continue;
            }

            if content.starts_with([' ', '\t']) {
                if option_open {
                    if let Some(opt) = doc.last_option_mut() {
                        continue_option(opt, raw, trimmed);
                        continue;
                    }
                }
                if is_comment(trimmed) {
                    doc.push_line(raw);
                    continue;
                }
                return Err(AppError::parse(
                    lineno,
                    "indented line does not continue an option",
                ));
            }

            option_open = false;

            if is_comment(content) {
                if doc.exclusion.is_none() && content.starts_with(EXCLUSION_MARKER) {
                    doc.exclusion = Some(vec![raw.to_string()]);
                } else {
                    doc.push_line(raw);
                }
                continue;
            }

            if content.starts_with('[') {
                let section = parse_header(raw, content, lineno, doc.exclusion.is_some())?;
                doc.sections.push(section);
                continue;
            }

            let entry = parse_option_line(raw, content, lineno)?;
            let in_section = doc
                .sections
                .last()
                .is_some_and(|s| s.excluded == doc.exclusion.is_some());
            if !in_section {
                return Err(AppError::parse(
                    lineno,
                    format!("option '{}' outside of a section", entry.name),
                ));
            }
            if let Some(section) = doc.sections.last_mut() {
                section.items.push(Item::Option(entry));
                option_open = true;
            }
        }

        Ok(doc)
    }

    /// Append a comment or blank line wherever parsing currently is.
    fn push_line(&mut self, raw: &str) {
        let line = raw.to_string();
        let in_excluded_section = self.sections.last().is_some_and(|s| s.excluded);
        if let Some(lines) = self.exclusion.as_mut() {
            if !in_excluded_section {
                lines.push(line);
                return;
            }
        }
        match self.sections.last_mut() {
            Some(section) => section.items.push(Item::Line(line)),
            None => self.head.push(Item::Line(line)),
        }
    }

    fn last_option_mut(&mut self) -> Option<&mut OptionEntry> {
        match self.sections.last_mut()?.items.last_mut()? {
            Item::Option(opt) => Some(opt),
            Item::Line(_) => None,
        }
    }
}

impl FromStr for Document {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Document::parse(s)
    }
}

pub(crate) fn is_comment(text: &str) -> bool {
    text.starts_with(['#', ';'])
}

/// Byte offset of an inline comment: `#` or `;` preceded by whitespace.
/// `after_ws` says whether the text itself follows whitespace.
pub(crate) fn comment_start(text: &str, after_ws: bool) -> Option<usize> {
    let mut prev_ws = after_ws;
    for (i, c) in text.char_indices() {
        if matches!(c, '#' | ';') && prev_ws {
            return Some(i);
        }
        prev_ws = c.is_whitespace();
    }
    None
}

/// Value contribution of a trimmed continuation line, if any.
pub(crate) fn continuation_value(trimmed: &str, gcode: bool) -> Option<&str> {
    if gcode {
        return Some(trimmed);
    }
    if is_comment(trimmed) {
        return None;
    }
    let end = comment_start(trimmed, false).unwrap_or(trimmed.len());
    Some(trimmed[..end].trim_end())
}

fn continue_option(opt: &mut OptionEntry, raw: &str, trimmed: &str) {
    opt.continuation.push(raw.to_string());
    if let Some(part) = continuation_value(trimmed, opt.is_gcode()) {
        opt.value.push('\n');
        opt.value.push_str(part);
    }
}

fn parse_header(raw: &str, content: &str, lineno: usize, excluded: bool) -> Result<Section, AppError> {
    let close = content
        .find(']')
        .ok_or_else(|| AppError::parse(lineno, "section header is missing ']'"))?;
    let name = content[1..close].trim();
    if name.is_empty() {
        return Err(AppError::parse(lineno, "empty section name"));
    }
    let after = content[close + 1..].trim();
    if !after.is_empty() && !is_comment(after) {
        return Err(AppError::parse(
            lineno,
            format!("unexpected text after section header: '{after}'"),
        ));
    }
    Ok(Section {
        name: name.to_string(),
        header: raw.to_string(),
        items: Vec::new(),
        excluded,
    })
}

fn parse_option_line(raw: &str, content: &str, lineno: usize) -> Result<OptionEntry, AppError> {
    let sep = content.find([':', '=']).ok_or_else(|| {
        AppError::parse(lineno, format!("expected ':' or '=' in '{content}'"))
    })?;
    let name = content[..sep].trim();
    if name.is_empty() {
        return Err(AppError::parse(lineno, "option name is empty"));
    }

    let rest = &content[sep + 1..];
    let body = rest.trim_start();
    let value_start = sep + 1 + (rest.len() - body.len());
    let value_part = if is_gcode_option(name) {
        body
    } else {
        let end = comment_start(body, value_start > sep + 1).unwrap_or(body.len());
        &body[..end]
    };
    let value = value_part.trim_end();

    Ok(OptionEntry {
        name: name.to_string(),
        value: value.to_string(),
        prefix: raw[..value_start].to_string(),
        suffix: raw[value_start + value.len()..].to_string(),
        continuation: Vec::new(),
        line: lineno,
    })
}
