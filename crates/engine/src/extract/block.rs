//! Keyword command blocks.
//!
//! The preferred command shape is a fenced block opening with a registered
//! keyword, e.g.
//!
//! ```text
//! browse_website
//! url: https://example.com
//! question: what is on the page?
//! ```
//!
//! Parsing and rendering are inverses for well-formed records so the
//! extractor can rewrite whatever the model produced into this one canonical
//! form.

use palaver_core::{CommandName, CommandRecord};

/// Parse one fenced segment as a keyword command block.
///
/// Returns `None` when the segment is empty or does not open with a
/// registered keyword. A keyword alone yields an empty `data` argument.
/// `key: value` lines become named arguments, each value spanning until the
/// next key line; a "key" beginning with `http` is a bare URL, and from the
/// first line that is no key line at all the remainder is kept verbatim
/// under `data`.
pub fn parse_command_block(segment: &str) -> Option<CommandRecord> {
    let trimmed = segment.trim_start();
    let name_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let name = CommandName::parse(&trimmed[..name_end])?;
    let body = trimmed[name_end..].trim_start();

    let mut record = CommandRecord::new(name);
    if body.is_empty() {
        return Some(record.with_data(""));
    }

    let mut current: Option<(String, Vec<&str>)> = None;
    for (start, line) in lines_with_offsets(body) {
        match key_line(line) {
            Some((key, rest)) if !key.starts_with("http") => {
                if let Some((k, parts)) = current.take() {
                    record.set_arg(k, parts.join("\n").trim());
                }
                current = Some((key.to_string(), vec![rest]));
            }
            Some(_) => {
                // A leading `http...:` is a URL, not an argument name.
                if let Some((k, parts)) = current.take() {
                    record.set_arg(k, parts.join("\n").trim());
                }
                record.set_arg("data", body[start..].trim_end());
                return Some(record);
            }
            None => match current.as_mut() {
                Some((_, parts)) => parts.push(line),
                None => {
                    // Not argument-shaped: the whole body is data.
                    record.set_arg("data", body[start..].trim_end());
                    return Some(record);
                }
            },
        }
    }
    if let Some((k, parts)) = current.take() {
        record.set_arg(k, parts.join("\n").trim());
    }
    Some(record)
}

/// Render a record as its canonical fenced block.
pub fn command_to_string(record: &CommandRecord) -> String {
    let mut content = vec![format!("```{}", record.name)];
    content.extend(argument_lines(record));
    content.push("```\n".to_string());
    content.join("\n")
}

/// The block content without fences, as stored in memory or executed.
pub fn command_content(record: &CommandRecord) -> String {
    argument_lines(record).join("\n")
}

fn argument_lines(record: &CommandRecord) -> Vec<String> {
    let named = record.args().len() > 1;
    record
        .args()
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| {
            if named {
                format!("{key}: {value}")
            } else {
                value.clone()
            }
        })
        .collect()
}

fn lines_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut start = 0;
    while let Some(pos) = text[start..].find('\n') {
        lines.push((start, &text[start..start + pos]));
        start += pos + 1;
    }
    lines.push((start, &text[start..]));
    lines
}

/// `<ident> :` with optional surrounding whitespace opens an argument line.
fn key_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let key_end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(trimmed.len());
    let key = &trimmed[..key_end];
    if key.is_empty() {
        return None;
    }
    let rest = trimmed[key_end..].trim_start().strip_prefix(':')?;
    Some((key, rest))
}
