//! Structured-command extraction from model output.
//!
//! The extractor never fails: a reply that yields nothing structured comes
//! back as plain text. Fenced segments (runs of backticks) are tried first
//! as keyword command blocks, then through lenient JSON repair; segments
//! that produced a record are rewritten into the canonical block form so
//! the history the model re-reads stays consistently formatted.

pub mod block;
pub mod lenient;
pub mod repair;

use palaver_core::{CommandName, CommandRecord};
use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

pub use block::{command_content, command_to_string, parse_command_block};
pub use repair::{fix_and_parse_json, Recovered};

/// A model reply after cleanup and command recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedResponse {
    /// The cleaned reply text, fenced segments rewritten canonically.
    pub message: String,
    /// Recovered commands, deduplicated, in order of appearance.
    pub records: Vec<CommandRecord>,
}

/// Clean a raw model reply and recover any commands it carries.
///
/// Cleanup folds `\r` to `\n`, strips leading `BotName:` echoes per line,
/// collapses runs of blank lines, and trims leading whitespace.
pub fn parse_response(bot_name: &str, raw: &str) -> ExtractedResponse {
    let mut message = cleanup(bot_name, raw);
    let mut records: Vec<CommandRecord> = Vec::new();

    if let Ok(fence) = Regex::new(r"`+([^`]+)`*") {
        let mut rewritten = String::with_capacity(message.len());
        let mut cursor = 0;
        for captures in fence.captures_iter(&message) {
            let (Some(whole), Some(segment)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            rewritten.push_str(&message[cursor..whole.start()]);
            match segment_record(segment.as_str()) {
                Some((rendition, record)) => {
                    debug!(command = %record.name, "recovered command");
                    rewritten.push_str(&rendition);
                    records.push(record);
                }
                None => rewritten.push_str(whole.as_str()),
            }
            cursor = whole.end();
        }
        rewritten.push_str(&message[cursor..]);
        message = rewritten;
    }

    dedup(&mut records);
    ExtractedResponse { message, records }
}

/// Try one fenced segment: keyword block first, lenient JSON second.
/// Returns the replacement text and the recovered record, or `None` to
/// leave the segment untouched.
fn segment_record(segment: &str) -> Option<(String, CommandRecord)> {
    if let Some(record) = block::parse_command_block(segment) {
        let rendition = block::command_to_string(&record);
        return Some((rendition, record));
    }

    let recovery = recover_json(segment);
    let record = recovery.record?;
    let mut pieces = recovery.notes;
    pieces.push(block::command_to_string(&record));
    Some((pieces.join("\n"), record))
}

struct JsonRecovery {
    /// `message` fields of the recovered objects, in order.
    notes: Vec<String>,
    /// The composite command: last non-nop, or the last candidate.
    record: Option<CommandRecord>,
}

fn recover_json(segment: &str) -> JsonRecovery {
    let values = match repair::fix_and_parse_json(segment) {
        Recovered::Text(_) => Vec::new(),
        Recovered::Value(Value::Array(items)) => items,
        Recovered::Value(value) => vec![value],
        Recovered::Values(values) => values,
    };

    let mut notes = Vec::new();
    let mut candidates: Vec<CommandRecord> = Vec::new();
    for value in &values {
        let Value::Object(map) = value else { continue };
        if let Some(message) = map.get("message") {
            let text = value_text(message);
            if !text.is_empty() {
                notes.push(text);
            }
        }
        let Some(name) = map
            .get("command")
            .and_then(Value::as_str)
            .and_then(CommandName::parse)
        else {
            continue;
        };
        let mut record = CommandRecord::new(name);
        for (key, val) in map {
            if key == "command" || key == "message" {
                continue;
            }
            record.set_arg(key.clone(), value_text(val));
        }
        candidates.push(record);
    }

    let record = candidates
        .iter()
        .rev()
        .find(|r| !r.name.is_nop())
        .or_else(|| candidates.last())
        .cloned();
    JsonRecovery { notes, record }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cleanup(bot_name: &str, raw: &str) -> String {
    let folded = raw.replace('\r', "\n");
    let echo = format!("{bot_name}:");
    let stripped: Vec<&str> = folded
        .split('\n')
        .map(|line| {
            let lead = line.trim_start();
            match lead.strip_prefix(echo.as_str()) {
                Some(rest) => rest.trim_start(),
                None => line,
            }
        })
        .collect();
    let mut text = stripped.join("\n");
    if let Ok(blank_runs) = Regex::new(r"(\s*\n){2,}") {
        text = blank_runs.replace_all(&text, "\n").into_owned();
    }
    text.trim_start().to_string()
}

fn dedup(records: &mut Vec<CommandRecord>) {
    let mut seen: Vec<CommandRecord> = Vec::new();
    records.retain(|record| {
        if seen.contains(record) {
            false
        } else {
            seen.push(record.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_and_blank_runs_are_cleaned() {
        let parsed = parse_response("Eve", "Eve: hello\n\n\n  Eve:  world\r\n");
        assert_eq!(parsed.message, "hello\nworld\n");
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn keyword_block_is_recovered_and_rewritten() {
        let parsed = parse_response("Eve", "On it.\n```store_memory\nthe sky is blue\n```done");
        assert_eq!(
            parsed.message,
            "On it.\n```store_memory\nthe sky is blue\n```\ndone"
        );
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, CommandName::StoreMemory);
        assert_eq!(parsed.records[0].data(), Some("the sky is blue"));
    }

    #[test]
    fn json_segment_becomes_a_record_with_its_note() {
        let parsed = parse_response(
            "Eve",
            "`{\"command\": \"python\", \"data\": \"print(1)\", \"message\": \"running it\"}`",
        );
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, CommandName::Python);
        assert_eq!(parsed.records[0].data(), Some("print(1)"));
        assert_eq!(parsed.message, "running it\n```python\nprint(1)\n```\n");
    }

    #[test]
    fn multiple_json_objects_merge_to_the_last_non_nop() {
        let parsed = parse_response(
            "Eve",
            "`{\"command\":\"nop\",\"message\":\"first\"} {\"command\":\"python\",\"data\":\"x()\",\"message\":\"second\"}`",
        );
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, CommandName::Python);
        assert_eq!(
            parsed.message,
            "first\nsecond\n```python\nx()\n```\n"
        );
    }

    #[test]
    fn plain_code_spans_are_left_untouched() {
        let raw = "see `let x = 1;` for details";
        let parsed = parse_response("Eve", raw);
        assert_eq!(parsed.message, raw);
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn unknown_command_names_are_not_records() {
        let raw = "`{\"command\": \"frobnicate\", \"data\": \"x\"}`";
        let parsed = parse_response("Eve", raw);
        assert_eq!(parsed.message, raw);
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn duplicate_records_are_deduplicated() {
        let parsed = parse_response("Eve", "```nop\n```\nagain:\n```nop\n```");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, CommandName::Nop);
    }

    #[test]
    fn exit_blocks_parse_like_any_other() {
        let parsed = parse_response("Eve", "goodbye\n```exit\nsee you\n```");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].name, CommandName::Exit);
        assert_eq!(parsed.records[0].data(), Some("see you"));
    }
}
