//! Textual repair of JSON-shaped model output.
//!
//! The repair path never fails: the worst outcome is the original text
//! handed back unchanged. Everything here works on the raw text — brace
//! counting does not understand string literals, which is the accepted
//! trade-off for surviving arbitrarily broken input.

use serde_json::Value;
use tracing::trace;

use super::lenient;

/// Outcome of a repair attempt over one text segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovered {
    /// No structure found; the original input, untouched.
    Text(String),
    /// A single structured value.
    Value(Value),
    /// Several top-level objects recovered from one segment.
    Values(Vec<Value>),
}

/// Recover structured data from a possibly damaged JSON segment.
///
/// Tabs are stripped, concatenated top-level objects are split onto their
/// own lines, the text is clipped to its outermost braces and the brace
/// counts balanced, then each line (or the whole) is parsed leniently.
/// Plain prose — including a parse that only yields a string — comes back
/// as [`Recovered::Text`] carrying the input verbatim.
pub fn fix_and_parse_json(input: &str) -> Recovered {
    let stripped = input.replace('\t', "");

    if !stripped.contains('{') || !stripped.contains('}') {
        return Recovered::Text(input.to_string());
    }

    let corrected = correct_json(&split_top_level(&stripped));

    let mut objects: Vec<Value> = Vec::new();
    let lines: Vec<&str> = corrected.split('\n').filter(|l| !l.is_empty()).collect();
    if lines.len() > 1 {
        let mut all_parsed = true;
        for line in &lines {
            match lenient::parse(correct_json(line).trim()) {
                Ok(Value::String(_)) => {}
                Ok(value) => objects.push(value),
                Err(error) => {
                    trace!(%error, line, "line failed lenient parse");
                    all_parsed = false;
                    break;
                }
            }
        }
        if all_parsed && objects.len() > 1 {
            return Recovered::Values(objects);
        }
    }

    match lenient::parse(&corrected) {
        Ok(Value::String(_)) => Recovered::Text(input.to_string()),
        Ok(value) => Recovered::Value(value),
        Err(_) if objects.len() > 1 => Recovered::Values(objects),
        Err(_) => Recovered::Text(input.to_string()),
    }
}

/// Break concatenated top-level objects onto separate lines.
///
/// Anything between two top-level objects that holds no opening brace
/// separates them: runs of whitespace, commas, and stray closers are
/// dropped, while prose keeps its own line. With fewer than two top-level
/// objects the text is left alone.
fn split_top_level(text: &str) -> String {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = idx;
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        runs.push((start, idx + 1));
                    }
                }
            }
            _ => {}
        }
    }
    if depth > 0 {
        // Unterminated object: extends to the end, balanced later.
        runs.push((start, text.len()));
    }
    if runs.len() < 2 {
        return text.to_string();
    }

    let mut lines: Vec<&str> = Vec::new();
    let mut cursor = 0usize;
    for &(s, e) in &runs {
        let gap = text[cursor..s].trim();
        if !gap_is_junk(gap) {
            lines.push(gap);
        }
        lines.push(&text[s..e]);
        cursor = e;
    }
    let tail = text[cursor..].trim();
    if !gap_is_junk(tail) {
        lines.push(tail);
    }
    lines.join("\n")
}

fn gap_is_junk(gap: &str) -> bool {
    gap.chars().all(|c| c.is_whitespace() || matches!(c, ',' | '}'))
}

/// Clip to the outermost structural characters, then balance the braces.
fn correct_json(text: &str) -> String {
    let start = match (text.find('{'), text.find('[')) {
        (Some(b), Some(k)) => Some(b.min(k)),
        (Some(b), None) => Some(b),
        (None, Some(k)) => Some(k),
        (None, None) => None,
    };
    let end = match (text.rfind('}'), text.rfind(']')) {
        (Some(b), Some(k)) => Some(b.max(k)),
        (Some(b), None) => Some(b),
        (None, Some(k)) => Some(k),
        (None, None) => None,
    };
    let clipped = match (start, end) {
        (Some(s), Some(e)) if s <= e => &text[s..=e],
        (Some(_), Some(_)) => "",
        _ => text,
    };
    balance_braces(clipped)
}

/// Append missing closers, or chop trailing characters until the counts
/// agree.
fn balance_braces(text: &str) -> String {
    let mut out = text.to_string();
    let opens = out.matches('{').count();
    let mut closes = out.matches('}').count();
    while opens > closes {
        out.push('}');
        closes += 1;
    }
    while closes > opens && !out.is_empty() {
        out.pop();
        closes -= 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_object_parses_directly() {
        let text = r#"{"name": "Hons", "age": 40, "gender": "AI"}"#;
        let strict: Value = serde_json::from_str(text).unwrap();
        assert_eq!(fix_and_parse_json(text), Recovered::Value(strict));
    }

    #[test]
    fn nested_object_with_trailing_commas() {
        let text = r#"{"name": "Hons", "info": {"age": 40, "gender": "AI",}, }"#;
        assert_eq!(
            fix_and_parse_json(text),
            Recovered::Value(json!({"name": "Hons", "info": {"age": 40, "gender": "AI"}}))
        );
    }

    #[test]
    fn plain_text_is_returned_unchanged() {
        assert_eq!(
            fix_and_parse_json("This is just text."),
            Recovered::Text("This is just text.".into())
        );
    }

    #[test]
    fn prose_separated_objects_become_an_array() {
        let text = r#"a{"name":"Hons"} mid {"name":"Eve"} b"#;
        assert_eq!(
            fix_and_parse_json(text),
            Recovered::Values(vec![json!({"name": "Hons"}), json!({"name": "Eve"})])
        );
    }

    #[test]
    fn back_to_back_objects_become_an_array() {
        assert_eq!(
            fix_and_parse_json(r#"{"a":1},{"b":2}"#),
            Recovered::Values(vec![json!({"a": 1}), json!({"b": 2})])
        );
        assert_eq!(
            fix_and_parse_json(r#"{"a":1}} {"b":2}"#),
            Recovered::Values(vec![json!({"a": 1}), json!({"b": 2})])
        );
    }

    #[test]
    fn stray_braces_are_balanced() {
        assert_eq!(
            fix_and_parse_json(r#"{"a": 1}}"#),
            Recovered::Value(json!({"a": 1}))
        );
        assert_eq!(
            fix_and_parse_json(r#"{"a": {"b": 1}"#),
            Recovered::Value(json!({"a": {"b": 1}}))
        );
    }

    #[test]
    fn surrounding_prose_is_clipped_from_a_single_object() {
        assert_eq!(
            fix_and_parse_json(r#"Sure thing! {"a": 1} hope that helps"#),
            Recovered::Value(json!({"a": 1}))
        );
    }

    #[test]
    fn nested_objects_are_not_split() {
        let text = r#"{"a": {"b": 1}, "c": {"d": 2}}"#;
        let strict: Value = serde_json::from_str(text).unwrap();
        assert_eq!(fix_and_parse_json(text), Recovered::Value(strict));
    }

    #[test]
    fn unrecoverable_garbage_falls_back_to_text() {
        let text = "{:} {\"b\":2}";
        assert_eq!(fix_and_parse_json(text), Recovered::Text(text.into()));
    }

    #[test]
    fn no_braces_means_no_json() {
        let text = "all plain [1, 2] prose";
        assert_eq!(fix_and_parse_json(text), Recovered::Text(text.into()));
    }
}
