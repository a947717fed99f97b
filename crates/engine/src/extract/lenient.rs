//! Lenient JSON value parsing.
//!
//! Model output is JSON-shaped at best. This parser accepts the damage that
//! actually occurs in the wild: unquoted keys, single-quoted strings,
//! trailing commas, invalid escape sequences (kept verbatim) and unescaped
//! quotes inside strings. Text with no structural opener parses to a plain
//! string covering the whole input, which is how callers tell prose apart
//! from data. A structured value must consume the input exactly; trailing
//! garbage is an error so concatenated objects fail here and get handled by
//! the repair layer instead.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum LenientError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("trailing characters after value at offset {0}")]
    TrailingGarbage(usize),
}

/// Parse one value from the whole input.
pub fn parse(text: &str) -> Result<Value, LenientError> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    parser.skip_ws();
    match parser.peek() {
        None => Err(LenientError::UnexpectedEnd),
        Some('{' | '[' | '"' | '\'') => {
            let value = parser.value()?;
            parser.skip_ws();
            if parser.peek().is_some() {
                return Err(LenientError::TrailingGarbage(parser.pos));
            }
            Ok(value)
        }
        Some(_) => {
            // No structural opener: the whole text is one bare scalar.
            let rest: String = parser.chars[parser.pos..].iter().collect();
            Ok(interpret_scalar(rest.trim_end()))
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Next non-whitespace character at or after `from`, without advancing.
    fn peek_significant(&self, from: usize) -> Option<char> {
        self.chars[from..].iter().copied().find(|c| !c.is_whitespace())
    }

    fn value(&mut self) -> Result<Value, LenientError> {
        self.skip_ws();
        match self.peek() {
            None => Err(LenientError::UnexpectedEnd),
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some(q @ ('"' | '\'')) => Ok(Value::String(self.string(q)?)),
            Some(_) => Ok(self.bare_token()),
        }
    }

    fn object(&mut self) -> Result<Value, LenientError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(LenientError::UnexpectedEnd),
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                _ => {}
            }
            let key = self.key()?;
            self.skip_ws();
            match self.bump() {
                Some(':') => {}
                Some(c) => return Err(LenientError::UnexpectedChar(c, self.pos - 1)),
                None => return Err(LenientError::UnexpectedEnd),
            }
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(c) => return Err(LenientError::UnexpectedChar(c, self.pos - 1)),
                None => return Err(LenientError::UnexpectedEnd),
            }
        }
    }

    fn array(&mut self) -> Result<Value, LenientError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(LenientError::UnexpectedEnd),
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                Some(c) => return Err(LenientError::UnexpectedChar(c, self.pos - 1)),
                None => return Err(LenientError::UnexpectedEnd),
            }
        }
    }

    fn key(&mut self) -> Result<String, LenientError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => self.string(q),
            Some(c) if is_bare_key_char(c) => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if is_bare_key_char(c)) {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            Some(c) => Err(LenientError::UnexpectedChar(c, self.pos)),
            None => Err(LenientError::UnexpectedEnd),
        }
    }

    /// A quote only closes the string when the next significant character is
    /// structural; otherwise it is content that was never escaped.
    fn string(&mut self, quote: char) -> Result<String, LenientError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(LenientError::UnexpectedEnd),
                Some('\\') => self.escape(&mut out)?,
                Some(c) if c == quote => match self.peek_significant(self.pos) {
                    None | Some(',' | ':' | '}' | ']') => return Ok(out),
                    _ => out.push(c),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LenientError> {
        match self.bump() {
            None => Err(LenientError::UnexpectedEnd),
            Some('n') => {
                out.push('\n');
                Ok(())
            }
            Some('t') => {
                out.push('\t');
                Ok(())
            }
            Some('r') => {
                out.push('\r');
                Ok(())
            }
            Some('b') => {
                out.push('\u{0008}');
                Ok(())
            }
            Some('f') => {
                out.push('\u{000C}');
                Ok(())
            }
            Some(c @ ('"' | '\'' | '\\' | '/')) => {
                out.push(c);
                Ok(())
            }
            Some('u') => {
                let mut code = 0u32;
                let mut digits = 0;
                while digits < 4 {
                    match self.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            code = code * 16 + d;
                            self.pos += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 4 {
                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                } else {
                    // Incomplete escape: keep it verbatim.
                    out.push('\\');
                    out.push('u');
                    for c in &self.chars[self.pos - digits..self.pos] {
                        out.push(*c);
                    }
                }
                Ok(())
            }
            Some(c) => {
                // Invalid escape: keep the backslash and the character.
                out.push('\\');
                out.push(c);
                Ok(())
            }
        }
    }

    fn bare_token(&mut self) -> Value {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if !matches!(c, ',' | '}' | ']')) {
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        interpret_scalar(token.trim())
    }
}

fn is_bare_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '$')
}

fn interpret_scalar(token: &str) -> Value {
    match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = token.parse::<i64>() {
                return Value::Number(n.into());
            }
            if let Ok(f) = token.parse::<f64>() {
                if let Some(n) = Number::from_f64(f) {
                    return Value::Number(n);
                }
            }
            Value::String(token.to_string())
        }
    }
}
