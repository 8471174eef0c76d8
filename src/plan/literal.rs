//! Safe decoder for Python/JSON literal syntax.
//!
//! Accepts strings (single, double or triple quoted, with escapes and
//! implicit concatenation), numbers, lists, tuples, dicts and the constants
//! `True`/`False`/`None` (plus their JSON spellings). Nothing is evaluated:
//! any other token is a decode error.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Nesting limit for containers.
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LiteralError {
    #[error("Unexpected end of input")]
    UnexpectedEnd,

    #[error("Unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("Unknown name {0:?}")]
    UnknownName(String),

    #[error("Invalid number {0:?}")]
    InvalidNumber(String),

    #[error("Invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("Unsupported mapping key at offset {0}")]
    UnsupportedKey(usize),

    #[error("Nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("Trailing input at offset {0}")]
    TrailingInput(usize),
}

/// Decode a single literal spanning the whole input.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser {
        src: text,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < text.len() {
        return Err(LiteralError::TrailingInput(parser.pos));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl LiteralParser<'_> {
    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn unexpected(&self, found: char) -> LiteralError {
        LiteralError::Unexpected {
            found,
            offset: self.pos,
        }
    }

    fn enter(&mut self) -> Result<(), LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            None => Err(LiteralError::UnexpectedEnd),
            Some('[') => self.sequence(']'),
            Some('(') => self.sequence(')'),
            Some('{') => self.mapping(),
            Some('\'' | '"') => self.strings(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.name(),
            Some(c) => Err(self.unexpected(c)),
        }
    }

    /// List or tuple. `(x)` without a comma is just `x`.
    fn sequence(&mut self, close: char) -> Result<Value, LiteralError> {
        self.enter()?;
        self.bump();

        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                break;
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    saw_comma = true;
                }
                Some(c) if c == close => {
                    self.bump();
                    break;
                }
                Some(c) => return Err(self.unexpected(c)),
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
        self.depth -= 1;

        if close == ')' && items.len() == 1 && !saw_comma {
            return Ok(items.pop().unwrap_or(Value::Null));
        }
        Ok(Value::Array(items))
    }

    fn mapping(&mut self) -> Result<Value, LiteralError> {
        self.enter()?;
        self.bump();

        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let key_offset = self.pos;
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "True".to_string(),
                Value::Bool(false) => "False".to_string(),
                Value::Null => "None".to_string(),
                _ => return Err(LiteralError::UnsupportedKey(key_offset)),
            };
            self.skip_ws();
            match self.bump() {
                Some(':') => {}
                Some(c) => return Err(self.unexpected(c)),
                None => return Err(LiteralError::UnexpectedEnd),
            }
            let value = self.value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    break;
                }
                Some(c) => return Err(self.unexpected(c)),
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
        self.depth -= 1;
        Ok(Value::Object(map))
    }

    /// One or more adjacent string literals, concatenated.
    fn strings(&mut self) -> Result<Value, LiteralError> {
        let mut out = self.string()?;
        loop {
            let before = self.pos;
            self.skip_ws();
            if matches!(self.peek(), Some('\'' | '"')) {
                out.push_str(&self.string()?);
            } else {
                self.pos = before;
                break;
            }
        }
        Ok(Value::String(out))
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let doubled: String = [quote, quote].iter().collect();
        let triple = self.rest().starts_with(&doubled);
        if triple {
            self.pos += doubled.len();
        }

        let mut out = String::new();
        loop {
            let c = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
            match c {
                '\\' => self.escape(&mut out)?,
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.rest().starts_with(&doubled) {
                        self.pos += doubled.len();
                        break;
                    }
                    out.push(c);
                }
                '\n' if !triple => return Err(LiteralError::Unexpected {
                    found: '\n',
                    offset: self.pos - 1,
                }),
                c => out.push(c),
            }
        }
        Ok(out)
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let offset = self.pos - 1;
        let c = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\\' | '\'' | '"' | '/' => out.push(c),
            '\n' => {}
            'x' => out.push(self.hex_char(2, offset)?),
            'u' => out.push(self.hex_char(4, offset)?),
            'U' => out.push(self.hex_char(8, offset)?),
            // Unknown escapes keep the backslash.
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_char(&mut self, digits: usize, offset: usize) -> Result<char, LiteralError> {
        let hex = self
            .rest()
            .get(..digits)
            .ok_or(LiteralError::InvalidEscape(offset))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| LiteralError::InvalidEscape(offset))?;
        self.pos += digits;
        char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let mut prev = '\0';
        while let Some(c) = self.peek() {
            let sign_ok = matches!(c, '+' | '-') && (self.pos == start || matches!(prev, 'e' | 'E'));
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '_') || sign_ok {
                prev = c;
                self.bump();
            } else {
                break;
            }
        }

        let raw = &self.src[start..self.pos];
        let cleaned = raw.replace('_', "");
        let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

        if let Ok(int) = cleaned.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        cleaned
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError::InvalidNumber(raw.to_string()))
    }

    fn name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Err(LiteralError::UnknownName(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn python_list_of_dicts() {
        let text = "[{'condition': 'Asthma', 'details': ['Use inhaler', \"Avoid smoke\"]}]";
        assert_eq!(
            parse_literal(text).unwrap(),
            json!([{"condition": "Asthma", "details": ["Use inhaler", "Avoid smoke"]}])
        );
    }

    #[test]
    fn json_syntax_accepted() {
        let text = r#"[{"condition": "Gout", "details": ["Hydrate"], "urgent": false, "note": null}]"#;
        assert_eq!(
            parse_literal(text).unwrap(),
            json!([{"condition": "Gout", "details": ["Hydrate"], "urgent": false, "note": null}])
        );
    }

    #[test]
    fn python_constants_and_numbers() {
        assert_eq!(
            parse_literal("[True, False, None, -3, 2.5, 1_000, +7]").unwrap(),
            json!([true, false, null, -3, 2.5, 1000, 7])
        );
    }

    #[test]
    fn tuples_and_parenthesized_values() {
        assert_eq!(parse_literal("('a', 'b')").unwrap(), json!(["a", "b"]));
        assert_eq!(parse_literal("('a',)").unwrap(), json!(["a"]));
        assert_eq!(parse_literal("('a')").unwrap(), json!("a"));
        assert_eq!(parse_literal("()").unwrap(), json!([]));
    }

    #[test]
    fn trailing_commas_allowed() {
        assert_eq!(
            parse_literal("[{'a': 1,},]").unwrap(),
            json!([{"a": 1}])
        );
    }

    #[test]
    fn escapes_and_concatenation() {
        assert_eq!(
            parse_literal(r"'it\'s' ' fine\n' '\x41\u00e9'").unwrap(),
            json!("it's fine\nAé")
        );
        assert_eq!(parse_literal(r"'C:\path'").unwrap(), json!("C:\\path"));
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        assert_eq!(
            parse_literal("'''line one\nit's two'''").unwrap(),
            json!("line one\nit's two")
        );
        assert_eq!(parse_literal("''").unwrap(), json!(""));
    }

    #[test]
    fn code_is_rejected() {
        assert!(matches!(
            parse_literal("__import__('os').system('ls')"),
            Err(LiteralError::UnknownName(_))
        ));
        assert!(parse_literal("[1 + 2]").is_err());
    }

    #[test]
    fn markdown_is_rejected() {
        assert!(parse_literal("**Hypertension:** * Reduce sodium").is_err());
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(matches!(
            parse_literal("[1] extra"),
            Err(LiteralError::TrailingInput(4))
        ));
    }

    #[test]
    fn unterminated_inputs_fail_cleanly() {
        for text in ["[", "{'a': ", "'open", "[1, 2", "{'a' 1}", "'a\nb'", "", "   "] {
            assert!(parse_literal(text).is_err(), "{text:?} should fail");
        }
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let text = format!("{}{}", "[".repeat(500), "]".repeat(500));
        assert_eq!(parse_literal(&text), Err(LiteralError::TooDeep));
    }

    #[test]
    fn non_string_keys_are_stringified() {
        assert_eq!(
            parse_literal("{1: 'one', None: 'none'}").unwrap(),
            json!({"1": "one", "None": "none"})
        );
        assert!(matches!(
            parse_literal("{[1]: 'x'}"),
            Err(LiteralError::UnsupportedKey(1))
        ));
    }
}
