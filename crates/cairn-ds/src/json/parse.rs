//! Recursive-descent JSON parser.

use super::{JsonError, JsonErrorKind, MAX_DEPTH, Value};
use crate::buf::Buf;
use crate::map::Map;
use crate::string::Str;

type ParseResult<T> = std::result::Result<T, JsonError>;

/// Parses a complete JSON document.
///
/// Every string, array and object of the result is allocated through the
/// current allocator.
///
/// # Errors
///
/// Returns the first syntax error with its line and column.
pub fn parse(input: &str) -> ParseResult<Value> {
    let mut parser = Parser::new(input);
    parser.skip_whitespace();
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if parser.peek().is_some() {
        return Err(parser.error(JsonErrorKind::TrailingCharacters));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn error(&self, kind: JsonErrorKind) -> JsonError {
        JsonError {
            kind,
            line: self.line,
            column: self.column,
        }
    }

    /// Error for the character at the cursor, or end of input.
    fn unexpected(&self) -> JsonError {
        match self.peek_char() {
            Some(ch) => self.error(JsonErrorKind::UnexpectedChar(ch)),
            None => self.error(JsonErrorKind::UnexpectedEof),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    /// Consumes one character.
    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> ParseResult<()> {
        if self.eat(byte) { Ok(()) } else { Err(self.unexpected()) }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.bump();
        }
    }

    fn parse_value(&mut self, depth: usize) -> ParseResult<Value> {
        match self.peek() {
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(b't') => self.parse_literal("true", Value::Bool(true)),
            Some(b'f') => self.parse_literal("false", Value::Bool(false)),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b'[') => self.parse_array(depth + 1),
            Some(b'{') => self.parse_object(depth + 1),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> ParseResult<Value> {
        for expected in word.bytes() {
            if !self.eat(expected) {
                return Err(self.unexpected());
            }
        }
        Ok(value)
    }

    fn parse_number(&mut self) -> ParseResult<Value> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let invalid = JsonError {
            kind: JsonErrorKind::InvalidNumber,
            line,
            column,
        };

        self.eat(b'-');
        match self.peek() {
            Some(b'0') => {
                self.bump();
            }
            Some(b'1'..=b'9') => self.digits(),
            _ => return Err(invalid),
        }
        if self.eat(b'.') {
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(invalid);
            }
            self.digits();
        }
        if self.eat(b'e') || self.eat(b'E') {
            if !self.eat(b'+') {
                self.eat(b'-');
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(invalid);
            }
            self.digits();
        }

        let number = self.src[start..self.pos].parse::<f64>().map_err(|_| invalid)?;
        if !number.is_finite() {
            return Err(JsonError {
                kind: JsonErrorKind::NumberOutOfRange,
                line,
                column,
            });
        }
        Ok(Value::Number(number))
    }

    fn digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
    }

    fn parse_string(&mut self) -> ParseResult<Str> {
        self.expect(b'"')?;
        let mut out = Str::new();
        let mut run = self.pos;

        loop {
            match self.peek() {
                None => return Err(self.error(JsonErrorKind::UnexpectedEof)),
                Some(b'"') => {
                    out.push_str(&self.src[run..self.pos]);
                    self.bump();
                    return Ok(out);
                }
                Some(b'\\') => {
                    out.push_str(&self.src[run..self.pos]);
                    self.bump();
                    let ch = self.parse_escape()?;
                    out.push(ch);
                    run = self.pos;
                }
                Some(byte) if byte < 0x20 => {
                    return Err(self.error(JsonErrorKind::ControlCharacter));
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Decodes the escape after a consumed backslash.
    fn parse_escape(&mut self) -> ParseResult<char> {
        let Some(ch) = self.bump() else {
            return Err(self.error(JsonErrorKind::UnexpectedEof));
        };
        Ok(match ch {
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => return self.parse_unicode_escape(),
            other => return Err(self.error(JsonErrorKind::InvalidEscape(other))),
        })
    }

    fn parse_unicode_escape(&mut self) -> ParseResult<char> {
        let first = self.hex4()?;
        let code = match first {
            0xD800..=0xDBFF => {
                if !(self.eat(b'\\') && self.eat(b'u')) {
                    return Err(self.error(JsonErrorKind::InvalidUnicode));
                }
                let second = self.hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(self.error(JsonErrorKind::InvalidUnicode));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(self.error(JsonErrorKind::InvalidUnicode)),
            code => code,
        };
        char::from_u32(code).ok_or_else(|| self.error(JsonErrorKind::InvalidUnicode))
    }

    fn hex4(&mut self) -> ParseResult<u32> {
        let mut code = 0;
        for _ in 0..4 {
            let digit = self
                .peek_char()
                .and_then(|ch| ch.to_digit(16))
                .ok_or_else(|| self.error(JsonErrorKind::InvalidUnicode))?;
            self.bump();
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn parse_array(&mut self, depth: usize) -> ParseResult<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error(JsonErrorKind::DepthLimitExceeded));
        }
        self.expect(b'[')?;
        let mut items = Buf::new();
        self.skip_whitespace();
        if self.eat(b']') {
            return Ok(Value::Array(items));
        }

        loop {
            self.skip_whitespace();
            items.push(self.parse_value(depth)?);
            self.skip_whitespace();
            if self.eat(b']') {
                return Ok(Value::Array(items));
            }
            self.expect(b',')?;
        }
    }

    fn parse_object(&mut self, depth: usize) -> ParseResult<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error(JsonErrorKind::DepthLimitExceeded));
        }
        self.expect(b'{')?;
        let mut entries = Map::new();
        self.skip_whitespace();
        if self.eat(b'}') {
            return Ok(Value::Object(entries));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.unexpected());
            }
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            self.skip_whitespace();
            let value = self.parse_value(depth)?;
            // Later duplicates win.
            entries.insert(key, value);

            self.skip_whitespace();
            if self.eat(b'}') {
                return Ok(Value::Object(entries));
            }
            self.expect(b',')?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_of(input: &str) -> JsonError {
        match parse(input) {
            Ok(value) => panic!("expected an error, parsed {value}"),
            Err(err) => err,
        }
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse("null").unwrap(), Value::Null);
        assert_eq!(parse(" true ").unwrap(), Value::Bool(true));
        assert_eq!(parse("false").unwrap(), Value::Bool(false));
        assert_eq!(parse("-12.5e1").unwrap(), Value::Number(-125.0));
        assert_eq!(parse("0").unwrap(), Value::Number(0.0));
        assert_eq!(parse(r#""hi""#).unwrap(), Value::string("hi"));
    }

    #[test]
    fn test_parse_escapes() {
        let v = parse(r#""a\"b\\c\/d\né😀""#).unwrap();
        assert_eq!(v.as_str(), Some("a\"b\\c/d\né😀"));

        let v = parse(r#""\u00e9\ud83d\ude00""#).unwrap();
        assert_eq!(v.as_str(), Some("é😀"));
    }

    #[test]
    fn test_parse_nested() {
        let v = parse(r#"{"a": [1, {"b": null}], "c": "d"}"#).unwrap();
        let a = v.object_lookup("a").unwrap();
        assert_eq!(a.array_at(0), Some(&Value::Number(1.0)));
        assert_eq!(a.array_at(1).and_then(|o| o.object_lookup("b")), Some(&Value::Null));
        assert_eq!(v.object_lookup("c").and_then(Value::as_str), Some("d"));
    }

    #[test]
    fn test_duplicate_keys_keep_last() {
        let v = parse(r#"{"k": 1, "k": 2}"#).unwrap();
        assert_eq!(v.as_object().map(Map::len), Some(1));
        assert_eq!(v.object_lookup("k"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_error_positions() {
        let err = error_of("{\n  \"a\": tru\n}");
        assert_eq!(err.kind, JsonErrorKind::UnexpectedChar('\n'));
        assert_eq!((err.line, err.column), (2, 11));

        let err = error_of("[1, 2");
        assert_eq!(err.kind, JsonErrorKind::UnexpectedEof);
        assert_eq!((err.line, err.column), (1, 6));

        assert_eq!(error_of("[1] x").kind, JsonErrorKind::TrailingCharacters);
        assert_eq!(error_of("01").kind, JsonErrorKind::TrailingCharacters);
        assert_eq!(error_of("-").kind, JsonErrorKind::InvalidNumber);
        assert_eq!(error_of("1.").kind, JsonErrorKind::InvalidNumber);
        assert_eq!(error_of(r#""\q""#).kind, JsonErrorKind::InvalidEscape('q'));
        assert_eq!(error_of(r#""\ud800""#).kind, JsonErrorKind::InvalidUnicode);
        assert_eq!(error_of("\"a\tb\"").kind, JsonErrorKind::ControlCharacter);
        assert_eq!(error_of("{1: 2}").kind, JsonErrorKind::UnexpectedChar('1'));
        assert_eq!(error_of("").kind, JsonErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_overflowing_number_is_rejected() {
        let err = error_of("[1, -1e400]");
        assert_eq!(err.kind, JsonErrorKind::NumberOutOfRange);
        assert_eq!((err.line, err.column), (1, 5));
        assert_eq!(err.to_string(), "number out of range at line 1, column 5");

        // Underflow rounds to zero and stays representable.
        assert_eq!(parse("1e-400").unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 1);
        assert_eq!(error_of(&deep).kind, JsonErrorKind::DepthLimitExceeded);

        let ok = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_print_round_trip() {
        let text = r#"{"list":[1,2.5,"x\n"],"nested":{"ok":true}}"#;
        let v = parse(text).unwrap();
        assert_eq!(parse(&v.to_string()).unwrap(), v);
    }
}
