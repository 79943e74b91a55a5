//! The JSON value model and its compact printer.

use crate::buf::Buf;
use crate::map::Map;
use crate::string::Str;
use std::fmt::{self, Write};

/// A JSON value.
///
/// Payloads allocate through the current allocator when they are created.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Str),
    Array(Buf<Value>),
    Object(Map<Str, Value>),
}

impl Value {
    /// An empty array.
    #[must_use]
    pub fn array() -> Self {
        Value::Array(Buf::new())
    }

    /// An empty object.
    #[must_use]
    pub fn object() -> Self {
        Value::Object(Map::new())
    }

    #[must_use]
    pub fn string(s: &str) -> Self {
        Value::String(Str::from(s))
    }

    /// Name of the variant, as used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Buf<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Buf<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Map<Str, Value>> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Map<Str, Value>> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Appends to an array.
    ///
    /// # Panics
    ///
    /// Panics with a contract violation if `self` is not an array.
    #[track_caller]
    pub fn array_push(&mut self, value: Value) {
        match self {
            Value::Array(items) => items.push(value),
            other => cairn_mem::contract_violation!(
                "array_push on a json {}",
                other.type_name()
            ),
        }
    }

    /// Element `index` of an array; `None` out of range or for non-arrays.
    #[must_use]
    pub fn array_at(&self, index: usize) -> Option<&Value> {
        self.as_array().and_then(|items| items.get(index))
    }

    pub fn array_at_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.as_array_mut().and_then(|items| items.get_mut(index))
    }

    /// Sets `key` in an object. A previous value for the key is dropped.
    ///
    /// # Panics
    ///
    /// Panics with a contract violation if `self` is not an object.
    #[track_caller]
    pub fn object_insert(&mut self, key: &str, value: Value) {
        match self {
            Value::Object(entries) => match entries.lookup_mut(key) {
                Some(slot) => *slot = value,
                None => {
                    let key = Str::from_str_in(key, entries.allocator().clone());
                    entries.insert(key, value);
                }
            },
            other => cairn_mem::contract_violation!(
                "object_insert on a json {}",
                other.type_name()
            ),
        }
    }

    /// Value of `key`; `None` when missing or for non-objects.
    #[must_use]
    pub fn object_lookup(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|entries| entries.lookup(key))
    }

    pub fn object_lookup_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.as_object_mut().and_then(|entries| entries.lookup_mut(key))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Str> for Value {
    fn from(s: Str) -> Self {
        Value::String(s)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    let mut run = 0;
    for (i, ch) in s.char_indices() {
        let escape = match ch {
            '"' => "\\\"",
            '\\' => "\\\\",
            '\n' => "\\n",
            '\r' => "\\r",
            '\t' => "\\t",
            '\u{8}' => "\\b",
            '\u{c}' => "\\f",
            c if c < ' ' => "",
            _ => continue,
        };
        f.write_str(&s[run..i])?;
        if escape.is_empty() {
            write!(f, "\\u{:04x}", ch as u32)?;
        } else {
            f.write_str(escape)?;
        }
        run = i + ch.len_utf8();
    }
    f.write_str(&s[run..])?;
    f.write_char('"')
}

/// Compact JSON. Non-finite numbers print as `null`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_finite() => write!(f, "{n}"),
            Value::Number(_) => f.write_str("null"),
            Value::String(s) => write_escaped(f, s),
            Value::Array(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Value::Object(entries) => {
                f.write_char('{')?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i != 0 {
                        f.write_char(',')?;
                    }
                    write_escaped(f, key)?;
                    write!(f, ":{value}")?;
                }
                f.write_char('}')
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_print() {
        let mut doc = Value::object();
        doc.object_insert("name", Value::string("Mostafa"));
        let mut scores = Value::array();
        scores.array_push(Value::Number(1.0));
        scores.array_push(Value::Number(2.5));
        scores.array_push(Value::Null);
        doc.object_insert("scores", scores);

        assert_eq!(doc.object_lookup("name").and_then(Value::as_str), Some("Mostafa"));
        assert_eq!(doc.object_lookup("scores").map(ToString::to_string).as_deref(), Some("[1,2.5,null]"));
        assert_eq!(doc.object_lookup("missing"), None);
    }

    #[test]
    fn test_object_insert_replaces() {
        let mut doc = Value::object();
        doc.object_insert("k", Value::string("old"));
        doc.object_insert("k", Value::Bool(false));
        assert_eq!(doc.as_object().map(Map::len), Some(1));
        assert_eq!(doc.object_lookup("k"), Some(&Value::Bool(false)));
        assert_eq!(doc.to_string(), r#"{"k":false}"#);
    }

    #[test]
    fn test_string_escaping() {
        let v = Value::string("a\"b\\c\nd\u{1}é");
        assert_eq!(v.to_string(), r#""a\"b\\c\nd\u0001é""#);
    }

    #[test]
    fn test_non_finite_numbers_print_null() {
        assert_eq!(Value::Number(f64::NAN).to_string(), "null");
        assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
    }

    #[test]
    fn test_accessors_on_wrong_kind() {
        let v = Value::from(true);
        assert_eq!(v.as_bool(), Some(true));
        assert_eq!(v.as_number(), None);
        assert_eq!(v.array_at(0), None);
        assert_eq!(v.object_lookup("x"), None);
        assert_eq!(v.type_name(), "bool");
    }

    #[test]
    #[should_panic(expected = "contract violation: array_push on a json object")]
    fn test_array_push_on_object_panics() {
        Value::object().array_push(Value::Null);
    }
}
