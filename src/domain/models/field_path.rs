//! Dotted and bracketed paths into JSON values.
//!
//! Supported forms: `a.b.c`, `items[0].name`, `headers["x.y"]`, `a['b']`.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

/// Parsed path addressing a location inside a JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a path, describing the first syntax error on failure.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut chars = raw.chars().peekable();
        let mut key = String::new();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    } else if segments.is_empty() {
                        return Err(format!("path '{raw}' starts with '.'"));
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                    match chars.peek() {
                        Some(&q) if q == '"' || q == '\'' => {
                            chars.next();
                            let mut quoted = String::new();
                            loop {
                                match chars.next() {
                                    Some(c) if c == q => break,
                                    Some(c) => quoted.push(c),
                                    None => return Err(format!("unterminated quote in '{raw}'")),
                                }
                            }
                            if chars.next() != Some(']') {
                                return Err(format!("expected ']' in '{raw}'"));
                            }
                            segments.push(PathSegment::Key(quoted));
                        }
                        _ => {
                            let mut digits = String::new();
                            loop {
                                match chars.next() {
                                    Some(']') => break,
                                    Some(c) => digits.push(c),
                                    None => return Err(format!("expected ']' in '{raw}'")),
                                }
                            }
                            let index = digits
                                .trim()
                                .parse::<usize>()
                                .map_err(|_| format!("invalid index '{digits}' in '{raw}'"))?;
                            segments.push(PathSegment::Index(index));
                        }
                    }
                }
                c => key.push(c),
            }
        }
        if !key.is_empty() {
            segments.push(PathSegment::Key(key));
        }
        if segments.is_empty() {
            return Err("empty field path".to_string());
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Parsed segments in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Value at the path, if present.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(value, |current, segment| match segment {
            PathSegment::Key(k) => current.as_object()?.get(k),
            PathSegment::Index(i) => current.as_array()?.get(*i),
        })
    }

    /// Mutable value at the path, if present.
    pub fn get_mut<'a>(&self, value: &'a mut Value) -> Option<&'a mut Value> {
        self.segments.iter().try_fold(value, |current, segment| match segment {
            PathSegment::Key(k) => current.as_object_mut()?.get_mut(k),
            PathSegment::Index(i) => current.as_array_mut()?.get_mut(*i),
        })
    }

    /// Replace the addressed value. Returns false when the path does not exist.
    pub fn set(&self, value: &mut Value, replacement: Value) -> bool {
        match self.get_mut(value) {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_path() {
        let path = FieldPath::parse("a.b[0][\"x.y\"]").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Index(0),
                PathSegment::Key("x.y".into()),
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a[").is_err());
        assert!(FieldPath::parse("a[x]").is_err());
        assert!(FieldPath::parse("a[\"b]").is_err());
    }

    #[test]
    fn test_get_and_set() {
        let mut value = json!({"customer": {"cards": [{"pan": "4111"}], "x.y": 1}});
        let pan = FieldPath::parse("customer.cards[0].pan").unwrap();
        assert_eq!(pan.get(&value), Some(&json!("4111")));

        assert!(pan.set(&mut value, json!("[REDACTED]")));
        assert_eq!(value["customer"]["cards"][0]["pan"], json!("[REDACTED]"));

        let quoted = FieldPath::parse("customer['x.y']").unwrap();
        assert_eq!(quoted.get(&value), Some(&json!(1)));
    }

    #[test]
    fn test_missing_path_is_noop() {
        let mut value = json!({"a": [1]});
        let path = FieldPath::parse("a[3].b").unwrap();
        assert_eq!(path.get(&value), None);
        assert!(!path.set(&mut value, json!(0)));
        assert_eq!(value, json!({"a": [1]}));
    }
}
