//! Minimal JSONPath subset used by rule conditions.
//!
//! Supported: root `$`, dotted keys, `.*`, `[n]`, `[*]` and quoted keys
//! (`['key']` / `["key"]`). Filters and recursive descent are not supported.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub offset: usize,
    pub message: String,
}

impl JsonPath {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn parse(input: &str) -> Result<Self, PathError> {
        let (path, consumed) = Self::parse_prefix(input)?;
        if consumed != input.len() {
            return Err(PathError {
                offset: consumed,
                message: format!("unexpected trailing input '{}'", &input[consumed..]),
            });
        }
        Ok(path)
    }

    /// Parses a path at the start of `input`, returning it and the number of
    /// bytes consumed. Parsing stops at the first byte that cannot continue it.
    pub fn parse_prefix(input: &str) -> Result<(Self, usize), PathError> {
        let bytes = input.as_bytes();
        if bytes.first() != Some(&b'$') {
            return Err(PathError {
                offset: 0,
                message: "JSONPath must start with '$'".to_string(),
            });
        }

        let mut segments = Vec::new();
        let mut pos = 1;

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    pos += 1;
                    if bytes.get(pos) == Some(&b'*') {
                        segments.push(Segment::Wildcard);
                        pos += 1;
                        continue;
                    }
                    let start = pos;
                    while pos < bytes.len() && is_ident_byte(bytes[pos]) {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(PathError {
                            offset: start,
                            message: "expected a property name after '.'".to_string(),
                        });
                    }
                    segments.push(Segment::Key(input[start..pos].to_string()));
                }
                b'[' => {
                    let (segment, next) = parse_bracket(input, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                _ => break,
            }
        }

        Ok((Self { segments }, pos))
    }

    /// Every value the path reaches in `root`. A missing key or index yields
    /// nothing for that branch.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match (segment, value) {
                    (Segment::Key(key), Value::Object(map)) => next.extend(map.get(key)),
                    (Segment::Index(idx), Value::Array(items)) => next.extend(items.get(*idx)),
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (Segment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {}
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) if key.bytes().all(is_ident_byte) => write!(f, ".{}", key)?,
                Segment::Key(key) => write!(f, "['{}']", key.replace('\'', "\\'"))?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
                Segment::Wildcard => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn parse_bracket(input: &str, open: usize) -> Result<(Segment, usize), PathError> {
    let bytes = input.as_bytes();
    let mut pos = open + 1;

    let segment = match bytes.get(pos) {
        Some(b'*') => {
            pos += 1;
            Segment::Wildcard
        }
        Some(&quote @ (b'\'' | b'"')) => {
            pos += 1;
            let mut key = String::new();
            loop {
                match bytes.get(pos) {
                    None => {
                        return Err(PathError {
                            offset: open,
                            message: "unterminated quoted key".to_string(),
                        })
                    }
                    Some(b'\\') if pos + 1 < bytes.len() => {
                        let ch = input[pos + 1..].chars().next().unwrap_or('\\');
                        key.push(ch);
                        pos += 1 + ch.len_utf8();
                    }
                    Some(&b) if b == quote => {
                        pos += 1;
                        break;
                    }
                    Some(_) => {
                        let ch = input[pos..].chars().next().unwrap_or('\u{fffd}');
                        key.push(ch);
                        pos += ch.len_utf8();
                    }
                }
            }
            Segment::Key(key)
        }
        Some(b) if b.is_ascii_digit() => {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let idx = input[start..pos].parse::<usize>().map_err(|e| PathError {
                offset: start,
                message: format!("invalid index: {}", e),
            })?;
            Segment::Index(idx)
        }
        _ => {
            return Err(PathError {
                offset: pos,
                message: "expected an index, '*' or a quoted key after '['".to_string(),
            })
        }
    };

    if bytes.get(pos) != Some(&b']') {
        return Err(PathError {
            offset: pos,
            message: "expected ']'".to_string(),
        });
    }
    Ok((segment, pos + 1))
}
