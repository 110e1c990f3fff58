//! Packed row format used by the replication triggers.
//!
//! A packed row is a run of `"column"=value` tokens, each followed by a
//! single space. A value is either empty (SQL NULL) or a single-quoted
//! string in which `''` stands for one quote and `\\` for one backslash.
//! Quoted values may span lines.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::FeedError;

/// Column name to value. `None` is SQL NULL, distinct from an empty string.
pub type FieldMap = BTreeMap<String, Option<String>>;

/// Decode a packed row into its column values.
///
/// Malformed input is a hard error: packets are trusted, so anything that
/// does not scan is a corrupt packet rather than something to skip over.
pub fn unpack(packed: &str) -> Result<FieldMap, FeedError> {
    let bytes = packed.as_bytes();
    let mut fields = FieldMap::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b' ' {
            pos += 1;
            continue;
        }
        if bytes[pos] != b'"' {
            return Err(FeedError::parse(pos, "expected '\"' at start of column"));
        }

        let name_start = pos + 1;
        let name_end = packed[name_start..]
            .find("\"=")
            .map(|i| name_start + i)
            .ok_or_else(|| FeedError::parse(pos, "unterminated column name"))?;
        let name = &packed[name_start..name_end];
        if name.is_empty() {
            return Err(FeedError::parse(pos, "empty column name"));
        }
        pos = name_end + 2;

        let value = if bytes.get(pos) == Some(&b'\'') {
            let (value, next) = scan_quoted(packed, pos)?;
            pos = next;
            Some(value)
        } else {
            None
        };
        fields.insert(name.to_string(), value);

        match bytes.get(pos) {
            None => {}
            Some(b' ') => pos += 1,
            Some(_) => {
                return Err(FeedError::parse(
                    pos,
                    format!("unexpected character after value of column {name}"),
                ))
            }
        }
    }

    Ok(fields)
}

/// Scan a quoted value starting at the opening quote.
///
/// Returns the decoded value and the offset just past the closing quote.
/// The delimiters are ASCII, so slicing at their offsets stays on UTF-8
/// boundaries.
fn scan_quoted(packed: &str, open: usize) -> Result<(String, usize), FeedError> {
    let bytes = packed.as_bytes();
    let mut value = String::new();
    let mut pos = open + 1;
    let mut segment_start = pos;

    loop {
        match bytes.get(pos) {
            None => return Err(FeedError::parse(open, "unterminated quoted value")),
            Some(b'\'') => {
                value.push_str(&packed[segment_start..pos]);
                if bytes.get(pos + 1) == Some(&b'\'') {
                    value.push('\'');
                    pos += 2;
                    segment_start = pos;
                } else {
                    return Ok((value, pos + 1));
                }
            }
            Some(b'\\') if bytes.get(pos + 1) == Some(&b'\\') => {
                value.push_str(&packed[segment_start..pos]);
                value.push('\\');
                pos += 2;
                segment_start = pos;
            }
            Some(_) => pos += 1,
        }
    }
}

/// Encode column values in the packed row format.
pub fn pack(fields: &FieldMap) -> String {
    let mut packed = String::new();
    for (name, value) in fields {
        packed.push('"');
        packed.push_str(name);
        packed.push_str("\"=");
        if let Some(value) = value {
            packed.push('\'');
            packed.push_str(&value.replace('\\', "\\\\").replace('\'', "''"));
            packed.push('\'');
        }
        packed.push(' ');
    }
    packed
}

/// Columns whose values differ between two row images.
///
/// A column missing from one map is treated as NULL, so NULL on both sides
/// is not a change.
pub fn changed_fields(old: &FieldMap, new: &FieldMap) -> BTreeSet<String> {
    old.keys()
        .chain(new.keys())
        .filter(|name| {
            let before = old.get(*name).and_then(|v| v.as_deref());
            let after = new.get(*name).and_then(|v| v.as_deref());
            before != after
        })
        .cloned()
        .collect()
}

/// Decode PostgreSQL COPY text escaping from one field of a dump line.
pub fn unescape_copy_text(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
