//! Bulk transfer codec
//!
//! PostgreSQL `COPY` text format: one line per row, tab-separated fields in
//! destination column order, no header. NULL is `\N`; backslash, tab,
//! newline and carriage return are backslash-escaped.

use crate::storage::{SqlValue, ToSqlValues};

const NULL_MARKER: &str = "\\N";

/// Encode rows for a bulk load
pub fn encode_rows<R: ToSqlValues>(rows: &[R]) -> Vec<u8> {
    let mut out = String::new();
    for row in rows {
        encode_values(&row.to_sql_values(), &mut out);
    }
    out.into_bytes()
}

/// Append one encoded line for `values`
pub fn encode_values(values: &[SqlValue], out: &mut String) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        match value.to_text() {
            Some(text) => escape_into(&text, out),
            None => out.push_str(NULL_MARKER),
        }
    }
    out.push('\n');
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

/// Decode a bulk payload into rows of nullable text fields
pub fn decode(data: &[u8]) -> Result<Vec<Vec<Option<String>>>, String> {
    let text = std::str::from_utf8(data).map_err(|e| format!("invalid UTF-8: {}", e))?;

    text.lines()
        .enumerate()
        .map(|(n, line)| {
            line.split('\t')
                .map(|field| unescape(field).map_err(|e| format!("line {}: {}", n + 1, e)))
                .collect()
        })
        .collect()
}

fn unescape(field: &str) -> Result<Option<String>, String> {
    if field == NULL_MARKER {
        return Ok(None);
    }

    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("unsupported escape '\\{}'", other)),
            None => return Err("dangling backslash".to_string()),
        }
    }
    Ok(Some(out))
}
