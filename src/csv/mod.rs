//! Tabular serializer producing the platform's delimited ingestion format.
//!
//! A table arrives as an array of row objects. The first row defines the
//! column set; every column gets a `name:type.` header token with a width
//! inferred from the widest character value (byte length, plus one per
//! embedded double-quote since quotes are doubled on output).

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SasError;

/// Character values above this byte length cannot be ingested.
pub const MAX_STRING_BYTES: usize = 32_765;

/// Inline table parameters are split into pieces of this many characters.
pub const CHUNK_SIZE: usize = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Chars,
    Numeric,
}

struct ColumnSpec {
    name: String,
    kind: ColumnKind,
    width: Option<usize>,
}

/// Serializes one table. Fails without output when any character value
/// exceeds [`MAX_STRING_BYTES`]; mixed column types are a logged
/// data-quality finding, not an error.
pub fn convert_to_csv(rows: &[Map<String, Value>]) -> Result<String, SasError> {
    if rows.is_empty() {
        return Ok(String::new());
    }
    let specs = infer_columns(rows)?;

    let header_line = specs
        .iter()
        .map(header_token)
        .collect::<Vec<_>>()
        .join(",")
        .replace(',', " ");

    let row_lines: Vec<String> = rows
        .iter()
        .map(|row| {
            specs
                .iter()
                .map(|spec| encode_cell(row.get(&spec.name).unwrap_or(&Value::Null), spec.kind))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect();

    Ok(format!("{}\r\n{}", header_line, row_lines.join("\r\n")))
}

/// Splits serialized text into [`CHUNK_SIZE`]-character pieces for inline
/// submission. Character-counted, so multi-byte values never tear.
pub fn split_chunks(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_SIZE)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Reads a JSON table value (an array of row objects) into the row shape
/// [`convert_to_csv`] takes. Non-array values and non-object rows yield
/// nothing.
pub fn rows_of(value: &Value) -> Vec<Map<String, Value>> {
    value
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r.as_object().cloned()).collect())
        .unwrap_or_default()
}

fn infer_columns(rows: &[Map<String, Value>]) -> Result<Vec<ColumnSpec>, SasError> {
    // First row defines the column set and order.
    let first = &rows[0];
    let mut specs = Vec::with_capacity(first.len());

    for name in first.keys() {
        let mut kind: Option<ColumnKind> = None;
        let mut width: Option<usize> = None;
        let mut mixed_reported = false;

        for (row_index, row) in rows.iter().enumerate() {
            let value = match row.get(name) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            let this_kind = if value.is_string() {
                ColumnKind::Chars
            } else {
                ColumnKind::Numeric
            };
            match kind {
                None => kind = Some(this_kind),
                Some(k) if k != this_kind && !mixed_reported => {
                    warn!(column = %name, row = row_index + 1, "column has mixed types");
                    mixed_reported = true;
                }
                _ => {}
            }
            if let Some(s) = value.as_str() {
                let bytes = s.len() + s.matches('"').count();
                if bytes > MAX_STRING_BYTES {
                    return Err(SasError::StringTooLong);
                }
                width = Some(width.map_or(bytes, |w| w.max(bytes)));
            }
        }

        specs.push(ColumnSpec {
            name: name.clone(),
            kind: kind.unwrap_or(ColumnKind::Numeric),
            width,
        });
    }
    Ok(specs)
}

fn header_token(spec: &ColumnSpec) -> String {
    let (dollar, fallback) = match spec.kind {
        ColumnKind::Chars => ("$", "1"),
        ColumnKind::Numeric => ("", "best"),
    };
    let width = match spec.width {
        Some(w) if w > 0 => w.to_string(),
        _ => fallback.to_string(),
    };
    format!("{}:{}{}.", spec.name, dollar, width)
}

/// Encodes one cell. Values holding literal tab/LF/CR pass through raw
/// (quoted only when they also hold a comma or quote); everything else is
/// JSON-stringified, unwrapped when safe, and has escaped quotes doubled.
/// CRLF collapses to LF; an empty numeric cell becomes the `.` missing
/// marker.
fn encode_cell(value: &Value, kind: ColumnKind) -> String {
    let json_text = match value {
        // The ingestion grammar renders null as an empty string value.
        Value::Null => "\"\"".to_string(),
        other => other.to_string(),
    };

    let mut out = if json_text.contains("\\t") || json_text.contains("\\n") || json_text.contains("\\r") {
        let raw = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if raw.contains(',') || raw.contains('"') {
            format!("\"{}\"", raw)
        } else {
            raw
        }
    } else {
        let mut v = json_text;
        if !v.contains(',') && v.contains('"') && !v.contains("\\\"") {
            v = v[1..v.len() - 1].to_string();
        }
        v.replace("\\\"", "\"\"")
    };

    out = out.replace("\r\n", "\n");
    if out.is_empty() && kind == ColumnKind::Numeric {
        out.push('.');
    }
    out
}
