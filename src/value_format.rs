use redis::Value;
use std::fmt::Write;

/// Single-line rendering of stored bytes: printable UTF-8 with control
/// characters escaped, anything else as space-separated hex.
pub fn format_bytes_inline(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "(empty)".to_string();
    }

    if let Some(text) = utf8_if_printable(bytes) {
        return escape_inline(&text);
    }

    hex_inline(bytes)
}

/// Multi-line rendering used for whole string values.
pub fn format_bytes_block(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "(empty)".to_string();
    }

    if let Some(text) = utf8_if_printable(bytes) {
        return text;
    }

    hex_multiline(bytes)
}

pub fn value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(bytes) => Some(bytes.clone()),
        Value::SimpleString(text) => Some(text.as_bytes().to_vec()),
        Value::Int(num) => Some(num.to_string().into_bytes()),
        Value::Double(num) => Some(num.to_string().into_bytes()),
        Value::Okay => Some(b"OK".to_vec()),
        _ => None,
    }
}

pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Double(num) => Some(*num),
        Value::Int(num) => Some(*num as f64),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).ok()?.parse::<f64>().ok(),
        Value::SimpleString(text) => text.parse::<f64>().ok(),
        _ => None,
    }
}

/// Score text as shown in a sorted-set row.
pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

fn utf8_if_printable(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;

    if text.chars().all(is_printable_char) {
        Some(text.to_string())
    } else {
        None
    }
}

fn is_printable_char(ch: char) -> bool {
    if ch.is_control() {
        matches!(ch, '\n' | '\r' | '\t')
    } else {
        true
    }
}

fn escape_inline(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn hex_inline(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (idx, byte) in bytes.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        write!(out, "{:02X}", byte).ok();
    }
    out
}

fn hex_multiline(bytes: &[u8]) -> String {
    const LINE_BYTES: usize = 16;
    let mut out = String::new();
    let total_lines = bytes.len().div_ceil(LINE_BYTES);

    for (line_index, chunk) in bytes.chunks(LINE_BYTES).enumerate() {
        write!(out, "{:08X}: ", line_index * LINE_BYTES).ok();
        out.push_str(&hex_inline(chunk));
        if line_index + 1 < total_lines {
            out.push('\n');
        }
    }

    out
}
