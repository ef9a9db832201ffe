//! JSON parsing with readable error context for portal and Sheets responses.

use anyhow::Result;

/// Parse JSON and, on failure, report the serde path, a type-mismatch summary
/// and a snippet of the offending line.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    let err = match serde_path_to_error::deserialize(jd) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let inner = err.inner();
    let (line, column) = (inner.line(), inner.column());
    let path = err.path().to_string();

    let msg = inner.to_string();
    let loc = format!(" at line {line} column {column}");
    let summary = summarize_type_mismatch(msg.strip_suffix(&loc).unwrap_or(&msg));
    let snippet = error_snippet(body, line, column, 20);

    let location = if path.is_empty() || path == "." {
        String::new()
    } else {
        format!("at path '{path}': ")
    };
    Err(anyhow::anyhow!(
        "{location}{summary} (line {line} col {column})\n{snippet}"
    ))
}

/// Turn "invalid type: null, expected a string" into "expected a string, got null".
fn summarize_type_mismatch(msg: &str) -> String {
    if let Some(rest) = msg.split_once("invalid type: ").map(|(_, r)| r)
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        let expected = expected.split(" at line ").next().unwrap_or(expected).trim();
        return format!("expected {expected}, got {actual}");
    }

    if msg.starts_with("expected ")
        && let Some(expected) = msg.split(" at line ").next()
    {
        return expected.to_string();
    }

    msg.to_string()
}

fn error_snippet(body: &str, line: usize, column: usize, context_len: usize) -> String {
    let target = body.lines().nth(line.saturating_sub(1)).unwrap_or("");
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    // serde reports byte columns; clamp to char boundaries for Cyrillic bodies
    let error_idx = floor_char_boundary(target, column.saturating_sub(1).min(target.len()));
    let half = context_len / 2;
    let start = floor_char_boundary(target, error_idx.saturating_sub(half));
    let end = floor_char_boundary(target, (error_idx + half).min(target.len()));

    let indicator = " ".repeat(target[start..error_idx].chars().count()) + "^";
    format!("...{}...\n   {indicator}", &target[start..end])
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
