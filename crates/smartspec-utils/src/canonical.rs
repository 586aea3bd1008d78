//! Canonical JSON emission (RFC 8785 JCS).
//!
//! Reports and event records are emitted canonically so two runs over
//! identical inputs produce byte-identical output, regardless of platform
//! or hash-map iteration order.

use anyhow::{Context, Result};
use serde::Serialize;

/// Serialize a value to canonical JSON (JCS).
///
/// # Errors
/// Serialization failures (non-string map keys, non-finite floats).
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json_canonicalizer::to_string(value).context("Canonical JSON serialization failed")
}

/// Canonical JSON plus a trailing newline, the shape written to
/// `summary.json` and JSONL event logs.
///
/// # Errors
/// Same as [`to_canonical_json`].
pub fn to_canonical_json_line<T: Serialize>(value: &T) -> Result<String> {
    let mut line = to_canonical_json(value)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_is_canonical() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            to_canonical_json(&a).unwrap(),
            to_canonical_json(&b).unwrap()
        );
        assert_eq!(to_canonical_json(&a).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn line_variant_appends_newline() {
        let v = json!({"x": true});
        assert!(to_canonical_json_line(&v).unwrap().ends_with('\n'));
    }
}
