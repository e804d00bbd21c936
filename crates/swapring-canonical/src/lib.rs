//! Canonical JSON encoding
//!
//! Signatures and export hashes depend on this format bit-exactly:
//! object keys sorted lexicographically at every depth, arrays kept in
//! order, UTF-8, no insignificant whitespace, integral numbers without
//! a fractional form. Non-finite numbers are rejected; a depth guard
//! rejects degenerate (effectively cyclic) structures.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Nesting deeper than this is treated as a structural error
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CanonicalError {
    #[error("Non-finite number cannot be canonicalized")]
    NonFiniteNumber,

    #[error("Value nesting exceeds {MAX_DEPTH} levels")]
    DepthExceeded,

    #[error("Serialization failed: {message}")]
    Serialization { message: String },
}

pub type Result<T> = std::result::Result<T, CanonicalError>;

/// Canonicalize a value: sort object keys at every depth, keep arrays
/// in order. Idempotent; two JSON-isomorphic inputs canonicalize to
/// equal values.
pub fn canonicalize(value: &Value) -> Result<Value> {
    canonicalize_at(value, 0)
}

fn canonicalize_at(value: &Value, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::DepthExceeded);
    }
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize_at(&map[key], depth + 1)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(canonicalize_at(item, depth + 1)?);
            }
            Ok(Value::Array(out))
        }
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CanonicalError::NonFiniteNumber);
                }
            }
            Ok(value.clone())
        }
        _ => Ok(value.clone()),
    }
}

/// Emit the canonical UTF-8 string of a value
pub fn canonical_string(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out, 0)?;
    Ok(out)
}

/// Emit the canonical UTF-8 bytes of a value
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    canonical_string(value).map(String::into_bytes)
}

/// Serialize any value to its canonical bytes
pub fn canonical_bytes_of<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_value(value).map_err(|e| CanonicalError::Serialization {
        message: e.to_string(),
    })?;
    canonical_bytes(&json)
}

fn write_canonical(value: &Value, out: &mut String, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::DepthExceeded);
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                write_canonical(&map[*key], out, depth + 1)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(n: &serde_json::Number, out: &mut String) -> Result<()> {
    if n.is_i64() || n.is_u64() {
        out.push_str(&n.to_string());
        return Ok(());
    }
    let f = n.as_f64().ok_or(CanonicalError::NonFiniteNumber)?;
    if !f.is_finite() {
        return Err(CanonicalError::NonFiniteNumber);
    }
    // Mathematically integral floats drop the fractional form.
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        out.push_str(&format!("{}", f as i64));
    } else {
        out.push_str(&n.to_string());
    }
    Ok(())
}

fn write_escaped(s: &str, out: &mut String) {
    // serde_json string escaping is exact and stable; reuse it.
    out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
}
