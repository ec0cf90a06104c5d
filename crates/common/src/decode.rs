//! Deterministic decoding of raw contract values.
//!
//! Values arrive as untyped JSON. The contracting runtime wraps exact
//! amounts as `{"__fixed__": "<decimal string>"}` and datetimes as
//! `{"__time__": [y, m, d, h, m, s]}`; everything else is a raw
//! number/string/bool. Numeric primitives are normalized to
//! [`Decimal`] so no binary floating point ever enters the engine.
//!
//! Decoding never mutates anything and the same input always produces
//! the same output. Malformed values are reported as [`DecodeError`]
//! and dropped per-field by the router.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::time;

// ════════════════════════════════════════════════════════════════════════════
// ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors produced while decoding a raw value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A fixed-point wrapper or numeric value could not be parsed.
    #[error("malformed fixed-point value: {0}")]
    Fixed(String),

    /// A contracting-time value was not a valid calendar datetime.
    #[error("malformed contracting time: {0}")]
    Time(String),

    /// An epoch structure was missing fields or carried wrong types.
    #[error("malformed epoch value: {0}")]
    Epoch(String),

    /// A deposit list entry was missing fields or carried wrong types.
    #[error("malformed deposit list: {0}")]
    Deposits(String),

    /// The value shape did not match what the field requires.
    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
    },
}

// ════════════════════════════════════════════════════════════════════════════
// DECODED SHAPES
// ════════════════════════════════════════════════════════════════════════════

/// A raw value normalized into one of the shapes the projector handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Number(Decimal),
    Text(String),
    Bool(bool),
    /// A contracting time converted to Unix seconds.
    Time(i64),
    Null,
}

/// Decoded `Epochs:{index}` entry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochValue {
    pub staked: Decimal,
    /// Epoch start, Unix seconds.
    pub time: i64,
    pub emission_rate_per_tau: Option<Decimal>,
}

/// Decoded entry of a `Deposits:{participant}` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositValue {
    pub amount: Decimal,
    pub starting_epoch_index: u64,
    /// Deposit time, Unix seconds.
    pub deposit_time: i64,
}

// ════════════════════════════════════════════════════════════════════════════
// DECODERS
// ════════════════════════════════════════════════════════════════════════════

/// Decodes any raw value into its normalized shape.
pub fn decode_value(value: &Value) -> Result<DecodedValue, DecodeError> {
    match value {
        Value::Null => Ok(DecodedValue::Null),
        Value::Bool(b) => Ok(DecodedValue::Bool(*b)),
        Value::Number(n) => number_to_decimal(n).map(DecodedValue::Number),
        Value::String(s) => Ok(DecodedValue::Text(s.clone())),
        Value::Object(map) => {
            if let Some(fixed) = map.get("__fixed__") {
                fixed_to_decimal(fixed).map(DecodedValue::Number)
            } else if map.contains_key("__time__") {
                unix_time(value).map(DecodedValue::Time)
            } else {
                Err(DecodeError::Unexpected {
                    expected: "primitive or wrapper object",
                    found: shape_of(value),
                })
            }
        }
        Value::Array(_) => Err(DecodeError::Unexpected {
            expected: "primitive or wrapper object",
            found: shape_of(value),
        }),
    }
}

/// Decodes a decimal amount: a raw number, a numeric string, or a
/// `__fixed__` wrapper.
pub fn decimal(value: &Value) -> Result<Decimal, DecodeError> {
    match value {
        Value::Number(n) => number_to_decimal(n),
        Value::String(s) => {
            Decimal::from_str(s).map_err(|_| DecodeError::Fixed(s.clone()))
        }
        Value::Object(map) => match map.get("__fixed__") {
            Some(fixed) => fixed_to_decimal(fixed),
            None => Err(DecodeError::Unexpected {
                expected: "decimal",
                found: shape_of(value),
            }),
        },
        other => Err(DecodeError::Unexpected {
            expected: "decimal",
            found: shape_of(other),
        }),
    }
}

/// Decodes a non-negative integer index (epoch index and the like).
pub fn index(value: &Value) -> Result<u64, DecodeError> {
    value.as_u64().ok_or_else(|| DecodeError::Unexpected {
        expected: "non-negative integer",
        found: shape_of(value),
    })
}

/// Decodes a boolean field.
pub fn boolean(value: &Value) -> Result<bool, DecodeError> {
    value.as_bool().ok_or_else(|| DecodeError::Unexpected {
        expected: "boolean",
        found: shape_of(value),
    })
}

/// Decodes a plain text field.
pub fn text(value: &Value) -> Result<String, DecodeError> {
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None => Err(DecodeError::Unexpected {
            expected: "string",
            found: shape_of(value),
        }),
    }
}

/// Decodes a contracting time (`{"__time__": [...]}` or a bare
/// six-element array) into Unix seconds.
pub fn unix_time(value: &Value) -> Result<i64, DecodeError> {
    let parts_value = match value {
        Value::Object(map) => map
            .get("__time__")
            .ok_or_else(|| DecodeError::Time(shape_of(value)))?,
        Value::Array(_) => value,
        other => return Err(DecodeError::Time(shape_of(other))),
    };

    let raw = parts_value
        .as_array()
        .ok_or_else(|| DecodeError::Time(shape_of(parts_value)))?;
    if raw.len() != 6 {
        return Err(DecodeError::Time(format!("{} elements", raw.len())));
    }

    let mut parts = [0i64; 6];
    for (slot, item) in parts.iter_mut().zip(raw) {
        *slot = item
            .as_i64()
            .ok_or_else(|| DecodeError::Time(shape_of(item)))?;
    }

    time::to_unix_seconds(parts).ok_or_else(|| DecodeError::Time(format!("{:?}", parts)))
}

/// Decodes an `Epochs:{index}` entry value:
/// `{ staked, time, emission_rate_per_tau? }`.
pub fn epoch(value: &Value) -> Result<EpochValue, DecodeError> {
    let map = value
        .as_object()
        .ok_or_else(|| DecodeError::Epoch(shape_of(value)))?;

    let staked = map
        .get("staked")
        .ok_or_else(|| DecodeError::Epoch("missing staked".to_string()))
        .and_then(decimal)?;
    let time = map
        .get("time")
        .ok_or_else(|| DecodeError::Epoch("missing time".to_string()))
        .and_then(unix_time)?;
    let emission_rate_per_tau = match map.get("emission_rate_per_tau") {
        Some(Value::Null) | None => None,
        Some(rate) => Some(decimal(rate)?),
    };

    Ok(EpochValue {
        staked,
        time,
        emission_rate_per_tau,
    })
}

/// Decodes a `Deposits:{participant}` value: the authoritative full
/// list of the participant's deposits.
pub fn deposits(value: &Value) -> Result<Vec<DepositValue>, DecodeError> {
    let entries = value
        .as_array()
        .ok_or_else(|| DecodeError::Deposits(shape_of(value)))?;

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let map = entry
            .as_object()
            .ok_or_else(|| DecodeError::Deposits(shape_of(entry)))?;
        let amount = map
            .get("amount")
            .ok_or_else(|| DecodeError::Deposits("missing amount".to_string()))
            .and_then(decimal)?;
        let starting_epoch_index = map
            .get("starting_epoch")
            .ok_or_else(|| DecodeError::Deposits("missing starting_epoch".to_string()))
            .and_then(index)?;
        let deposit_time = map
            .get("time")
            .ok_or_else(|| DecodeError::Deposits("missing time".to_string()))
            .and_then(unix_time)?;
        out.push(DepositValue {
            amount,
            starting_epoch_index,
            deposit_time,
        });
    }
    Ok(out)
}

// ════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════

fn number_to_decimal(n: &serde_json::Number) -> Result<Decimal, DecodeError> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| DecodeError::Fixed(text))
}

fn fixed_to_decimal(fixed: &Value) -> Result<Decimal, DecodeError> {
    match fixed {
        Value::String(s) => {
            Decimal::from_str(s).map_err(|_| DecodeError::Fixed(s.clone()))
        }
        Value::Number(n) => number_to_decimal(n),
        other => Err(DecodeError::Fixed(shape_of(other))),
    }
}

/// Short type tag for error messages; never the full payload.
fn shape_of(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
