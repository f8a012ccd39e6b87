//! Value coercion
//!
//! Converts a proposed [`FieldValue`] into the canonical variant of a field
//! kind and checks it against the field's constraints. A rejection is a
//! normal outcome, reported to the writer, never stored.

use crate::descriptor::{FieldKind, MAX_ELEMENT_LENGTH};
use crate::value::{ElementType, FieldValue};
use thiserror::Error;

/// Why a proposed value was refused
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Rejection {
    #[error("cannot convert {got} to {expected}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("{value} is outside [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    #[error("'{0}' is not one of the choices")]
    UnknownChoice(String),

    #[error("{len} bytes exceed the maximum of {max}")]
    TooLong { len: usize, max: usize },

    #[error("{got} elements given, {expected} expected")]
    LengthMismatch { got: usize, expected: usize },

    #[error("value is not finite")]
    NotFinite,

    #[error("calculated fields cannot be written")]
    ReadOnly,
}

/// Accepted value in canonical form
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: FieldValue,
    /// The value was pulled into range; the record goes to INVALID severity
    pub clamped: bool,
}

impl Coerced {
    fn exact(value: FieldValue) -> Self {
        Self {
            value,
            clamped: false,
        }
    }
}

type Outcome<T> = Result<T, Rejection>;

fn mismatch(expected: &'static str, got: &FieldValue) -> Rejection {
    Rejection::TypeMismatch {
        expected,
        got: got.type_name(),
    }
}

fn out_of_range(value: impl ToString, min: impl ToString, max: impl ToString) -> Rejection {
    Rejection::OutOfRange {
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    }
}

fn float_to_integer(value: f64) -> Outcome<i64> {
    if !value.is_finite() {
        return Err(Rejection::NotFinite);
    }
    if value.fract() != 0.0 || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(Rejection::TypeMismatch {
            expected: "integer",
            got: "float",
        });
    }
    Ok(value as i64)
}

fn parse_integer(text: &str, raw: &FieldValue) -> Outcome<i64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Ok(value);
    }
    match text.parse::<f64>() {
        Ok(value) => float_to_integer(value),
        Err(_) => Err(mismatch("integer", raw)),
    }
}

fn parse_float(text: &str, raw: &FieldValue) -> Outcome<f64> {
    let value = text
        .trim()
        .parse::<f64>()
        .map_err(|_| mismatch("float", raw))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Rejection::NotFinite)
    }
}

fn to_integer(raw: &FieldValue) -> Outcome<i64> {
    match raw {
        FieldValue::Int(value) => Ok(*value),
        FieldValue::Enum(index) => Ok(i64::from(*index)),
        FieldValue::Bool(flag) => Ok(i64::from(*flag)),
        FieldValue::Float(value) => float_to_integer(*value),
        FieldValue::Str(text) => parse_integer(text, raw),
        other => Err(mismatch("integer", other)),
    }
}

fn to_float(raw: &FieldValue) -> Outcome<f64> {
    let value = match raw {
        FieldValue::Float(value) => *value,
        FieldValue::Int(value) => *value as f64,
        FieldValue::Enum(index) => f64::from(*index),
        FieldValue::Bool(flag) => f64::from(u8::from(*flag)),
        FieldValue::Str(text) => return parse_float(text, raw),
        other => return Err(mismatch("float", other)),
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Rejection::NotFinite)
    }
}

fn coerce_enum(choices: &[String], raw: &FieldValue) -> Outcome<Coerced> {
    let index = match raw {
        FieldValue::Str(text) => match choices.iter().position(|c| c == text.trim()) {
            Some(position) => position as i64,
            None => text
                .trim()
                .parse::<i64>()
                .map_err(|_| Rejection::UnknownChoice(text.clone()))?,
        },
        other => to_integer(other)?,
    };
    if index < 0 || index >= choices.len() as i64 {
        return Err(out_of_range(index, 0, choices.len().saturating_sub(1)));
    }
    Ok(Coerced::exact(FieldValue::Enum(index as u16)))
}

fn coerce_boolean(zname: &str, oname: &str, raw: &FieldValue) -> Outcome<Coerced> {
    let flag = match raw {
        FieldValue::Bool(flag) => *flag,
        FieldValue::Str(text) => {
            let text = text.trim();
            match text {
                "true" | "TRUE" | "True" => true,
                "false" | "FALSE" | "False" => false,
                _ if zname != oname && text == zname => false,
                _ if zname != oname && text == oname => true,
                _ => integer_flag(parse_integer(text, raw)?)?,
            }
        },
        other => integer_flag(to_integer(other)?)?,
    };
    Ok(Coerced::exact(FieldValue::Bool(flag)))
}

fn integer_flag(value: i64) -> Outcome<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(out_of_range(other, 0, 1)),
    }
}

fn coerce_string(max_length: usize, raw: &FieldValue) -> Outcome<Coerced> {
    let text = match raw {
        FieldValue::Str(text) => text.clone(),
        FieldValue::Bool(_) | FieldValue::Enum(_) | FieldValue::Int(_) | FieldValue::Float(_) => {
            raw.to_string()
        },
        other => return Err(mismatch("string", other)),
    };
    if text.len() > max_length {
        return Err(Rejection::TooLong {
            len: text.len(),
            max: max_length,
        });
    }
    Ok(Coerced::exact(FieldValue::Str(text)))
}

fn array_len(raw: &FieldValue) -> Outcome<usize> {
    match raw {
        FieldValue::IntArray(items) => Ok(items.len()),
        FieldValue::FloatArray(items) => Ok(items.len()),
        FieldValue::StrArray(items) => Ok(items.len()),
        other => Err(mismatch("array", other)),
    }
}

fn check_element(text: String) -> Outcome<String> {
    if text.len() > MAX_ELEMENT_LENGTH {
        return Err(Rejection::TooLong {
            len: text.len(),
            max: MAX_ELEMENT_LENGTH,
        });
    }
    Ok(text)
}

fn coerce_array(element: ElementType, length: usize, raw: &FieldValue) -> Outcome<Coerced> {
    let got = array_len(raw)?;
    if got != length {
        return Err(Rejection::LengthMismatch {
            got,
            expected: length,
        });
    }

    let value = match (element, raw) {
        (ElementType::Long, FieldValue::IntArray(items)) => FieldValue::IntArray(items.clone()),
        (ElementType::Long, FieldValue::FloatArray(items)) => FieldValue::IntArray(
            items
                .iter()
                .map(|v| float_to_integer(*v))
                .collect::<Outcome<_>>()?,
        ),
        (ElementType::Long, FieldValue::StrArray(items)) => FieldValue::IntArray(
            items
                .iter()
                .map(|s| parse_integer(s, raw))
                .collect::<Outcome<_>>()?,
        ),
        (ElementType::Float, FieldValue::FloatArray(items)) => {
            if items.iter().any(|v| !v.is_finite()) {
                return Err(Rejection::NotFinite);
            }
            FieldValue::FloatArray(items.clone())
        },
        (ElementType::Float, FieldValue::IntArray(items)) => {
            FieldValue::FloatArray(items.iter().map(|v| *v as f64).collect())
        },
        (ElementType::Float, FieldValue::StrArray(items)) => FieldValue::FloatArray(
            items
                .iter()
                .map(|s| parse_float(s, raw))
                .collect::<Outcome<_>>()?,
        ),
        (ElementType::String, FieldValue::StrArray(items)) => FieldValue::StrArray(
            items
                .iter()
                .cloned()
                .map(check_element)
                .collect::<Outcome<_>>()?,
        ),
        (ElementType::String, FieldValue::IntArray(items)) => {
            FieldValue::StrArray(items.iter().map(ToString::to_string).collect())
        },
        (ElementType::String, FieldValue::FloatArray(items)) => {
            FieldValue::StrArray(items.iter().map(ToString::to_string).collect())
        },
        (_, other) => return Err(mismatch("array", other)),
    };
    Ok(Coerced::exact(value))
}

/// Coerce `raw` for a field of `kind`
///
/// With `allow_clamp` unset, fields configured to clamp still reject
/// out-of-range values (used to validate defaults).
pub(crate) fn coerce_value(kind: &FieldKind, raw: &FieldValue, allow_clamp: bool) -> Outcome<Coerced> {
    match kind {
        FieldKind::Enum { choices } => coerce_enum(choices, raw),
        FieldKind::Boolean { zname, oname, .. } => coerce_boolean(zname, oname, raw),
        FieldKind::Integer {
            min, max, clamp, ..
        } => {
            let value = to_integer(raw)?;
            if value < *min || value > *max {
                if *clamp && allow_clamp {
                    return Ok(Coerced {
                        value: FieldValue::Int(value.clamp(*min, *max)),
                        clamped: true,
                    });
                }
                return Err(out_of_range(value, min, max));
            }
            Ok(Coerced::exact(FieldValue::Int(value)))
        },
        FieldKind::Float {
            min, max, clamp, ..
        } => {
            let value = to_float(raw)?;
            if value < *min || value > *max {
                if *clamp && allow_clamp {
                    return Ok(Coerced {
                        value: FieldValue::Float(value.clamp(*min, *max)),
                        clamped: true,
                    });
                }
                return Err(out_of_range(value, min, max));
            }
            Ok(Coerced::exact(FieldValue::Float(value)))
        },
        FieldKind::String { max_length } => coerce_string(*max_length, raw),
        FieldKind::Array { element, length } => coerce_array(*element, *length, raw),
        FieldKind::Calc(_) | FieldKind::CalcOut { .. } => Err(Rejection::ReadOnly),
    }
}
