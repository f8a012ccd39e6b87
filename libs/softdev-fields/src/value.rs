//! Core value types shared by descriptors, records and transports

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Alarm severity
// ============================================================================

/// Alarm severity of a record's current value
///
/// Ordered from least to most severe, so `max()` gives the escalated severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    #[serde(rename = "NONE", alias = "none")]
    None,
    #[serde(rename = "MINOR", alias = "minor")]
    Minor,
    #[serde(rename = "MAJOR", alias = "major")]
    Major,
    #[serde(rename = "INVALID", alias = "invalid")]
    Invalid,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" | "NO_ALARM" => Ok(Severity::None),
            "MINOR" => Ok(Severity::Minor),
            "MAJOR" => Ok(Severity::Major),
            "INVALID" => Ok(Severity::Invalid),
            _ => Err(format!(
                "Invalid severity: '{}'. Valid values: NONE, MINOR, MAJOR, INVALID",
                s
            )),
        }
    }
}

// ============================================================================
// Array element type
// ============================================================================

/// Element type of an array field, named after the EPICS `FTVL` menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "LONG", alias = "long", alias = "int", alias = "integer")]
    Long,
    #[serde(rename = "FLOAT", alias = "float", alias = "DOUBLE", alias = "double")]
    Float,
    #[serde(rename = "STRING", alias = "string", alias = "str")]
    String,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Long => "LONG",
            ElementType::Float => "FLOAT",
            ElementType::String => "STRING",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Field values
// ============================================================================

/// A value held by a record or proposed in a put
///
/// Proposed values may be of any variant; the field descriptor's `coerce`
/// turns them into the variant matching the field kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    /// Index into the choice list of an enum field
    Enum(u16),
    Int(i64),
    Float(f64),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StrArray(Vec<String>),
}

impl FieldValue {
    /// Short name of the variant, used in rejection messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Enum(_) => "enum",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Str(_) => "string",
            FieldValue::IntArray(_) => "int array",
            FieldValue::FloatArray(_) => "float array",
            FieldValue::StrArray(_) => "string array",
        }
    }

    /// Numeric view of a scalar value; strings and arrays have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Enum(i) => Some(f64::from(*i)),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Enum(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            FieldValue::IntArray(_) | FieldValue::FloatArray(_) | FieldValue::StrArray(_)
        )
    }

    /// Parse the textual form produced by `Display`
    ///
    /// Used by text protocols and the command line. `true`/`false` become
    /// booleans, integers and floats become numbers, `[a, b]` becomes the
    /// narrowest array type holding every element, anything else a string.
    /// The field descriptor converts the result to the field's own type.
    pub fn parse_text(text: &str) -> FieldValue {
        let trimmed = text.trim();
        if let Some(inner) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let items: Vec<&str> = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(str::trim).collect()
            };
            if let Ok(ints) = items.iter().map(|s| s.parse()).collect::<Result<Vec<i64>, _>>() {
                return FieldValue::IntArray(ints);
            }
            if let Ok(floats) = items.iter().map(|s| s.parse()).collect::<Result<Vec<f64>, _>>() {
                return FieldValue::FloatArray(floats);
            }
            return FieldValue::StrArray(
                items
                    .iter()
                    .map(|s| s.trim_matches('"').to_string())
                    .collect(),
            );
        }

        match trimmed {
            "true" => return FieldValue::Bool(true),
            "false" => return FieldValue::Bool(false),
            _ => {},
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return FieldValue::Int(i);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return FieldValue::Float(v);
        }
        FieldValue::Str(text.to_string())
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str("]")
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Enum(i) => write!(f, "{}", i),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::IntArray(items) => write_list(f, items),
            FieldValue::FloatArray(items) => write_list(f, items),
            FieldValue::StrArray(items) => write_list(f, items),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(value: Vec<i64>) -> Self {
        FieldValue::IntArray(value)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(value: Vec<f64>) -> Self {
        FieldValue::FloatArray(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::StrArray(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::StrArray(value.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::None < Severity::Minor);
        assert!(Severity::Major < Severity::Invalid);
        assert_eq!(Severity::Minor.max(Severity::Major), Severity::Major);
        assert_eq!(Severity::default(), Severity::None);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("invalid".parse::<Severity>().unwrap(), Severity::Invalid);
        assert_eq!("NO_ALARM".parse::<Severity>().unwrap(), Severity::None);
        assert!("loud".parse::<Severity>().is_err());
        assert_eq!(Severity::Major.to_string(), "MAJOR");
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(FieldValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(FieldValue::Enum(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Int(-2).as_f64(), Some(-2.0));
        assert_eq!(FieldValue::from("1.5").as_f64(), None);
        assert_eq!(FieldValue::IntArray(vec![1]).as_f64(), None);
    }

    #[test]
    fn test_display_and_parse_text() {
        let cases = [
            FieldValue::Bool(false),
            FieldValue::Int(-42),
            FieldValue::Float(2.5),
            FieldValue::IntArray(vec![1, 2, 3]),
            FieldValue::FloatArray(vec![0.5, 1.25]),
            FieldValue::StrArray(vec!["a".into(), "b c".into()]),
            FieldValue::Str("hello world".into()),
        ];
        for value in cases {
            assert_eq!(FieldValue::parse_text(&value.to_string()), value);
        }
    }

    #[test]
    fn test_parse_text_edge_cases() {
        assert_eq!(FieldValue::parse_text("[]"), FieldValue::IntArray(vec![]));
        assert_eq!(FieldValue::parse_text(" 7 "), FieldValue::Int(7));
        assert_eq!(
            FieldValue::parse_text("[1, 2.5]"),
            FieldValue::FloatArray(vec![1.0, 2.5])
        );
        assert_eq!(
            FieldValue::parse_text("[\"x\", y]"),
            FieldValue::StrArray(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn test_element_type_serde_aliases() {
        let parsed: ElementType = serde_json::from_str("\"int\"").unwrap();
        assert_eq!(parsed, ElementType::Long);
        let parsed: ElementType = serde_json::from_str("\"str\"").unwrap();
        assert_eq!(parsed, ElementType::String);
        assert_eq!(serde_json::to_string(&ElementType::Float).unwrap(), "\"FLOAT\"");
    }
}
