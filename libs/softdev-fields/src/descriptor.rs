//! Field descriptors and their builder
//!
//! A [`FieldDescriptor`] is the immutable schema of one record: name, kind,
//! kind-specific constraints and default value. Descriptors are created
//! through [`FieldBuilder`], which validates everything in `build()`:
//!
//! ```
//! use softdev_fields::{FieldDescriptor, FieldValue};
//!
//! let speed = FieldDescriptor::integer("speed")
//!     .description("Motor speed")
//!     .int_range(0, 3000)
//!     .units("rpm")
//!     .build()
//!     .unwrap();
//!
//! assert!(speed.coerce(&FieldValue::Int(1500)).is_ok());
//! assert!(speed.coerce(&FieldValue::Int(3001)).is_err());
//! ```

use crate::coerce::{coerce_value, Coerced, Rejection};
use crate::error::{FieldError, Result};
use crate::link::{CalcSpec, OutputOption, OutputSpec};
use crate::validation::{validate_field_name, validate_link_target};
use crate::value::{ElementType, FieldValue};
use std::time::Duration;

/// Multi-bit records have 16 state slots (ZR..FF)
pub const MAX_ENUM_CHOICES: usize = 16;
/// Longest state label a multi-bit record can hold
pub const MAX_CHOICE_LENGTH: usize = 25;
/// Default maximum length of a string field
pub const DEFAULT_STRING_LENGTH: usize = 20;
/// Longest element of a string array
pub const MAX_ELEMENT_LENGTH: usize = 40;

pub const DEFAULT_INTEGER_MIN: i64 = -1_000_000;
pub const DEFAULT_INTEGER_MAX: i64 = 1_000_000;
pub const DEFAULT_FLOAT_MIN: f64 = -1e10;
pub const DEFAULT_FLOAT_MAX: f64 = 1e10;
pub const DEFAULT_PRECISION: u8 = 4;

/// Auto-reset delay of a toggle field
pub const DEFAULT_TOGGLE_HIGH: Duration = Duration::from_millis(250);

/// Kind-specific constraints of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Enum {
        choices: Vec<String>,
    },
    Boolean {
        zname: String,
        oname: String,
        /// Return to `false` this long after `true` was accepted
        high: Option<Duration>,
    },
    Integer {
        min: i64,
        max: i64,
        units: String,
        clamp: bool,
    },
    Float {
        min: f64,
        max: f64,
        precision: u8,
        units: String,
        clamp: bool,
    },
    String {
        max_length: usize,
    },
    Array {
        element: ElementType,
        length: usize,
    },
    Calc(CalcSpec),
    CalcOut {
        calc: CalcSpec,
        output: OutputSpec,
    },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Enum { .. } => "enum",
            FieldKind::Boolean { .. } => "boolean",
            FieldKind::Integer { .. } => "integer",
            FieldKind::Float { .. } => "float",
            FieldKind::String { .. } => "string",
            FieldKind::Array { .. } => "array",
            FieldKind::Calc(_) => "calc",
            FieldKind::CalcOut { .. } => "calcout",
        }
    }

    /// Value a freshly built field starts with when no default is given
    fn natural_default(&self) -> FieldValue {
        match self {
            FieldKind::Enum { .. } => FieldValue::Enum(0),
            FieldKind::Boolean { .. } => FieldValue::Bool(false),
            FieldKind::Integer { min, max, .. } => FieldValue::Int(0.clamp(*min, *max)),
            FieldKind::Float { min, max, .. } => FieldValue::Float(0.0_f64.clamp(*min, *max)),
            FieldKind::String { .. } => FieldValue::Str(String::new()),
            FieldKind::Array { element, length } => match element {
                ElementType::Long => FieldValue::IntArray(vec![0; *length]),
                ElementType::Float => FieldValue::FloatArray(vec![0.0; *length]),
                ElementType::String => FieldValue::StrArray(vec![String::new(); *length]),
            },
            FieldKind::Calc(_) | FieldKind::CalcOut { .. } => FieldValue::Float(0.0),
        }
    }
}

/// Immutable schema of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    description: String,
    kind: FieldKind,
    default: FieldValue,
    raw: bool,
}

impl FieldDescriptor {
    pub fn enumeration<I, S>(name: impl Into<String>, choices: I) -> FieldBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldBuilder::plain(
            name,
            FieldKind::Enum {
                choices: choices.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn boolean(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::plain(
            name,
            FieldKind::Boolean {
                zname: String::new(),
                oname: String::new(),
                high: None,
            },
        )
    }

    /// Boolean that resets itself after [`DEFAULT_TOGGLE_HIGH`]
    pub fn toggle(name: impl Into<String>) -> FieldBuilder {
        Self::boolean(name).high(DEFAULT_TOGGLE_HIGH)
    }

    pub fn integer(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::plain(
            name,
            FieldKind::Integer {
                min: DEFAULT_INTEGER_MIN,
                max: DEFAULT_INTEGER_MAX,
                units: String::new(),
                clamp: false,
            },
        )
    }

    /// Float fields use the raw soft channel unless told otherwise
    pub fn float(name: impl Into<String>) -> FieldBuilder {
        let mut builder = FieldBuilder::plain(
            name,
            FieldKind::Float {
                min: DEFAULT_FLOAT_MIN,
                max: DEFAULT_FLOAT_MAX,
                precision: DEFAULT_PRECISION,
                units: String::new(),
                clamp: false,
            },
        );
        builder.raw = true;
        builder
    }

    pub fn string(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder::plain(
            name,
            FieldKind::String {
                max_length: DEFAULT_STRING_LENGTH,
            },
        )
    }

    pub fn array(name: impl Into<String>, element: ElementType, length: usize) -> FieldBuilder {
        FieldBuilder::plain(name, FieldKind::Array { element, length })
    }

    pub fn calc(name: impl Into<String>, expression: impl Into<String>) -> FieldBuilder {
        FieldBuilder::calc(name, expression.into(), None)
    }

    pub fn calcout(
        name: impl Into<String>,
        expression: impl Into<String>,
        out: impl Into<String>,
    ) -> FieldBuilder {
        FieldBuilder::calc(name, expression.into(), Some(out.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Initial value of records built from this descriptor
    pub fn default_value(&self) -> &FieldValue {
        &self.default
    }

    /// Whether the database record uses the raw soft channel device support
    pub fn raw(&self) -> bool {
        self.raw
    }

    /// Calc and calcout fields compute their value and reject external puts
    pub fn is_calculated(&self) -> bool {
        self.calc_spec().is_some()
    }

    pub fn calc_spec(&self) -> Option<&CalcSpec> {
        match &self.kind {
            FieldKind::Calc(calc) | FieldKind::CalcOut { calc, .. } => Some(calc),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&OutputSpec> {
        match &self.kind {
            FieldKind::CalcOut { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Auto-reset delay of a boolean field
    pub fn high(&self) -> Option<Duration> {
        match &self.kind {
            FieldKind::Boolean { high, .. } => *high,
            _ => None,
        }
    }

    /// Display precision of float and calc fields
    pub fn precision(&self) -> Option<u8> {
        match &self.kind {
            FieldKind::Float { precision, .. } => Some(*precision),
            _ => self.calc_spec().map(|calc| calc.precision),
        }
    }

    /// Convert a proposed value to this field's type and check constraints
    ///
    /// Calc fields reject every value: their records are written only by
    /// the calculation engine (see [`FieldDescriptor::check_output`]).
    pub fn coerce(&self, raw: &FieldValue) -> std::result::Result<Coerced, Rejection> {
        coerce_value(&self.kind, raw, true)
    }

    /// Validate a computed calc result against the configured output limits
    pub fn check_output(&self, result: f64) -> std::result::Result<f64, Rejection> {
        if !result.is_finite() {
            return Err(Rejection::NotFinite);
        }
        if let Some((lo, hi)) = self.calc_spec().and_then(|calc| calc.limits) {
            if result < lo || result > hi {
                return Err(Rejection::OutOfRange {
                    value: result.to_string(),
                    min: lo.to_string(),
                    max: hi.to_string(),
                });
            }
        }
        Ok(result)
    }

    /// Render a value for display
    ///
    /// Floats are rounded to the field precision here only; stored values
    /// keep full precision.
    pub fn format_value(&self, value: &FieldValue) -> String {
        match (&self.kind, value) {
            (FieldKind::Enum { choices }, FieldValue::Enum(index)) => choices
                .get(usize::from(*index))
                .cloned()
                .unwrap_or_else(|| index.to_string()),
            (FieldKind::Boolean { zname, oname, .. }, FieldValue::Bool(flag)) => {
                let label = if *flag { oname } else { zname };
                if label.is_empty() || zname == oname {
                    flag.to_string()
                } else {
                    label.clone()
                }
            },
            (FieldKind::Integer { units, .. }, FieldValue::Int(v)) => with_units(v.to_string(), units),
            (
                FieldKind::Float {
                    precision, units, ..
                },
                FieldValue::Float(v),
            ) => with_units(format!("{:.*}", usize::from(*precision), v), units),
            (FieldKind::Calc(calc) | FieldKind::CalcOut { calc, .. }, FieldValue::Float(v)) => {
                format!("{:.*}", usize::from(calc.precision), v)
            },
            (_, other) => other.to_string(),
        }
    }
}

fn with_units(text: String, units: &str) -> String {
    if units.is_empty() {
        text
    } else {
        format!("{} {}", text, units)
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone)]
struct CalcDraft {
    expression: String,
    inputs: Vec<(char, String)>,
    precision: u8,
    scan: Option<Duration>,
    limits: Option<(f64, f64)>,
    out: Option<String>,
    option: OutputOption,
}

#[derive(Debug, Clone)]
enum Draft {
    Plain(FieldKind),
    Calc(CalcDraft),
}

impl Draft {
    fn kind_name(&self) -> &'static str {
        match self {
            Draft::Plain(kind) => kind.name(),
            Draft::Calc(CalcDraft { out: None, .. }) => "calc",
            Draft::Calc(_) => "calcout",
        }
    }
}

/// Fluent builder for [`FieldDescriptor`]
///
/// Options that do not apply to the field kind are reported by `build()`.
#[derive(Debug, Clone)]
#[must_use]
pub struct FieldBuilder {
    name: String,
    description: String,
    raw: bool,
    draft: Draft,
    default: Option<FieldValue>,
    misuse: Option<FieldError>,
}

impl FieldBuilder {
    fn plain(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            raw: false,
            draft: Draft::Plain(kind),
            default: None,
            misuse: None,
        }
    }

    fn calc(name: impl Into<String>, expression: String, out: Option<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            raw: false,
            draft: Draft::Calc(CalcDraft {
                expression,
                inputs: Vec::new(),
                precision: DEFAULT_PRECISION,
                scan: None,
                limits: None,
                out,
                option: OutputOption::default(),
            }),
            default: None,
            misuse: None,
        }
    }

    fn apply(mut self, option: &'static str, update: impl FnOnce(&mut Draft) -> bool) -> Self {
        if !update(&mut self.draft) && self.misuse.is_none() {
            self.misuse = Some(FieldError::NotApplicable {
                field: self.name.clone(),
                option,
                kind: self.draft.kind_name(),
            });
        }
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Use the raw soft channel device support in the database record
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Initial value; must pass the field's own constraints without clamping
    pub fn default(mut self, value: impl Into<FieldValue>) -> Self {
        if matches!(self.draft, Draft::Calc(_)) {
            return self.apply("default", |_| false);
        }
        self.default = Some(value.into());
        self
    }

    /// State labels shown for `false` and `true`
    pub fn labels(self, zname: impl Into<String>, oname: impl Into<String>) -> Self {
        let (z, o) = (zname.into(), oname.into());
        self.apply("labels", |draft| match draft {
            Draft::Plain(FieldKind::Boolean { zname, oname, .. }) => {
                *zname = z;
                *oname = o;
                true
            },
            _ => false,
        })
    }

    pub fn high(self, duration: Duration) -> Self {
        self.apply("high", |draft| match draft {
            Draft::Plain(FieldKind::Boolean { high, .. }) => {
                *high = Some(duration);
                true
            },
            _ => false,
        })
    }

    pub fn int_range(self, min: i64, max: i64) -> Self {
        self.apply("int_range", |draft| match draft {
            Draft::Plain(FieldKind::Integer { min: lo, max: hi, .. }) => {
                *lo = min;
                *hi = max;
                true
            },
            _ => false,
        })
    }

    pub fn float_range(self, min: f64, max: f64) -> Self {
        self.apply("float_range", |draft| match draft {
            Draft::Plain(FieldKind::Float { min: lo, max: hi, .. }) => {
                *lo = min;
                *hi = max;
                true
            },
            _ => false,
        })
    }

    pub fn precision(self, digits: u8) -> Self {
        self.apply("precision", |draft| match draft {
            Draft::Plain(FieldKind::Float { precision, .. })
            | Draft::Calc(CalcDraft { precision, .. }) => {
                *precision = digits;
                true
            },
            _ => false,
        })
    }

    pub fn units(self, units: impl Into<String>) -> Self {
        let units = units.into();
        self.apply("units", |draft| match draft {
            Draft::Plain(
                FieldKind::Integer { units: u, .. } | FieldKind::Float { units: u, .. },
            ) => {
                *u = units;
                true
            },
            _ => false,
        })
    }

    /// Clamp out-of-range puts to the nearest bound instead of rejecting them
    pub fn clamp(self, enabled: bool) -> Self {
        self.apply("clamp", |draft| match draft {
            Draft::Plain(
                FieldKind::Integer { clamp, .. } | FieldKind::Float { clamp, .. },
            ) => {
                *clamp = enabled;
                true
            },
            _ => false,
        })
    }

    /// Longest accepted string, in bytes
    pub fn max_length(self, length: usize) -> Self {
        self.apply("max_length", |draft| match draft {
            Draft::Plain(FieldKind::String { max_length }) => {
                *max_length = length;
                true
            },
            _ => false,
        })
    }

    /// Bind operand `letter` to a link such as `"4"` or `"counter CP"`
    pub fn input(self, letter: char, link: impl Into<String>) -> Self {
        let link = link.into();
        self.apply("input", |draft| match draft {
            Draft::Calc(calc) => {
                calc.inputs.push((letter, link));
                true
            },
            _ => false,
        })
    }

    /// Re-evaluate periodically in addition to input changes
    pub fn scan(self, period: Duration) -> Self {
        self.apply("scan", |draft| match draft {
            Draft::Calc(calc) => {
                calc.scan = Some(period);
                true
            },
            _ => false,
        })
    }

    /// Results outside `[lo, hi]` count as evaluation failures
    pub fn output_limits(self, lo: f64, hi: f64) -> Self {
        self.apply("output_limits", |draft| match draft {
            Draft::Calc(calc) => {
                calc.limits = Some((lo, hi));
                true
            },
            _ => false,
        })
    }

    pub fn output_option(self, option: OutputOption) -> Self {
        self.apply("output_option", |draft| match draft {
            Draft::Calc(calc) if calc.out.is_some() => {
                calc.option = option;
                true
            },
            _ => false,
        })
    }

    /// Validate everything and produce the descriptor
    pub fn build(self) -> Result<FieldDescriptor> {
        validate_field_name(&self.name)?;
        if let Some(err) = self.misuse {
            return Err(err);
        }

        let name = self.name;
        let kind = match self.draft {
            Draft::Plain(kind) => finish_plain(&name, kind, &self.description)?,
            Draft::Calc(draft) => finish_calc(&name, draft)?,
        };

        let default = match self.default {
            Some(value) => coerce_value(&kind, &value, false)
                .map_err(|reason| FieldError::invalid_default(&name, reason))?
                .value,
            None => kind.natural_default(),
        };

        Ok(FieldDescriptor {
            name,
            description: self.description,
            kind,
            default,
            raw: self.raw,
        })
    }
}

fn finish_plain(name: &str, kind: FieldKind, description: &str) -> Result<FieldKind> {
    match &kind {
        FieldKind::Enum { choices } => {
            if choices.is_empty() {
                return Err(FieldError::invalid(name, "enum needs at least one choice"));
            }
            if choices.len() > MAX_ENUM_CHOICES {
                return Err(FieldError::invalid(
                    name,
                    format!(
                        "{} choices given, at most {} are supported",
                        choices.len(),
                        MAX_ENUM_CHOICES
                    ),
                ));
            }
            for (i, choice) in choices.iter().enumerate() {
                if choice.len() > MAX_CHOICE_LENGTH {
                    return Err(FieldError::invalid(
                        name,
                        format!("choice '{}' exceeds {} bytes", choice, MAX_CHOICE_LENGTH),
                    ));
                }
                if choices[..i].contains(choice) {
                    return Err(FieldError::invalid(
                        name,
                        format!("choice '{}' is listed twice", choice),
                    ));
                }
            }
        },
        FieldKind::Boolean { zname, oname, high } => {
            if high.is_some_and(|h| h.is_zero()) {
                return Err(FieldError::invalid(name, "high duration must be positive"));
            }
            // Unset labels fall back to the description
            let zname = if zname.is_empty() { description } else { zname };
            let oname = if oname.is_empty() { description } else { oname };
            return Ok(FieldKind::Boolean {
                zname: zname.to_string(),
                oname: oname.to_string(),
                high: *high,
            });
        },
        FieldKind::Integer { min, max, .. } => {
            if min > max {
                return Err(FieldError::invalid(
                    name,
                    format!("min {} is greater than max {}", min, max),
                ));
            }
        },
        FieldKind::Float { min, max, .. } => {
            if !(min.is_finite() && max.is_finite()) || min > max {
                return Err(FieldError::invalid(
                    name,
                    format!("[{}, {}] is not an ordered finite range", min, max),
                ));
            }
        },
        FieldKind::String { max_length } => {
            if *max_length == 0 {
                return Err(FieldError::invalid(name, "max_length must be positive"));
            }
        },
        FieldKind::Array { length, .. } => {
            if *length == 0 {
                return Err(FieldError::invalid(name, "array length must be positive"));
            }
        },
        FieldKind::Calc(_) | FieldKind::CalcOut { .. } => {},
    }
    Ok(kind)
}

fn finish_calc(name: &str, draft: CalcDraft) -> Result<FieldKind> {
    let calc = CalcSpec::compile(
        name,
        &draft.expression,
        &draft.inputs,
        draft.precision,
        draft.scan,
        draft.limits,
    )?;
    match draft.out {
        None => Ok(FieldKind::Calc(calc)),
        Some(target) => {
            let target = target.trim().to_string();
            validate_link_target(&target)
                .map_err(|e| FieldError::invalid_link(name, &target, e.to_string()))?;
            Ok(FieldKind::CalcOut {
                calc,
                output: OutputSpec {
                    target,
                    option: draft.option,
                },
            })
        },
    }
}
