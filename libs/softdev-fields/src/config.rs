//! Field definitions as they appear in configuration files
//!
//! ```yaml
//! fields:
//!   - name: count
//!     kind: integer
//!     desc: Counter
//!     max: 9
//!   - name: next
//!     kind: calcout
//!     calc: "A >= 9 ? 0 : A + 1"
//!     inputs: { A: count }
//!     out: count
//! ```

use crate::descriptor::{FieldBuilder, FieldDescriptor};
use crate::error::Result;
use crate::link::OutputOption;
use crate::value::ElementType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One field of a model, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldSpec {
    Enum {
        #[serde(default)]
        desc: String,
        choices: Vec<String>,
        #[serde(default)]
        default: Option<String>,
    },
    #[serde(alias = "toggle", alias = "bool")]
    Boolean {
        #[serde(default)]
        desc: String,
        #[serde(default)]
        default: bool,
        #[serde(default)]
        zname: Option<String>,
        #[serde(default)]
        oname: Option<String>,
        /// Auto-reset delay in seconds
        #[serde(default)]
        high: Option<f64>,
    },
    #[serde(alias = "int")]
    Integer {
        #[serde(default)]
        desc: String,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        default: Option<i64>,
        #[serde(default)]
        units: String,
        #[serde(default)]
        clamp: bool,
    },
    Float {
        #[serde(default)]
        desc: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        default: Option<f64>,
        #[serde(default)]
        prec: Option<u8>,
        #[serde(default)]
        units: String,
        #[serde(default)]
        clamp: bool,
        #[serde(default)]
        raw: Option<bool>,
    },
    #[serde(alias = "str")]
    String {
        #[serde(default)]
        desc: String,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(default)]
        default: Option<String>,
    },
    Array {
        #[serde(default)]
        desc: String,
        #[serde(rename = "type")]
        element: ElementType,
        length: usize,
    },
    Calc {
        #[serde(default)]
        desc: String,
        calc: String,
        #[serde(default)]
        inputs: BTreeMap<char, String>,
        #[serde(default)]
        prec: Option<u8>,
        /// Periodic scan in seconds
        #[serde(default)]
        scan: Option<f64>,
        #[serde(default)]
        limits: Option<[f64; 2]>,
    },
    Calcout {
        #[serde(default)]
        desc: String,
        calc: String,
        #[serde(default)]
        inputs: BTreeMap<char, String>,
        #[serde(default)]
        prec: Option<u8>,
        #[serde(default)]
        scan: Option<f64>,
        #[serde(default)]
        limits: Option<[f64; 2]>,
        out: String,
        #[serde(default)]
        oopt: OutputOption,
    },
}

/// A field spec together with its name, as listed in a model's `fields`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedFieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub spec: FieldSpec,
}

impl NamedFieldSpec {
    pub fn build(&self) -> Result<FieldDescriptor> {
        self.spec.build(&self.name)
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        crate::FieldError::invalid(name, format!("{} is not a valid duration in seconds", value))
    })
}

fn apply_calc(
    name: &str,
    mut builder: FieldBuilder,
    desc: &str,
    inputs: &BTreeMap<char, String>,
    prec: Option<u8>,
    scan: Option<f64>,
    limits: Option<[f64; 2]>,
) -> Result<FieldBuilder> {
    builder = builder.description(desc);
    for (letter, link) in inputs {
        builder = builder.input(*letter, link.as_str());
    }
    if let Some(prec) = prec {
        builder = builder.precision(prec);
    }
    if let Some(scan) = scan {
        builder = builder.scan(seconds(name, scan)?);
    }
    if let Some([lo, hi]) = limits {
        builder = builder.output_limits(lo, hi);
    }
    Ok(builder)
}

impl FieldSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldSpec::Enum { .. } => "enum",
            FieldSpec::Boolean { .. } => "boolean",
            FieldSpec::Integer { .. } => "integer",
            FieldSpec::Float { .. } => "float",
            FieldSpec::String { .. } => "string",
            FieldSpec::Array { .. } => "array",
            FieldSpec::Calc { .. } => "calc",
            FieldSpec::Calcout { .. } => "calcout",
        }
    }

    /// Build a validated descriptor named `name`
    pub fn build(&self, name: &str) -> Result<FieldDescriptor> {
        let builder = match self {
            FieldSpec::Enum {
                desc,
                choices,
                default,
            } => {
                let mut builder = FieldDescriptor::enumeration(name, choices.iter().cloned())
                    .description(desc);
                if let Some(default) = default {
                    builder = builder.default(default.as_str());
                }
                builder
            },
            FieldSpec::Boolean {
                desc,
                default,
                zname,
                oname,
                high,
            } => {
                let mut builder = FieldDescriptor::boolean(name)
                    .description(desc)
                    .default(*default);
                if zname.is_some() || oname.is_some() {
                    builder = builder.labels(
                        zname.clone().unwrap_or_default(),
                        oname.clone().unwrap_or_default(),
                    );
                }
                if let Some(high) = high {
                    builder = builder.high(seconds(name, *high)?);
                }
                builder
            },
            FieldSpec::Integer {
                desc,
                min,
                max,
                default,
                units,
                clamp,
            } => {
                let mut builder = FieldDescriptor::integer(name)
                    .description(desc)
                    .int_range(
                        min.unwrap_or(crate::descriptor::DEFAULT_INTEGER_MIN),
                        max.unwrap_or(crate::descriptor::DEFAULT_INTEGER_MAX),
                    )
                    .units(units.as_str())
                    .clamp(*clamp);
                if let Some(default) = default {
                    builder = builder.default(*default);
                }
                builder
            },
            FieldSpec::Float {
                desc,
                min,
                max,
                default,
                prec,
                units,
                clamp,
                raw,
            } => {
                let mut builder = FieldDescriptor::float(name)
                    .description(desc)
                    .float_range(
                        min.unwrap_or(crate::descriptor::DEFAULT_FLOAT_MIN),
                        max.unwrap_or(crate::descriptor::DEFAULT_FLOAT_MAX),
                    )
                    .units(units.as_str())
                    .clamp(*clamp);
                if let Some(default) = default {
                    builder = builder.default(*default);
                }
                if let Some(prec) = prec {
                    builder = builder.precision(*prec);
                }
                if let Some(raw) = raw {
                    builder = builder.raw(*raw);
                }
                builder
            },
            FieldSpec::String {
                desc,
                max_length,
                default,
            } => {
                let mut builder = FieldDescriptor::string(name).description(desc);
                if let Some(max_length) = max_length {
                    builder = builder.max_length(*max_length);
                }
                if let Some(default) = default {
                    builder = builder.default(default.as_str());
                }
                builder
            },
            FieldSpec::Array {
                desc,
                element,
                length,
            } => FieldDescriptor::array(name, *element, *length).description(desc),
            FieldSpec::Calc {
                desc,
                calc,
                inputs,
                prec,
                scan,
                limits,
            } => apply_calc(
                name,
                FieldDescriptor::calc(name, calc.as_str()),
                desc,
                inputs,
                *prec,
                *scan,
                *limits,
            )?,
            FieldSpec::Calcout {
                desc,
                calc,
                inputs,
                prec,
                scan,
                limits,
                out,
                oopt,
            } => apply_calc(
                name,
                FieldDescriptor::calcout(name, calc.as_str(), out.as_str()),
                desc,
                inputs,
                *prec,
                *scan,
                *limits,
            )?
            .output_option(*oopt),
        };
        builder.build()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::descriptor::FieldKind;
    use crate::error::FieldError;
    use crate::value::FieldValue;

    #[test]
    fn test_yaml_field_list() {
        let yaml = r#"
- name: mode
  kind: enum
  desc: Operating mode
  choices: [Off, Low, High]
  default: Low
- name: go
  kind: toggle
  desc: Start
  high: 0.5
- name: count
  kind: integer
  max: 9
  min: 0
- name: wave
  kind: array
  type: float
  length: 4
- name: next
  kind: calcout
  calc: "A >= 9 ? 0 : A + 1"
  inputs:
    A: count
  out: count
  oopt: on_change
"#;
        let specs: Vec<NamedFieldSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs.len(), 5);

        let fields: Vec<FieldDescriptor> = specs.iter().map(|s| s.build().unwrap()).collect();
        assert_eq!(fields[0].default_value(), &FieldValue::Enum(1));
        assert_eq!(fields[1].high(), Some(Duration::from_millis(500)));
        assert!(matches!(
            fields[2].kind(),
            FieldKind::Integer { min: 0, max: 9, .. }
        ));
        assert_eq!(fields[3].record_type(), "waveform");
        assert_eq!(
            fields[4].output().map(|o| o.option),
            Some(OutputOption::OnChange)
        );
    }

    #[test]
    fn test_json_calc_spec() {
        let json = r#"{"name": "sum", "kind": "calc", "calc": "A+B",
                       "inputs": {"A": "x CP", "B": "4"}, "limits": [0, 100]}"#;
        let spec: NamedFieldSpec = serde_json::from_str(json).unwrap();
        let field = spec.build().unwrap();
        assert_eq!(field.calc_spec().and_then(|c| c.limits), Some((0.0, 100.0)));
    }

    #[test]
    fn test_build_reports_definition_errors() {
        let spec = FieldSpec::Integer {
            desc: String::new(),
            min: Some(10),
            max: Some(0),
            default: None,
            units: String::new(),
            clamp: false,
        };
        assert!(matches!(spec.build("x"), Err(FieldError::Invalid { .. })));

        let spec = FieldSpec::Boolean {
            desc: String::new(),
            default: false,
            zname: None,
            oname: None,
            high: Some(-1.0),
        };
        assert!(spec.build("b").is_err());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: std::result::Result<NamedFieldSpec, _> =
            serde_yaml::from_str("name: x\nkind: matrix\n");
        assert!(result.is_err());
    }
}
