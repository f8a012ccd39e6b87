//! Calc input bindings and output targets

use crate::error::{FieldError, Result};
use crate::validation::validate_link_target;
use serde::{Deserialize, Serialize};
use softdev_calc::Expression;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Whether a calc record inherits the severity of an input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SeverityMode {
    /// `NMS`: input severity is ignored
    #[default]
    NoMaximize,
    /// `MS`: record severity is at least the input's severity
    Maximize,
}

/// Source of one calc operand
#[derive(Debug, Clone, PartialEq)]
pub enum InputLink {
    /// Fixed value, written as a plain number
    Constant(f64),
    /// Live value of another record
    Record {
        /// Field name of the same model, or a full `DEVICE:field` name
        target: String,
        /// `CP`: re-evaluate whenever the source changes
        process_on_change: bool,
        severity: SeverityMode,
    },
}

impl InputLink {
    /// Parse link text such as `"4"`, `"counter CP"` or `"SIM:temp CP MS"`
    pub fn parse(field: &str, text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Ok(value) = trimmed.parse::<f64>() {
            if !value.is_finite() {
                return Err(FieldError::invalid_link(field, text, "constant is not finite"));
            }
            return Ok(InputLink::Constant(value));
        }

        let mut parts = trimmed.split_whitespace();
        let target = parts
            .next()
            .ok_or_else(|| FieldError::invalid_link(field, text, "empty link"))?;
        validate_link_target(target)
            .map_err(|e| FieldError::invalid_link(field, text, e.to_string()))?;

        let mut process_on_change = false;
        let mut severity = SeverityMode::NoMaximize;
        for modifier in parts {
            match modifier.to_ascii_uppercase().as_str() {
                "CP" | "CPP" => process_on_change = true,
                "PP" | "NPP" => {},
                "MS" | "MSS" | "MSI" => severity = SeverityMode::Maximize,
                "NMS" => severity = SeverityMode::NoMaximize,
                other => {
                    return Err(FieldError::invalid_link(
                        field,
                        text,
                        format!("unknown modifier '{}'", other),
                    ))
                },
            }
        }

        Ok(InputLink::Record {
            target: target.to_string(),
            process_on_change,
            severity,
        })
    }

    /// Record target, if this link is not a constant
    pub fn target(&self) -> Option<&str> {
        match self {
            InputLink::Constant(_) => None,
            InputLink::Record { target, .. } => Some(target),
        }
    }

    pub fn process_on_change(&self) -> bool {
        matches!(
            self,
            InputLink::Record {
                process_on_change: true,
                ..
            }
        )
    }
}

impl fmt::Display for InputLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputLink::Constant(value) => write!(f, "{}", value),
            InputLink::Record {
                target,
                process_on_change,
                severity,
            } => {
                write!(f, "{}", target)?;
                f.write_str(if *process_on_change { " CP" } else { " NPP" })?;
                f.write_str(match severity {
                    SeverityMode::NoMaximize => " NMS",
                    SeverityMode::Maximize => " MS",
                })
            },
        }
    }
}

/// When a calcout record writes its result to the output target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOption {
    /// After every successful evaluation
    #[default]
    EveryTime,
    /// Only when the result differs from the previous one
    OnChange,
    /// Only when the result is zero
    WhenZero,
    /// Only when the result is not zero
    WhenNonzero,
}

impl OutputOption {
    /// Index into the EPICS `calcoutOOPT` menu
    pub fn menu_index(&self) -> u8 {
        match self {
            OutputOption::EveryTime => 0,
            OutputOption::OnChange => 1,
            OutputOption::WhenZero => 2,
            OutputOption::WhenNonzero => 3,
        }
    }

    /// Decide whether `result` is written, given the previous result if any
    pub fn should_write(&self, result: f64, previous: Option<f64>) -> bool {
        match self {
            OutputOption::EveryTime => true,
            OutputOption::OnChange => previous != Some(result),
            OutputOption::WhenZero => result == 0.0,
            OutputOption::WhenNonzero => result != 0.0,
        }
    }
}

/// Output side of a calcout record
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub target: String,
    pub option: OutputOption,
}

/// Compiled calc definition: expression, bindings and processing options
#[derive(Debug, Clone, PartialEq)]
pub struct CalcSpec {
    pub expression: Expression,
    pub inputs: BTreeMap<char, InputLink>,
    pub precision: u8,
    pub scan: Option<Duration>,
    /// Inclusive bounds on the result; a result outside them is an evaluation failure
    pub limits: Option<(f64, f64)>,
}

impl CalcSpec {
    /// Compile and cross-check a calc definition
    ///
    /// Every operand the expression reads must have a binding, and
    /// bindings may only use the letters A..L.
    pub fn compile(
        field: &str,
        expression: &str,
        inputs: &[(char, String)],
        precision: u8,
        scan: Option<Duration>,
        limits: Option<(f64, f64)>,
    ) -> Result<Self> {
        let expression = Expression::parse(expression).map_err(|source| FieldError::Expression {
            field: field.to_string(),
            source,
        })?;

        let mut bound = BTreeMap::new();
        for (letter, text) in inputs {
            let letter = letter.to_ascii_uppercase();
            if !softdev_calc::is_operand(letter) {
                return Err(FieldError::invalid(
                    field,
                    format!("input letter '{}' is not one of A..L", letter),
                ));
            }
            if bound.insert(letter, InputLink::parse(field, text)?).is_some() {
                return Err(FieldError::invalid(
                    field,
                    format!("input {} is bound twice", letter),
                ));
            }
        }

        if let Some(letter) = expression.operands().find(|l| !bound.contains_key(l)) {
            return Err(FieldError::UnboundOperand {
                field: field.to_string(),
                letter,
            });
        }

        if let Some((lo, hi)) = limits {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(FieldError::invalid(
                    field,
                    format!("output limits [{}, {}] are not an ordered finite range", lo, hi),
                ));
            }
        }

        if scan.is_some_and(|period| period.is_zero()) {
            return Err(FieldError::invalid(field, "scan period must be positive"));
        }

        Ok(Self {
            expression,
            inputs: bound,
            precision,
            scan,
            limits,
        })
    }

    /// Record targets this calc re-evaluates on, with `CP` set
    pub fn triggers(&self) -> impl Iterator<Item = &str> + '_ {
        self.inputs
            .values()
            .filter(|link| link.process_on_change())
            .filter_map(InputLink::target)
    }
}
