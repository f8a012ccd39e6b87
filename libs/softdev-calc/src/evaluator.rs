//! Expression - compiled calc expression and its evaluator
//!
//! Provides evaluation with support for:
//! - Arithmetic: +, -, *, /
//! - Comparison: <, >, <=, >=, ==, !=
//! - Logic: AND, OR, NOT
//! - Conditional select: c ? a : b
//!
//! All values are `f64`. Zero is false, anything else is true; comparisons
//! and logic operators produce 1.0 or 0.0.

use crate::error::{CalcError, Result};
use crate::parser::{self, BinaryOp, Node, UnaryOp};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Compiled calc expression
///
/// # Example
/// ```
/// use softdev_calc::Expression;
/// use std::collections::HashMap;
///
/// let expr = Expression::parse("A > B ? A - B : 0").unwrap();
/// let mut inputs = HashMap::new();
/// inputs.insert('A', 10.0);
/// inputs.insert('B', 4.0);
/// assert_eq!(expr.evaluate(&inputs).unwrap(), 6.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
    operands: BTreeSet<char>,
}

impl Expression {
    /// Compile an expression, checking syntax and limits
    pub fn parse(source: &str) -> Result<Self> {
        let root = parser::parse(source)?;
        let mut found = Vec::new();
        root.collect_operands(&mut found);
        Ok(Self {
            source: source.trim().to_string(),
            root,
            operands: found.into_iter().collect(),
        })
    }

    /// Expression text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Operand letters referenced by the expression, in alphabetical order
    pub fn operands(&self) -> impl Iterator<Item = char> + '_ {
        self.operands.iter().copied()
    }

    /// Whether the expression references `letter`
    pub fn references(&self, letter: char) -> bool {
        self.operands.contains(&letter)
    }

    /// Evaluate with the given operand values
    ///
    /// Only the branch selected by a conditional, and only the operands an
    /// `AND`/`OR` actually needs, are read; an unread missing input is not an error.
    pub fn evaluate(&self, inputs: &HashMap<char, f64>) -> Result<f64> {
        let value = eval(&self.root, inputs)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(CalcError::NonFinite)
        }
    }
}

impl FromStr for Expression {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn truthy(value: f64) -> bool {
    value != 0.0
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn eval(node: &Node, inputs: &HashMap<char, f64>) -> Result<f64> {
    match node {
        Node::Literal(value) => Ok(*value),
        Node::Operand(letter) => inputs
            .get(letter)
            .copied()
            .ok_or(CalcError::MissingInput(*letter)),
        Node::Unary(op, inner) => {
            let value = eval(inner, inputs)?;
            Ok(match op {
                UnaryOp::Neg => -value,
                UnaryOp::Not => flag(!truthy(value)),
            })
        },
        Node::Binary(BinaryOp::And, lhs, rhs) => {
            if !truthy(eval(lhs, inputs)?) {
                return Ok(0.0);
            }
            Ok(flag(truthy(eval(rhs, inputs)?)))
        },
        Node::Binary(BinaryOp::Or, lhs, rhs) => {
            if truthy(eval(lhs, inputs)?) {
                return Ok(1.0);
            }
            Ok(flag(truthy(eval(rhs, inputs)?)))
        },
        Node::Binary(op, lhs, rhs) => {
            let a = eval(lhs, inputs)?;
            let b = eval(rhs, inputs)?;
            Ok(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    a / b
                },
                BinaryOp::Lt => flag(a < b),
                BinaryOp::Gt => flag(a > b),
                BinaryOp::Le => flag(a <= b),
                BinaryOp::Ge => flag(a >= b),
                BinaryOp::Eq => flag(a == b),
                BinaryOp::Ne => flag(a != b),
                BinaryOp::And => flag(truthy(a) && truthy(b)),
                BinaryOp::Or => flag(truthy(a) || truthy(b)),
            })
        },
        Node::Select {
            condition,
            then,
            otherwise,
        } => {
            if truthy(eval(condition, inputs)?) {
                eval(then, inputs)
            } else {
                eval(otherwise, inputs)
            }
        },
    }
}
