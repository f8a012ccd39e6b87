//! softdev-calc - Expression language for calculation records
//!
//! Compiles and evaluates the restricted expressions used by Calc and CalcOut
//! records. Operands are single letters `A`..`L`, each bound to one record input.
//!
//! # Example
//!
//! ```rust
//! use softdev_calc::Expression;
//! use std::collections::HashMap;
//!
//! let expr = Expression::parse("A + B").unwrap();
//! assert_eq!(expr.operands().collect::<Vec<_>>(), vec!['A', 'B']);
//!
//! let mut inputs = HashMap::new();
//! inputs.insert('A', 3.0);
//! inputs.insert('B', 4.0);
//! assert_eq!(expr.evaluate(&inputs).unwrap(), 7.0);
//! ```
//!
//! # Operators
//!
//! | Group | Operators |
//! |-------|-----------|
//! | Arithmetic | `+` `-` `*` `/` `( )` |
//! | Comparison | `<` `>` `<=` `>=` `==` (`=`) `!=` (`#`) |
//! | Logic | `AND` (`&&`) `OR` (`\|\|`) `NOT` (`!`) |
//! | Conditional | `cond ? a : b` |

pub mod error;
pub mod evaluator;
pub mod parser;

// Re-exports for convenience
pub use error::{CalcError, Result};
pub use evaluator::Expression;

/// Operand letters available to an expression, one per record input
pub const OPERANDS: [char; 12] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L'];

/// Maximum expression length in characters
pub const MAX_EXPRESSION_LENGTH: usize = 256;

/// Maximum parenthesis nesting depth
pub const MAX_NESTING_DEPTH: usize = 10;

/// Whether `c` names an operand
pub fn is_operand(c: char) -> bool {
    OPERANDS.contains(&c)
}
