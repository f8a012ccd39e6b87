//! Softdev Field Library
//!
//! Typed field definitions for soft device models. This library provides
//! pure schema logic without runtime or network dependencies.
//!
//! # Modules
//!
//! - `value`: values, severities and array element types
//! - `descriptor`: field descriptors and their builder
//! - `coerce`: conversion of proposed values into a field's type
//! - `link`: calc input bindings and calcout outputs
//! - `db`: EPICS database record rendering
//! - `config`: serde field definitions for configuration files
//! - `validation`: naming rules
//!
//! # Example
//!
//! ```
//! use softdev_fields::{FieldDescriptor, FieldValue};
//!
//! let mode = FieldDescriptor::enumeration("mode", ["Off", "Low", "High"])
//!     .description("Fan mode")
//!     .build()
//!     .unwrap();
//!
//! let coerced = mode.coerce(&FieldValue::from("High")).unwrap();
//! assert_eq!(coerced.value, FieldValue::Enum(2));
//! assert!(mode.coerce(&FieldValue::Int(3)).is_err());
//! assert!(mode.db_record().starts_with("record(mbbo, \"$(device):mode\")"));
//! ```

pub mod coerce;
pub mod config;
pub mod db;
pub mod descriptor;
pub mod error;
pub mod link;
pub mod validation;
pub mod value;

// Re-exports for convenience
pub use coerce::{Coerced, Rejection};
pub use config::{FieldSpec, NamedFieldSpec};
pub use db::DEVICE_MACRO;
pub use descriptor::{FieldBuilder, FieldDescriptor, FieldKind};
pub use error::{FieldError, Result};
pub use link::{CalcSpec, InputLink, OutputOption, OutputSpec, SeverityMode};
pub use validation::{validate_device_name, validate_field_name, validate_link_target};
pub use value::{ElementType, FieldValue, Severity};
