//! Validation Utilities
//!
//! Pure naming rules for fields, devices and link targets.

use crate::error::{FieldError, Result};

/// Maximum length of a field or device name
pub const MAX_NAME_LENGTH: usize = 60;

fn check_name(what: &str, name: &str, extra: &[char]) -> Result<()> {
    if name.is_empty() {
        return Err(FieldError::InvalidName(format!("{} name cannot be empty", what)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(FieldError::InvalidName(format!(
            "{} name too long ({} characters). Maximum length is {} characters.",
            what,
            name.len(),
            MAX_NAME_LENGTH
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || extra.contains(&c))
    {
        return Err(FieldError::InvalidName(format!(
            "{} name can only contain letters, numbers, underscores and hyphens. Invalid name: '{}'",
            what, name
        )));
    }

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(FieldError::InvalidName(format!(
            "{} name cannot start with a number: '{}'",
            what, name
        )));
    }

    Ok(())
}

/// Validate field name format
///
/// Rules:
/// - Length: 1-60 characters
/// - Characters: alphanumeric, underscore (_), hyphen (-)
/// - Cannot start with a number
///
/// # Examples
/// ```
/// use softdev_fields::validate_field_name;
///
/// assert!(validate_field_name("toggle").is_ok());
/// assert!(validate_field_name("set-point_2").is_ok());
/// assert!(validate_field_name("2fast").is_err());
/// assert!(validate_field_name("bad name").is_err());
/// assert!(validate_field_name("").is_err());
/// ```
pub fn validate_field_name(name: &str) -> Result<()> {
    check_name("Field", name, &[])
}

/// Validate device name format
///
/// Same rules as field names; the device name becomes the prefix of every
/// published variable (`<device>:<field>`).
pub fn validate_device_name(name: &str) -> Result<()> {
    check_name("Device", name, &[])
}

/// Validate the target of an input or output link
///
/// Either a field name of the same model, or a full published name with
/// `:` separators (`OTHER:counter`). Empty segments are rejected.
pub fn validate_link_target(name: &str) -> Result<()> {
    if name.len() > 2 * MAX_NAME_LENGTH + 1 {
        return Err(FieldError::InvalidName(format!(
            "Link target too long: '{}'",
            name
        )));
    }
    for segment in name.split(':') {
        check_name("Link target", segment, &['.'])?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_valid_field_names() {
        assert!(validate_field_name("toggle").is_ok());
        assert!(validate_field_name("_private").is_ok());
        assert!(validate_field_name("a-b_c9").is_ok());
        assert!(validate_field_name(&"x".repeat(60)).is_ok());
    }

    #[test]
    fn test_invalid_field_names() {
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name(&"x".repeat(61)).is_err());
        assert!(validate_field_name("9lives").is_err());
        assert!(validate_field_name("has:colon").is_err());
        assert!(validate_field_name("tab\there").is_err());
    }

    #[test]
    fn test_device_name_uses_same_rules() {
        assert!(validate_device_name("SIM1").is_ok());
        assert!(validate_device_name("SIM 1").is_err());
    }

    #[test]
    fn test_link_targets() {
        assert!(validate_link_target("counter").is_ok());
        assert!(validate_link_target("OTHER:counter").is_ok());
        assert!(validate_link_target("OTHER:counter.VAL").is_ok());
        assert!(validate_link_target("OTHER:").is_err());
        assert!(validate_link_target(":counter").is_err());
    }
}
