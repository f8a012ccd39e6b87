//! EPICS database rendering
//!
//! Each descriptor renders to one record of a `softIoc` database. Record
//! names use the `$(device)` macro so one database serves every device
//! instance of a model.

use crate::descriptor::{FieldDescriptor, FieldKind, DEFAULT_STRING_LENGTH};
use crate::link::{CalcSpec, InputLink};
use crate::value::FieldValue;
use std::fmt::Write;
use std::time::Duration;

/// Device name macro substituted by `dbLoadRecords`
pub const DEVICE_MACRO: &str = "$(device)";

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Qualify a same-model link target with the device macro
fn qualify(target: &str) -> String {
    if target.contains(':') {
        target.to_string()
    } else {
        format!("{}:{}", DEVICE_MACRO, target)
    }
}

fn render_link(link: &InputLink) -> String {
    match link {
        InputLink::Constant(value) => value.to_string(),
        InputLink::Record { target, .. } => {
            let text = link.to_string();
            text.replacen(target.as_str(), &qualify(target), 1)
        },
    }
}

/// Map a scan period onto the periodic scan menu text
fn scan_menu(period: Option<Duration>) -> String {
    match period {
        None => "Passive".to_string(),
        Some(period) => {
            let secs = period.as_secs_f64();
            let text = secs.to_string();
            // The menu spells sub-second periods without a leading zero
            let text = text.strip_prefix("0.").map_or(text.clone(), |rest| format!(".{}", rest));
            format!("{} second", text)
        },
    }
}

fn calc_fields(calc: &CalcSpec, fields: &mut Vec<(String, String)>) {
    fields.push(("CALC".into(), calc.expression.source().to_string()));
    fields.push(("SCAN".into(), scan_menu(calc.scan)));
    fields.push(("PREC".into(), calc.precision.to_string()));
    if let Some((lo, hi)) = calc.limits {
        fields.push(("LOPR".into(), lo.to_string()));
        fields.push(("HOPR".into(), hi.to_string()));
    }
}

fn input_fields(calc: &CalcSpec, fields: &mut Vec<(String, String)>) {
    for (letter, link) in &calc.inputs {
        fields.push((format!("INP{}", letter), render_link(link)));
    }
}

const ENUM_KEYS: [&str; 16] = [
    "ZR", "ON", "TW", "TH", "FR", "FV", "SX", "SV", "EI", "NI", "TE", "EL", "TV", "TT", "FT", "FF",
];

impl FieldDescriptor {
    /// EPICS record type this field renders to
    pub fn record_type(&self) -> &'static str {
        match self.kind() {
            FieldKind::Enum { .. } => "mbbo",
            FieldKind::Boolean { .. } => "bo",
            FieldKind::Integer { .. } => "longout",
            FieldKind::Float { .. } => "ao",
            FieldKind::String { max_length } if *max_length > DEFAULT_STRING_LENGTH => "waveform",
            FieldKind::String { .. } => "stringout",
            FieldKind::Array { .. } => "waveform",
            FieldKind::Calc(_) => "calc",
            FieldKind::CalcOut { .. } => "calcout",
        }
    }

    /// Record fields in rendering order
    pub fn db_fields(&self) -> Vec<(String, String)> {
        let channel = if self.raw() {
            "Raw Soft Channel"
        } else {
            "Soft Channel"
        };
        let mut fields: Vec<(String, String)> = vec![
            ("DTYP".into(), channel.into()),
            ("DESC".into(), self.description().to_string()),
        ];
        let default = self.default_value();

        match self.kind() {
            FieldKind::Enum { choices } => {
                fields.push(("VAL".into(), default.to_string()));
                for (i, (key, label)) in ENUM_KEYS.iter().zip(choices).enumerate() {
                    fields.push((format!("{}VL", key), i.to_string()));
                    fields.push((format!("{}ST", key), label.clone()));
                }
            },
            FieldKind::Boolean { zname, oname, high } => {
                fields.push(("ZNAM".into(), zname.clone()));
                fields.push(("ONAM".into(), oname.clone()));
                if let Some(high) = high {
                    fields.push(("HIGH".into(), high.as_secs_f64().to_string()));
                }
                if default == &FieldValue::Bool(true) {
                    fields.push(("VAL".into(), "1".into()));
                }
            },
            FieldKind::Integer {
                min,
                max,
                units,
                clamp,
            } => {
                fields.push(("HOPR".into(), max.to_string()));
                fields.push(("LOPR".into(), min.to_string()));
                if *clamp {
                    fields.push(("DRVH".into(), max.to_string()));
                    fields.push(("DRVL".into(), min.to_string()));
                }
                fields.push(("VAL".into(), default.to_string()));
                fields.push(("EGU".into(), units.clone()));
            },
            FieldKind::Float {
                min,
                max,
                precision,
                units,
                ..
            } => {
                fields.push(("DRVL".into(), format!("{:.4e}", min)));
                fields.push(("DRVH".into(), format!("{:.4e}", max)));
                fields.push(("LOPR".into(), format!("{:.4e}", min)));
                fields.push(("HOPR".into(), format!("{:.4e}", max)));
                fields.push(("PREC".into(), precision.to_string()));
                fields.push(("EGU".into(), units.clone()));
                fields.push(("VAL".into(), default.to_string()));
            },
            FieldKind::String { max_length } => {
                if *max_length > DEFAULT_STRING_LENGTH {
                    fields.push(("NELM".into(), max_length.to_string()));
                    fields.push(("FTVL".into(), "CHAR".into()));
                } else {
                    fields.push(("VAL".into(), default.to_string()));
                }
            },
            FieldKind::Array { element, length } => {
                fields.push(("NELM".into(), length.to_string()));
                fields.push(("FTVL".into(), element.as_str().into()));
            },
            FieldKind::Calc(calc) => {
                calc_fields(calc, &mut fields);
                input_fields(calc, &mut fields);
            },
            FieldKind::CalcOut { calc, output } => {
                calc_fields(calc, &mut fields);
                fields.push(("OOPT".into(), output.option.menu_index().to_string()));
                fields.push(("DOPT".into(), "0".into()));
                fields.push(("OUT".into(), format!("{} PP", qualify(&output.target))));
                input_fields(calc, &mut fields);
            },
        }
        fields
    }

    /// Full database record text, terminated by a newline
    pub fn db_record(&self) -> String {
        let mut text = format!(
            "record({}, \"{}:{}\") {{\n",
            self.record_type(),
            DEVICE_MACRO,
            self.name()
        );
        for (key, value) in self.db_fields() {
            let _ = writeln!(text, "  field({}, \"{}\")", key, escape(&value));
        }
        text.push_str("}\n");
        text
    }
}
