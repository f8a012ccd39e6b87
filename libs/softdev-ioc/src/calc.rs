//! Calculation engine for calc and calcout records
//!
//! Processing reads every input, evaluates the expression and commits the
//! result. A failure keeps the previous value and raises the record to
//! INVALID; it never reaches the caller.

use crate::record::Record;
use softdev_calc::CalcError;
use softdev_fields::{
    CalcSpec, FieldValue, InputLink, OutputSpec, Rejection, Severity, SeverityMode,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
enum EvalFailure {
    #[error("input {letter} ({target}) is not available")]
    Missing { letter: char, target: String },

    #[error("input {letter} ({target}) holds a {kind}, not a number")]
    NotNumeric {
        letter: char,
        target: String,
        kind: &'static str,
    },

    #[error(transparent)]
    Expression(#[from] CalcError),

    #[error("result rejected: {0}")]
    Output(#[from] Rejection),
}

/// Published name of a link target seen from `device`
///
/// Bare field names refer to the same model.
pub(crate) fn resolve(device: &str, target: &str) -> String {
    if target.contains(':') {
        target.to_string()
    } else {
        format!("{}:{}", device, target)
    }
}

fn read_inputs(
    record: &Record,
    calc: &CalcSpec,
) -> Result<(HashMap<char, f64>, Severity), EvalFailure> {
    let mut values = HashMap::with_capacity(calc.inputs.len());
    let mut severity = Severity::None;

    for (&letter, link) in &calc.inputs {
        let value = match link {
            InputLink::Constant(value) => *value,
            InputLink::Record {
                target,
                severity: mode,
                ..
            } => {
                let name = resolve(record.device_name(), target);
                let source = record
                    .shared()
                    .directory
                    .lookup(&name)
                    .ok_or(EvalFailure::Missing {
                        letter,
                        target: name.clone(),
                    })?;
                let snapshot = source.snapshot();
                if *mode == SeverityMode::Maximize {
                    severity = severity.max(snapshot.severity);
                }
                snapshot.value.as_f64().ok_or(EvalFailure::NotNumeric {
                    letter,
                    target: name,
                    kind: snapshot.value.type_name(),
                })?
            },
        };
        values.insert(letter, value);
    }
    Ok((values, severity))
}

fn evaluate(record: &Record, calc: &CalcSpec) -> Result<(f64, Severity), EvalFailure> {
    let (inputs, severity) = read_inputs(record, calc)?;
    let result = calc.expression.evaluate(&inputs)?;
    let result = record.descriptor().check_output(result)?;
    Ok((result, severity))
}

/// Evaluate `record` once and commit the outcome
pub(crate) fn process(record: &Arc<Record>) {
    let Some(calc) = record.descriptor().calc_spec() else {
        return;
    };
    if record.is_closed() {
        return;
    }

    match evaluate(record, calc) {
        Ok((result, severity)) => {
            trace!(pv = %record.pv_name(), result, "Calc processed");
            record.commit_if_changed(FieldValue::Float(result), severity);
            if let Some(output) = record.descriptor().output() {
                write_output(record, output, result);
            }
        },
        Err(reason) => {
            warn!(pv = %record.pv_name(), %reason, "Calc evaluation failed");
            let current = record.get();
            record.commit_if_changed(current, Severity::Invalid);
        },
    }
}

fn write_output(record: &Arc<Record>, output: &OutputSpec, result: f64) {
    let previous = record.swap_last_output(result);
    if !output.option.should_write(result, previous) {
        return;
    }
    let name = resolve(record.device_name(), &output.target);
    let Some(target) = record.shared().directory.lookup(&name) else {
        warn!(pv = %record.pv_name(), target = %name, "Calc output target not found");
        return;
    };
    if let Err(failure) = target.try_put(FieldValue::Float(result)) {
        warn!(pv = %record.pv_name(), target = %name, result, ?failure, "Calc output not accepted");
    }
}

/// Process `record` every `period` until `cancel` fires or it is dropped
pub(crate) fn spawn_scan(record: &Arc<Record>, period: Duration, cancel: CancellationToken) {
    let weak: Weak<Record> = Arc::downgrade(record);
    let scheduler = Arc::clone(&record.shared().scheduler);
    let pv = record.pv_name().to_string();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(record) = weak.upgrade() else { break };
                    if !scheduler.post(Box::new(move || process(&record))) {
                        break;
                    }
                },
            }
        }
        debug!(pv = %pv, "Scan stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("SIM", "count"), "SIM:count");
        assert_eq!(resolve("SIM", "OTHER:level"), "OTHER:level");
    }
}
