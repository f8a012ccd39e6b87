//! Database rendering and configuration checks

use anyhow::{bail, Context, Result};
use colored::*;
use softdev_common::{ModelConfig, SoftdevConfig};
use softdev_ioc::Schema;
use std::path::{Path, PathBuf};

/// Build the schema of one configured model
pub fn schema(model: &ModelConfig) -> Result<Schema> {
    Schema::from_specs(model.name.clone(), &model.fields)
        .with_context(|| format!("model '{}' (device {})", model.name, model.device))
}

fn selected<'a>(config: &'a SoftdevConfig, device: Option<&str>) -> Result<Vec<&'a ModelConfig>> {
    match device {
        Some(device) => match config.model(device) {
            Some(model) => Ok(vec![model]),
            None => bail!("device '{}' is not configured", device),
        },
        None => Ok(config.models.iter().collect()),
    }
}

/// Write `<model>.db` and `<device>.cmd` for every selected model
///
/// Devices sharing a model share its database file.
pub fn write_files(config: &SoftdevConfig, device: Option<&str>, out: &Path) -> Result<Vec<PathBuf>> {
    let models = selected(config, device)?;
    if models.is_empty() {
        bail!("no models configured");
    }
    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;

    let mut written = Vec::new();
    for model in models {
        let schema = schema(model)?;

        let db_path = out.join(format!("{}.db", schema.name()));
        std::fs::write(&db_path, schema.render_db())
            .with_context(|| format!("writing {}", db_path.display()))?;
        if !written.contains(&db_path) {
            written.push(db_path);
        }

        let cmd_path = out.join(format!("{}.cmd", model.device));
        std::fs::write(&cmd_path, schema.render_startup(&model.device))
            .with_context(|| format!("writing {}", cmd_path.display()))?;
        written.push(cmd_path);
    }
    Ok(written)
}

/// Outcome of building one model's schema
pub struct CheckResult {
    pub device: String,
    pub outcome: Result<usize>,
}

pub fn check(config: &SoftdevConfig) -> Vec<CheckResult> {
    config
        .models
        .iter()
        .map(|model| CheckResult {
            device: model.device.clone(),
            outcome: schema(model).map(|s| s.len()),
        })
        .collect()
}

pub fn print_check(config: &SoftdevConfig) -> Result<()> {
    let results = check(config);
    let mut failed = 0;
    for result in &results {
        match &result.outcome {
            Ok(fields) => println!("{} {} ({} fields)", "✓".green(), result.device, fields),
            Err(e) => {
                failed += 1;
                println!("{} {}: {:#}", "✗".red(), result.device, e);
            },
        }
    }
    if failed > 0 {
        bail!("{} of {} models failed validation", failed, results.len());
    }
    println!("{} {} models valid", "OK".bright_green(), results.len());
    Ok(())
}
