//! Client commands against a running server

use anyhow::{Context, Result};
use colored::*;
use softdev_common::wait_for_shutdown;
use softdev_fields::{FieldValue, Severity};
use softdev_transport::TcpClient;

fn severity_label(severity: Severity) -> ColoredString {
    let text = severity.to_string();
    match severity {
        Severity::None => text.green(),
        Severity::Minor => text.yellow(),
        Severity::Major | Severity::Invalid => text.red(),
    }
}

async fn connect(addr: &str) -> Result<TcpClient> {
    TcpClient::connect(addr)
        .await
        .with_context(|| format!("connecting to {}", addr))
}

pub async fn get(addr: &str, name: &str) -> Result<()> {
    let snapshot = connect(addr).await?.get(name).await?;
    println!("{} = {} [{}]", name.bold(), snapshot.value, severity_label(snapshot.severity));
    Ok(())
}

pub async fn put(addr: &str, name: &str, value: &str) -> Result<()> {
    let value = FieldValue::parse_text(value);
    let mut client = connect(addr).await?;
    client.put(name, &value).await?;
    let snapshot = client.get(name).await?;
    println!(
        "{} {} = {} [{}]",
        "✓".green(),
        name.bold(),
        snapshot.value,
        severity_label(snapshot.severity)
    );
    Ok(())
}

pub async fn monitor(addr: &str, name: &str) -> Result<()> {
    let mut monitor = connect(addr).await?.monitor(name).await?;
    println!(
        "{} = {} [{}]",
        name.bold(),
        monitor.initial.value,
        severity_label(monitor.initial.severity)
    );

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            event = monitor.next() => match event {
                Some(Ok(change)) => println!(
                    "{} = {} [{}]",
                    change.name.bold(),
                    change.value,
                    severity_label(change.severity)
                ),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    println!("{}", "Server closed the connection".yellow());
                    return Ok(());
                },
            },
        }
    }
}
