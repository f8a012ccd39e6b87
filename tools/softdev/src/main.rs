//! softdev - soft IOC runner and diagnostic client
//!
//! Serves the models of a configuration file over the TCP transport,
//! renders their EPICS database files, and talks to a running server.

mod db;
mod pv;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use softdev_common::{load_config, logging, LogConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "softdev")]
#[command(about = "Soft device IOC runner and diagnostic client")]
#[command(long_about = "Soft device IOC runner and diagnostic client

Server:
  run         Serve every configured model over TCP
  db          Write EPICS database and startup files for configured models
  check       Validate the configuration and every field definition

Client:
  get         Read a variable from a running server
  put         Write a variable on a running server
  monitor     Print changes of a variable until interrupted

Examples:
  softdev -c shutter.yaml run                 # Serve models
  softdev -c shutter.yaml db --out dbcache    # Render databases
  softdev get SHT1:state                      # Read a variable
  softdev put SHT1:open true                  # Write a variable

Use 'softdev <command> --help' for more information on a specific command.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long = "config", global = true, env = "SOFTDEV_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    // === Server Commands ===
    /// Serve every configured model over TCP
    Run {
        /// Listen address, overrides `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Write `<model>.db` and `<device>.cmd` files
    Db {
        /// Only this device
        #[arg(short, long)]
        device: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "__dbcache__")]
        out: PathBuf,
    },

    /// Validate the configuration and every field definition
    Check,

    // === Client Commands ===
    /// Read a variable
    Get {
        /// Published name, e.g. SHT1:state
        name: String,

        /// Server address
        #[arg(short, long, default_value = softdev_common::config::DEFAULT_BIND)]
        addr: String,
    },

    /// Write a variable
    Put {
        /// Published name, e.g. SHT1:open
        name: String,

        /// New value; `[1, 2]` for arrays
        value: String,

        /// Server address
        #[arg(short, long, default_value = softdev_common::config::DEFAULT_BIND)]
        addr: String,
    },

    /// Print changes of a variable until interrupted
    Monitor {
        /// Published name
        name: String,

        /// Server address
        #[arg(short, long, default_value = softdev_common::config::DEFAULT_BIND)]
        addr: String,
    },
}

/// Console logging for the client commands, which have no config file
fn client_logging(verbose: bool) -> Result<()> {
    let config = LogConfig {
        level: if verbose { "debug" } else { "warn" }.to_string(),
        ..LogConfig::default()
    };
    logging::init(&config)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Run { bind } => {
            let mut config = load_config(cli.config.as_deref())?;
            if cli.verbose {
                config.logging.level = "debug".to_string();
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            logging::init(&config.logging)?;
            server::run(config).await
        },
        Commands::Db { device, out } => {
            client_logging(cli.verbose)?;
            let config = load_config(cli.config.as_deref())?;
            for path in db::write_files(&config, device.as_deref(), &out)? {
                println!("{} {}", "Wrote".bright_green(), path.display());
            }
            Ok(())
        },
        Commands::Check => {
            client_logging(cli.verbose)?;
            let config = load_config(cli.config.as_deref())?;
            db::print_check(&config)
        },
        Commands::Get { name, addr } => {
            client_logging(cli.verbose)?;
            pv::get(&addr, &name).await
        },
        Commands::Put { name, value, addr } => {
            client_logging(cli.verbose)?;
            pv::put(&addr, &name, &value).await
        },
        Commands::Monitor { name, addr } => {
            client_logging(cli.verbose)?;
            pv::monitor(&addr, &name).await
        },
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_put_with_global_options() {
        let cli = Cli::try_parse_from([
            "softdev", "put", "SHT1:open", "true", "--addr", "10.0.0.5:5070", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Put { name, value, addr } => {
                assert_eq!(name, "SHT1:open");
                assert_eq!(value, "true");
                assert_eq!(addr, "10.0.0.5:5070");
            },
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn test_db_defaults() {
        let cli = Cli::try_parse_from(["softdev", "-c", "ioc.yaml", "db"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ioc.yaml")));
        match cli.command {
            Commands::Db { device, out } => {
                assert!(device.is_none());
                assert_eq!(out, PathBuf::from("__dbcache__"));
            },
            _ => panic!("expected db"),
        }
    }
}
