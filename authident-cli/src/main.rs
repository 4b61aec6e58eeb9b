//! authident CLI
//!
//! Command-line tool for inspecting credential identity records.
//!
//! # Usage
//!
//! ```bash
//! # Show the native record layout on this target
//! authident layout
//!
//! # Build an identity from $AUTHIDENT_PASSWORD, report it, then release it
//! authident check --username alice
//!
//! # Read the password from stdin and print JSON
//! echo 's3cret!' | authident check --username alice --stdin --format json
//! ```

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use authident_core::{
    CredentialIdentity, LockedHeap, ProtectedSecret, ProtectedString, record_layout, record_size,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};
use zeroize::Zeroizing;

mod config;

#[derive(Parser)]
#[command(name = "authident")]
#[command(about = "Inspect SSPI-style credential identity records")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the field offsets and sizes of the native record
    Layout {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Build a credential identity, report it, and release it
    Check {
        /// Principal name
        #[arg(short, long)]
        username: Option<String>,

        /// Environment variable holding the password
        #[arg(long, default_value = "AUTHIDENT_PASSWORD")]
        password_env: String,

        /// Read the password from the first line of stdin instead
        #[arg(long)]
        stdin: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(&config.log_level, cli.verbose);
    debug!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::Layout { format } => show_layout(&format),
        Commands::Check {
            username,
            password_env,
            stdin,
            format,
        } => check_identity(
            &config,
            username.as_deref(),
            &password_env,
            stdin,
            &format,
        ),
    }
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn show_layout(format: &str) -> Result<()> {
    let fields = record_layout();
    let size = record_size();

    match format {
        "json" => {
            let output = serde_json::json!({ "size": size, "fields": fields });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("AuthIdentityRecord ({} bytes):", size);
            for field in &fields {
                println!(
                    "  {:<16} offset {:>2}  size {}",
                    field.name, field.offset, field.size
                );
            }
        }
    }
    Ok(())
}

fn check_identity(
    config: &config::CliConfig,
    username: Option<&str>,
    password_env: &str,
    stdin: bool,
    format: &str,
) -> Result<()> {
    let password = if stdin {
        let mut line = Zeroizing::new(String::new());
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        Some(protect_line(&line))
    } else {
        std::env::var(password_env).ok().map(ProtectedString::from)
    };

    if password.is_none() {
        info!("No password supplied; building identity without a secret");
    }

    let memory = LockedHeap::with_locking(config.lock_memory);
    let identity = CredentialIdentity::with_memory(
        username,
        password.as_ref().map(|p| p as &dyn ProtectedSecret),
        memory,
    )
    .context("Failed to construct credential identity")?;

    let active = identity.summary();
    identity
        .release()
        .context("Failed to release credential identity")?;
    let released = identity.summary();

    match format {
        "json" => {
            let output = serde_json::json!({ "active": active, "released": released });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("Credential identity:");
            println!("  Username length: {}", active.username_length);
            println!("  Domain length:   {}", active.domain_length);
            println!("  Secret length:   {}", active.secret_length);
            println!("  Flags:           {}", active.flags);
            println!(
                "Released: {} (secret length now {})",
                released.released, released.secret_length
            );
        }
    }
    Ok(())
}

/// Protect one input line, without its line terminator.
fn protect_line(line: &str) -> ProtectedString {
    ProtectedString::from(line.trim_end_matches(['\r', '\n']))
}
