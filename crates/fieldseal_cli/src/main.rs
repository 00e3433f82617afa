//! fieldseal CLI
//!
//! Operator tools for encrypted document fields.
//!
//! # Commands
//!
//! - `migrate` - Re-encrypt legacy values into the current envelope
//! - `rotate` - Re-encrypt current envelopes under a new key
//! - `cutover` - Verify and switch the active key
//! - `verify` - Check every field reads under the active key
//! - `classify` - Print the format of a stored value
//!
//! Exit status is 0 on success, 1 if any record failed, 2 on configuration
//! or store errors.

mod commands;

use clap::{Parser, Subcommand};
use commands::rotate::PublishOrder;
use commands::{CommandStatus, Settings};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// fieldseal command-line tools.
#[derive(Parser)]
#[command(name = "fieldseal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encrypt legacy values into the current envelope format
    Migrate {
        /// Do everything except write
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Re-encrypt current envelopes from the active key to a new key
    Rotate {
        /// Do everything except write
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,

        /// When to store the new key under the staging id (a generated key is
        /// always stored first)
        #[arg(long, value_enum, default_value_t = PublishOrder::Before)]
        publish: PublishOrder,
    },

    /// Verify under the staged key, then make it the active key
    Cutover {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Check that every field is current and reads under the active key
    Verify,

    /// Print whether a value is legacy, current or unrecognized
    Classify {
        /// Stored value, or `-` to read from stdin
        value: String,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Migrate { dry_run, force } => commands::migrate::run(&cli.settings, dry_run, force),
        Commands::Rotate {
            dry_run,
            force,
            publish,
        } => commands::rotate::run(&cli.settings, dry_run, force, publish),
        Commands::Cutover { force } => commands::cutover::run(&cli.settings, force),
        Commands::Verify => commands::verify::run(&cli.settings),
        Commands::Classify { value } => commands::classify::run(&value),
        Commands::Version => {
            println!("fieldseal CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("fieldseal Core v{}", fieldseal_core::VERSION);
            Ok(CommandStatus::Success)
        }
    };

    match result {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("error: {e}");
            CommandStatus::Aborted.exit_code()
        }
    }
}
