//! fwswapctl - A/B firmware upgrade CLI
//!
//! Applies firmware images to the inactive partition slots, serves as the
//! CGI upload handler, and creates/inspects firmware container images.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fwswap_core::config::DEFAULT_CONFIG_PATH;
use fwswap_core::error::UpgradeError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fwswapctl")]
#[command(about = "A/B firmware upgrade tools - apply images, handle CGI uploads, build containers")]
#[command(version)]
#[command(long_about = "
fwswapctl manages redundant-partition firmware upgrades. Each logical part
of a firmware image is flashed to the currently inactive slot of its
partition pair, and the durable active-slot pointers are rewritten only
after every part flashed successfully, so a power loss mid-upgrade never
leaves the device unbootable.
")]
struct Cli {
    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a firmware image from a local file
    Apply {
        /// Path to the firmware image
        image: PathBuf,

        /// Partition action table
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Hardware id of this device (hex)
        #[arg(long, value_parser = parse_hwid, default_value = "0x2424")]
        hwid: u32,

        /// Request a device restart after a successful upgrade
        #[arg(long)]
        reboot: bool,
    },

    /// Run as the CGI upload handler (reads the request from the
    /// environment and the body from stdin)
    Cgi {
        /// Partition action table
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Hardware id of this device (hex)
        #[arg(long, value_parser = parse_hwid, default_value = "0x2424", env = "FWSWAP_HWID")]
        hwid: u32,

        /// Request a device restart after a successful upgrade
        #[arg(long, env = "FWSWAP_REBOOT")]
        reboot: bool,
    },

    /// Build a firmware container image from part files
    Create {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Hardware id to stamp into the image (hex)
        #[arg(short = 'i', long, value_parser = parse_hwid)]
        hwid: u32,

        /// Part as name:file (repeatable, up to 8)
        #[arg(short, long = "part")]
        parts: Vec<String>,
    },

    /// Inspect a firmware container image
    Dump {
        /// Path to the firmware image
        image: PathBuf,
    },
}

/// Parse a hardware id given as hex, with or without the 0x prefix.
fn parse_hwid(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hardware id {s:?}: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr: in CGI mode stdout belongs to the HTTP client.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fwswap={log_level},fwswap_core={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(exit_code(&e));
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Apply {
            image,
            config,
            hwid,
            reboot,
        } => commands::apply::execute(image, config, *hwid, *reboot, cli.json),
        Commands::Cgi {
            config,
            hwid,
            reboot,
        } => commands::cgi::execute(config, *hwid, *reboot),
        Commands::Create {
            output,
            hwid,
            parts,
        } => commands::image::create(output, *hwid, parts),
        Commands::Dump { image } => commands::image::dump(image, cli.json),
    }
}

/// Map the error class to a distinct exit code for scripting.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<UpgradeError>() {
        Some(UpgradeError::Protocol(_)) => 2,
        Some(UpgradeError::Image(_)) => 3,
        Some(UpgradeError::Config(_)) => 4,
        Some(UpgradeError::Partition(_)) => 5,
        Some(UpgradeError::Flash(_)) => 6,
        Some(UpgradeError::Env(_) | UpgradeError::EnvCommit(_)) => 7,
        _ => 1,
    }
}
