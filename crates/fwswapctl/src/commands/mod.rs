//! Subcommand implementations

pub mod apply;
pub mod cgi;
pub mod image;

use std::process::Command;

use anyhow::{Context, Result};
use tracing::info;

/// Ask the host environment for a restart so the new firmware boots.
pub fn request_reboot() -> Result<()> {
    info!("requesting device restart");
    let status = Command::new("reboot")
        .status()
        .context("cannot run reboot")?;
    anyhow::ensure!(status.success(), "reboot exited with {status}");
    Ok(())
}
