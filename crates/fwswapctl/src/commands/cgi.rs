//! `cgi` - HTTP upload handler behind a CGI gateway
//!
//! The gateway puts the request line material in the environment and the
//! body on stdin; everything written to stdout goes back to the uploading
//! client. The response header is emitted before any processing so the
//! client always gets a well-formed reply, even on failure.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use fwswap_core::prelude::*;
use fwswap_core::{cgi, multipart};
use tracing::{info, warn};

/// Handle one upload request end to end.
pub fn execute(config: &Path, hwid: u32, reboot: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    // Header first: stdout is the HTTP response from here on.
    write!(stdout, "Content-type: text/plain\r\n\r\n")?;
    stdout.flush()?;

    match upgrade_from_request(config, hwid) {
        Ok(report) => {
            for flip in &report.flips {
                writeln!(stdout, "part {}: {} -> {}", flip.part, flip.from_slot, flip.to_slot)?;
            }
            writeln!(stdout, "The system upgrade completed successfully")?;
            stdout.flush()?;
            drop(stdout);

            if reboot {
                super::request_reboot()?;
            }
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "upgrade rejected");
            writeln!(stdout, "The system upgrade failed: {e}")?;
            stdout.flush()?;
            Err(e.into())
        }
    }
}

/// Validate the request, receive the image and flash it.
fn upgrade_from_request(config: &Path, hwid: u32) -> Result<UpgradeReport, UpgradeError> {
    let table = ActionTable::load(config)?;

    let request = CgiRequest::from_env().map_err(UpgradeError::from)?;
    let validated = request.validate()?;
    info!(boundary = %validated.boundary, length = validated.length, "accepted upload request");

    let mut stdin = std::io::stdin().lock();
    let body = cgi::read_body(&mut stdin, validated.length)?;

    let file = multipart::extract(&body, &validated.boundary)?;
    let image = FirmwareImage::parse(file.data, hwid)?;

    let mut flasher = CommandFlasher::new();
    let store = UBootEnvStore::new();
    SwapController::new(&table, &mut flasher).apply(&image.parts, &store)
}
