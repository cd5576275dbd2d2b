//! `apply` - upgrade from a local firmware image file

use std::path::Path;

use anyhow::{Context, Result};
use fwswap_core::prelude::*;
use tracing::info;

/// Load the image file, validate it and apply every part.
pub fn execute(
    image: &Path,
    config: &Path,
    hwid: u32,
    reboot: bool,
    json: bool,
) -> Result<()> {
    let table = ActionTable::load(config).map_err(UpgradeError::from)?;

    // The whole file is the image, no framing.
    let data = std::fs::read(image)
        .with_context(|| format!("cannot read firmware image {}", image.display()))?;
    info!(bytes = data.len(), "loaded firmware image");

    let parsed = FirmwareImage::parse(&data, hwid).map_err(UpgradeError::from)?;

    let mut flasher = CommandFlasher::new();
    let store = UBootEnvStore::new();
    let report = SwapController::new(&table, &mut flasher).apply(&parsed.parts, &store)?;

    print_report(&report, json)?;

    if reboot {
        super::request_reboot()?;
    }
    Ok(())
}

/// Render a committed upgrade for the terminal or for scripts.
pub fn print_report(report: &UpgradeReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for flip in &report.flips {
            println!(
                "part {}: {} -> {} ({})",
                flip.part, flip.from_slot, flip.to_slot, flip.key
            );
        }
        println!("The system upgrade completed successfully");
    }
    Ok(())
}
