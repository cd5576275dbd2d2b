//! `create` and `dump` - build and inspect firmware container images

use std::path::Path;

use anyhow::{Context, Result, bail};
use fwswap_core::prelude::*;
use serde::Serialize;
use tracing::info;

/// Assemble a container image from `name:file` part specs.
pub fn create(output: &Path, hwid: u32, parts: &[String]) -> Result<()> {
    if parts.is_empty() {
        bail!("at least one --part name:file is required");
    }

    let mut builder = ImageBuilder::new(hwid);
    for spec in parts {
        let Some((name, file)) = spec.split_once(':') else {
            bail!("malformed part spec {spec:?}, expected name:file");
        };
        let data = std::fs::read(file)
            .with_context(|| format!("cannot read part file {file}"))?;
        info!(part = name, bytes = data.len(), "adding part");
        builder
            .add_part(name, data)
            .map_err(UpgradeError::from)
            .with_context(|| format!("cannot add part {name:?}"))?;
    }

    let image = builder.build();
    std::fs::write(output, &image)
        .with_context(|| format!("cannot write {}", output.display()))?;
    println!("wrote {} ({} bytes)", output.display(), image.len());
    Ok(())
}

#[derive(Serialize)]
struct PartSummary {
    index: usize,
    name: String,
    size: u32,
    offset: u32,
    md5: String,
}

#[derive(Serialize)]
struct ImageSummary {
    hwid: String,
    flags: u32,
    parts: Vec<PartSummary>,
}

/// Print the part table of an existing image.
///
/// The hardware id is taken from the image itself, so an image built for
/// any device can be inspected.
pub fn dump(image: &Path, json: bool) -> Result<()> {
    let data = std::fs::read(image)
        .with_context(|| format!("cannot read firmware image {}", image.display()))?;

    let hwid = match data.get(4..8) {
        Some(bytes) => u32::from_le_bytes(bytes.try_into()?),
        None => {
            return Err(UpgradeError::from(ImageError::TooSmall(data.len())).into());
        }
    };

    let parsed = FirmwareImage::parse(&data, hwid).map_err(UpgradeError::from)?;

    if json {
        let summary = ImageSummary {
            hwid: format!("{:#x}", parsed.hwid),
            flags: parsed.flags,
            parts: parsed
                .parts
                .iter()
                .map(|p| PartSummary {
                    index: p.index,
                    name: p.name.to_string(),
                    size: p.length,
                    offset: p.offset,
                    md5: hex::encode(p.digest),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", parsed.describe());
    }
    Ok(())
}
