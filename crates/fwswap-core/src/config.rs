//! Logical-partition action table
//!
//! Each record maps a logical part name to its redundant slot pair and the
//! flash medium, one per line:
//!
//! ```text
//! kernel:mtd2:mtd3
//! rootfs:rootfs_a:rootfs_b:ubi
//! # medium defaults to mtd when omitted
//! ```
//!
//! The table is loaded once at startup and immutable afterwards. At most
//! eight records are accepted, matching the fixed part count of the
//! firmware container.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::image::PART_COUNT;

/// Default location of the action table on the device.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fwswap.conf";

/// Flash medium a logical partition lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    /// Raw flash block device, addressed by device name
    Mtd,

    /// Wear-leveled named volume on a UBI layer
    Ubi,
}

impl std::fmt::Display for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Medium::Mtd => write!(f, "mtd"),
            Medium::Ubi => write!(f, "ubi"),
        }
    }
}

/// One logical partition and its redundant slot pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAction {
    /// Logical part name as it appears in firmware images
    pub name: String,

    /// First physical slot
    pub slot_a: String,

    /// Second physical slot
    pub slot_b: String,

    /// Flash medium of both slots
    pub medium: Medium,
}

impl PartitionAction {
    /// Key of the durable pointer recording the active slot.
    ///
    /// The suffix depends on the medium, matching the variable names the
    /// boot loader reads: `<name>_mtdpart` or `<name>_ubivol`.
    pub fn pointer_key(&self) -> String {
        match self.medium {
            Medium::Mtd => format!("{}_mtdpart", self.name),
            Medium::Ubi => format!("{}_ubivol", self.name),
        }
    }
}

/// The immutable table of partition actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTable {
    actions: Vec<PartitionAction>,
}

impl ActionTable {
    /// Parse `name:slotA:slotB[:medium]` records, one per line.
    ///
    /// Blank lines and `#` comments are skipped. Fields are trimmed.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] on a record with missing or empty fields, an
    /// unknown medium keyword, or more than eight records.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut actions = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if actions.len() >= PART_COUNT {
                return Err(ConfigError::TooManyActions { max: PART_COUNT });
            }

            let mut fields = line.split(':').map(str::trim);
            let name = fields.next().unwrap_or("");
            let slot_a = fields.next().unwrap_or("");
            let slot_b = fields.next().unwrap_or("");
            if name.is_empty() || slot_a.is_empty() || slot_b.is_empty() {
                return Err(ConfigError::Malformed {
                    line: idx + 1,
                    reason: "expected name:slotA:slotB[:medium]".to_string(),
                });
            }

            // Medium defaults to MTD for backward compatibility.
            let medium = match fields.next() {
                None | Some("") => Medium::Mtd,
                Some(m) if m.eq_ignore_ascii_case("mtd") => Medium::Mtd,
                Some(m) if m.eq_ignore_ascii_case("ubi") => Medium::Ubi,
                Some(m) => {
                    return Err(ConfigError::UnknownMedium {
                        line: idx + 1,
                        medium: m.to_string(),
                    });
                }
            };

            if fields.next().is_some() {
                return Err(ConfigError::Malformed {
                    line: idx + 1,
                    reason: "trailing fields after medium".to_string(),
                });
            }

            actions.push(PartitionAction {
                name: name.to_string(),
                slot_a: slot_a.to_string(),
                slot_b: slot_b.to_string(),
                medium,
            });
        }

        Ok(Self { actions })
    }

    /// Load and parse the table from a file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Unreadable`] when the file cannot be read, otherwise
    /// as [`ActionTable::parse`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Find the action for a logical part name.
    pub fn lookup(&self, name: &str) -> Option<&PartitionAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// All actions, in file order.
    pub fn actions(&self) -> &[PartitionAction] {
        &self.actions
    }
}
