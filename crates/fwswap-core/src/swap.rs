//! Partition swap controller
//!
//! Applies a validated part sequence to the inactive slots and flips the
//! durable pointers. The sequence per part is: resolve the action, read
//! the current pointer, flash the *other* slot, record the flip in the
//! session working copy. Only after every part succeeded is the
//! environment committed, as one batch.
//!
//! Failure window (by design, not eliminated): a crash after flashing some
//! part but before the final commit leaves that slot's new content written
//! but unreferenced. The durable pointer still names the previous slot, so
//! the device stays bootable with the previous image. The guarantee is
//! pointer consistency across crashes, not all-flash-or-nothing.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::ActionTable;
use crate::env::{EnvSession, EnvStore};
use crate::error::{PartitionError, UpgradeError};
use crate::flash::{FlashTarget, Flasher};
use crate::image::FirmwarePart;

/// One pointer flip performed by a successful session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartFlip {
    /// Logical part name
    pub part: String,

    /// Durable pointer key
    pub key: String,

    /// Slot that was active before the upgrade
    pub from_slot: String,

    /// Slot the part was flashed to and that is now recorded active
    pub to_slot: String,
}

/// Outcome of a committed upgrade session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// Pointer flips in apply order
    pub flips: Vec<PartFlip>,
}

/// The swap state machine for one upgrade session.
pub struct SwapController<'a, F: Flasher> {
    actions: &'a ActionTable,
    flasher: F,
}

impl<'a, F: Flasher> SwapController<'a, F> {
    /// Controller over an action table and a flasher.
    pub fn new(actions: &'a ActionTable, flasher: F) -> Self {
        Self { actions, flasher }
    }

    /// Apply every part in header order and commit the pointer flips.
    ///
    /// The parts must come from a successfully parsed
    /// [`crate::image::FirmwareImage`], so their data is already verified.
    ///
    /// # Errors
    ///
    /// Aborts on the first failure with nothing further attempted:
    /// [`PartitionError`] for unresolvable parts or pointers,
    /// [`crate::error::FlashError`] for erase/write failures,
    /// [`crate::error::EnvError`] for an unopenable store, and
    /// [`UpgradeError::EnvCommit`] when flashing succeeded but the final
    /// commit did not (storage is then ahead of the recorded pointers).
    pub fn apply<S: EnvStore>(
        &mut self,
        parts: &[FirmwarePart<'_>],
        store: &S,
    ) -> Result<UpgradeReport, UpgradeError> {
        let mut session = store.open()?;
        debug!(parts = parts.len(), "upgrade session opened");

        let mut flips = Vec::with_capacity(parts.len());
        for part in parts {
            let flip = self.apply_part(part, &mut session)?;
            flips.push(flip);
        }

        session.commit()?;
        info!(parts = flips.len(), "upgrade session committed");
        Ok(UpgradeReport { flips })
    }

    fn apply_part<S: EnvSession>(
        &mut self,
        part: &FirmwarePart<'_>,
        session: &mut S,
    ) -> Result<PartFlip, UpgradeError> {
        let action = self
            .actions
            .lookup(part.name)
            .ok_or_else(|| PartitionError::UnknownPart(part.name.to_string()))?;
        let key = action.pointer_key();

        let current = session
            .read(&key)
            .ok_or_else(|| PartitionError::MissingPointer(part.name.to_string()))?;

        // The inactive slot is the one the pointer does not name. Anything
        // else in the pointer is corruption; never guess.
        let next = if current == action.slot_a {
            &action.slot_b
        } else if current == action.slot_b {
            &action.slot_a
        } else {
            return Err(PartitionError::CorruptPointer {
                part: part.name.to_string(),
                value: current,
            }
            .into());
        };

        info!(
            part = part.name,
            from = %current,
            to = %next,
            "applying part"
        );

        let target = FlashTarget {
            device: next.clone(),
            medium: action.medium,
        };
        self.flasher.erase(&target)?;
        self.flasher.write(&target, part.data)?;

        // Durable only at commit, together with all other flips.
        session.write(&key, next);

        Ok(PartFlip {
            part: part.name.to_string(),
            key,
            from_slot: current,
            to_slot: next.clone(),
        })
    }
}
