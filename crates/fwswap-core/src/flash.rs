//! External flash programs
//!
//! Erasing and writing physical slots is delegated to the platform tools:
//! `flash_erase` + `nandwrite` for raw MTD partitions, `ubiupdatevol` for
//! UBI volumes (which erases internally, so [`Flasher::erase`] is a no-op
//! there). Part bytes are streamed to the writer's stdin. Exit status is
//! always checked; a failure is hard and never retried.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::info;

use crate::config::Medium;
use crate::error::FlashError;

/// A physical slot to erase and rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashTarget {
    /// Device name (e.g. `mtd3`, or a UBI volume name)
    pub device: String,

    /// Medium the device lives on
    pub medium: Medium,
}

impl std::fmt::Display for FlashTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.device, self.medium)
    }
}

/// Erases a physical slot and streams bytes into it.
pub trait Flasher {
    /// Erase the slot. No-op for media that erase on write.
    ///
    /// # Errors
    ///
    /// [`FlashError`] when the external program fails; the upgrade session
    /// aborts without touching further parts.
    fn erase(&mut self, target: &FlashTarget) -> Result<(), FlashError>;

    /// Write the part bytes to the slot.
    ///
    /// # Errors
    ///
    /// [`FlashError`] on spawn/pipe failure or non-zero exit.
    fn write(&mut self, target: &FlashTarget, data: &[u8]) -> Result<(), FlashError>;
}

impl<T: Flasher + ?Sized> Flasher for &mut T {
    fn erase(&mut self, target: &FlashTarget) -> Result<(), FlashError> {
        (**self).erase(target)
    }

    fn write(&mut self, target: &FlashTarget, data: &[u8]) -> Result<(), FlashError> {
        (**self).write(target, data)
    }
}

/// [`Flasher`] shelling out to the platform flash tools.
#[derive(Debug, Clone)]
pub struct CommandFlasher {
    flash_erase: String,
    nandwrite: String,
    ubiupdatevol: String,
}

impl Default for CommandFlasher {
    fn default() -> Self {
        Self {
            flash_erase: "flash_erase".to_string(),
            nandwrite: "nandwrite".to_string(),
            ubiupdatevol: "ubiupdatevol".to_string(),
        }
    }
}

impl CommandFlasher {
    /// Flasher using the standard mtd-utils tool names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flasher using alternative tool names (tests, PATH-less systems).
    pub fn with_programs(flash_erase: &str, nandwrite: &str, ubiupdatevol: &str) -> Self {
        Self {
            flash_erase: flash_erase.to_string(),
            nandwrite: nandwrite.to_string(),
            ubiupdatevol: ubiupdatevol.to_string(),
        }
    }

    fn run_writer(
        program: &str,
        args: &[String],
        device: &str,
        data: &[u8],
    ) -> Result<(), FlashError> {
        let spawn_err = |source| FlashError::Spawn {
            program: program.to_string(),
            device: device.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data).map_err(spawn_err)?;
        }

        let status = child.wait().map_err(spawn_err)?;
        if !status.success() {
            return Err(FlashError::Failed {
                program: program.to_string(),
                device: device.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

impl Flasher for CommandFlasher {
    fn erase(&mut self, target: &FlashTarget) -> Result<(), FlashError> {
        match target.medium {
            Medium::Ubi => Ok(()),
            Medium::Mtd => {
                info!(device = %target.device, "erasing partition");
                let device = format!("/dev/{}", target.device);
                let status = Command::new(&self.flash_erase)
                    .args(["-q", &device, "0", "0"])
                    .status()
                    .map_err(|source| FlashError::Spawn {
                        program: self.flash_erase.clone(),
                        device: target.device.clone(),
                        source,
                    })?;
                if !status.success() {
                    return Err(FlashError::Failed {
                        program: self.flash_erase.clone(),
                        device: target.device.clone(),
                        status: status.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn write(&mut self, target: &FlashTarget, data: &[u8]) -> Result<(), FlashError> {
        info!(device = %target.device, bytes = data.len(), "flashing partition");
        match target.medium {
            Medium::Mtd => {
                let device = format!("/dev/{}", target.device);
                let args = vec!["-q".to_string(), "-p".to_string(), device, "-".to_string()];
                Self::run_writer(&self.nandwrite, &args, &target.device, data)
            }
            Medium::Ubi => {
                let device = format!("/dev/ubi/{}", target.device);
                let args = vec![device, format!("--size={}", data.len()), "-".to_string()];
                Self::run_writer(&self.ubiupdatevol, &args, &target.device, data)
            }
        }
    }
}
