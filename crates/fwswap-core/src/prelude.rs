//! Convenient re-exports for firmware upgrade operations
//!
//! ```
//! use fwswap_core::prelude::*;
//! ```

pub use crate::config::{ActionTable, Medium, PartitionAction};
pub use crate::env::{EnvSession, EnvStore, MemoryEnvStore, UBootEnvStore};
pub use crate::error::{
    ConfigError, EnvError, FlashError, ImageError, PartitionError, ProtocolError, UpgradeError,
};
pub use crate::flash::{CommandFlasher, FlashTarget, Flasher};
pub use crate::image::{FirmwareImage, FirmwarePart, ImageBuilder};
pub use crate::multipart::MultipartFile;
pub use crate::swap::{PartFlip, SwapController, UpgradeReport};
pub use crate::{CgiRequest, Result};
