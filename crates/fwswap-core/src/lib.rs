//! A/B firmware upgrade engine for embedded Linux devices
//!
//! This crate implements the core of a redundant-partition firmware
//! updater: it accepts a firmware image (a local file, or the body of an
//! HTTP POST delivered through a CGI handler), validates its integrity and
//! target-hardware identity, flashes each contained part to the currently
//! inactive slot of its logical partition, and only then flips the durable
//! pointers that record which slot is active. A power loss mid-update
//! therefore never leaves the device without a bootable previous image.
//!
//! # Architecture
//!
//! - [`multipart`]: multipart/form-data payload extraction from a raw body
//! - [`cgi`]: CGI request validation and exact-length body reading
//! - [`image`]: firmware container format (parse, build, inspect)
//! - [`config`]: logical-partition action table (`name:slotA:slotB[:medium]`)
//! - [`swap`]: the partition swap controller and its collaborator seams
//! - [`flash`]: flasher shelling out to the external erase/write programs
//! - [`env`]: durable environment stores (U-Boot tools, in-memory)
//! - [`error`]: error taxonomy
//!
//! # Safety model
//!
//! The durable slot pointers are the single piece of state that must never
//! be observed inconsistent. They are read before flashing and committed as
//! one batch only after every part flashed successfully; a crash before the
//! commit leaves new content written but unreferenced, and the device still
//! boots the previous image.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cgi;
pub mod config;
pub mod env;
pub mod error;
pub mod flash;
pub mod image;
pub mod multipart;
pub mod prelude;
pub mod swap;

pub use cgi::CgiRequest;
pub use config::{ActionTable, Medium, PartitionAction};
pub use env::{EnvSession, EnvStore, MemoryEnvStore, UBootEnvStore};
pub use error::{
    ConfigError, EnvError, FlashError, ImageError, PartitionError, ProtocolError, UpgradeError,
};
pub use flash::{CommandFlasher, FlashTarget, Flasher};
pub use image::{FirmwareImage, FirmwarePart, ImageBuilder};
pub use multipart::MultipartFile;
pub use swap::{PartFlip, SwapController, UpgradeReport};

/// A specialized `Result` type for upgrade operations.
pub type Result<T> = std::result::Result<T, UpgradeError>;
