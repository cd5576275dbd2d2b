//! Firmware container format
//!
//! The on-wire layout is fixed and byte-compatible with deployed images:
//!
//! ```text
//! header (2048 bytes):
//!   magic   u32 LE        0x5E7F28CD
//!   hwid    u32 LE        target hardware id
//!   flags   u32 LE        currently unused
//!   parts   8 x 128 bytes part descriptors, index order = apply order
//!   pad     1012 bytes    reserved
//! part descriptor (128 bytes):
//!   name    16 bytes      NUL-terminated, 15 usable
//!   crc     16 bytes      MD5 of the part data
//!   length  u32 LE        0 = slot unused
//!   offset  u32 LE        from the start of the image
//!   pad     88 bytes      reserved
//! ```
//!
//! Parsing validates cheapest-first: size, magic, hwid, then per-part
//! bounds and MD5. One bad part rejects the whole image; nothing is ever
//! applied from an image with any failing checksum.

use md5::{Digest, Md5};
use tracing::info;

use crate::error::ImageError;

/// Magic constant identifying the container format.
pub const MAGIC: u32 = 0x5E7F_28CD;

/// Hardware id of the reference device; deployments override it.
pub const DEFAULT_HWID: u32 = 0x2424;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 2048;

/// Number of part descriptor slots in the header.
pub const PART_COUNT: usize = 8;

/// Size of one part descriptor.
pub const PART_RECORD_SIZE: usize = 128;

/// Size of the name field (15 usable characters plus NUL).
pub const NAME_SIZE: usize = 16;

/// Size of the stored MD5 digest.
pub const CRC_SIZE: usize = 16;

const PART_TABLE_OFFSET: usize = 12;

/// One non-empty firmware part, viewed zero-copy over the image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePart<'a> {
    /// Descriptor slot index (0-7); index order is the apply order
    pub index: usize,

    /// Logical partition name
    pub name: &'a str,

    /// Part data
    pub data: &'a [u8],

    /// Offset of the data from the start of the image
    pub offset: u32,

    /// Length of the data in bytes
    pub length: u32,

    /// Stored MD5 digest (already verified against `data`)
    pub digest: [u8; CRC_SIZE],
}

/// A parsed and fully verified firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage<'a> {
    /// Hardware id from the header
    pub hwid: u32,

    /// Flags field (unused, carried for inspection)
    pub flags: u32,

    /// Non-empty parts in descriptor order
    pub parts: Vec<FirmwarePart<'a>>,
}

impl<'a> FirmwareImage<'a> {
    /// Parse and verify an image against the device's hardware id.
    ///
    /// On success every returned part has in-bounds data whose MD5 matches
    /// the stored digest; the caller can flash without re-checking.
    ///
    /// # Errors
    ///
    /// [`ImageError`] on any size, magic, hwid, bounds, name, or checksum
    /// violation. The first failing part aborts the whole parse.
    pub fn parse(buffer: &'a [u8], expected_hwid: u32) -> Result<Self, ImageError> {
        if buffer.len() < HEADER_SIZE {
            return Err(ImageError::TooSmall(buffer.len()));
        }

        let magic = read_u32(buffer, 0);
        if magic != MAGIC {
            return Err(ImageError::BadMagic { found: magic });
        }

        let hwid = read_u32(buffer, 4);
        if hwid != expected_hwid {
            return Err(ImageError::BadHwid {
                found: hwid,
                expected: expected_hwid,
            });
        }

        let flags = read_u32(buffer, 8);

        let mut parts = Vec::new();
        for index in 0..PART_COUNT {
            let base = PART_TABLE_OFFSET + index * PART_RECORD_SIZE;

            let length = read_u32(buffer, base + NAME_SIZE + CRC_SIZE);
            if length == 0 {
                continue;
            }
            let offset = read_u32(buffer, base + NAME_SIZE + CRC_SIZE + 4);

            let name = part_name(buffer, base, index)?;

            let end = u64::from(offset) + u64::from(length);
            if end > buffer.len() as u64 {
                return Err(ImageError::OutOfBounds {
                    part: name.to_string(),
                    offset: u64::from(offset),
                    length: u64::from(length),
                    image_len: buffer.len() as u64,
                });
            }

            info!(part = name, length, offset, "checking part");

            let data = &buffer[offset as usize..end as usize];
            let mut digest = [0u8; CRC_SIZE];
            digest.copy_from_slice(&buffer[base + NAME_SIZE..base + NAME_SIZE + CRC_SIZE]);

            let computed: [u8; CRC_SIZE] = Md5::digest(data).into();
            if computed != digest {
                return Err(ImageError::ChecksumMismatch {
                    part: name.to_string(),
                });
            }

            parts.push(FirmwarePart {
                index,
                name,
                data,
                offset,
                length,
                digest,
            });
        }

        Ok(Self { hwid, flags, parts })
    }

    /// Render a human-readable summary, one line per non-empty part.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("HWID    : {:#x}\n", self.hwid));
        out.push_str(&format!("Flags   : {:#x}\n", self.flags));
        for part in &self.parts {
            out.push_str(&format!(
                "part[{}] : name={}, size={}, offset={}, md5={}\n",
                part.index,
                part.name,
                part.length,
                part.offset,
                hex::encode(part.digest),
            ));
        }
        out
    }
}

fn read_u32(buffer: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Extract the NUL-terminated UTF-8 name of a non-empty part.
fn part_name(buffer: &[u8], base: usize, index: usize) -> Result<&str, ImageError> {
    let field = &buffer[base..base + NAME_SIZE];
    let nul = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(ImageError::BadPartName { index })?;
    let name = std::str::from_utf8(&field[..nul])
        .map_err(|_| ImageError::BadPartName { index })?;
    if name.is_empty() {
        return Err(ImageError::BadPartName { index });
    }
    Ok(name)
}

/// Assembles a firmware image from raw part contents.
///
/// Offsets are laid out sequentially after the header and MD5 digests are
/// computed here, so a built image always round-trips through
/// [`FirmwareImage::parse`].
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    hwid: u32,
    flags: u32,
    parts: Vec<(String, Vec<u8>)>,
}

impl ImageBuilder {
    /// Start an image for the given hardware id.
    pub fn new(hwid: u32) -> Self {
        Self {
            hwid,
            flags: 0,
            parts: Vec::new(),
        }
    }

    /// Append one part.
    ///
    /// # Errors
    ///
    /// [`ImageError::TooManyParts`] past the eighth part,
    /// [`ImageError::NameTooLong`] when the name exceeds 15 bytes.
    pub fn add_part(&mut self, name: &str, data: Vec<u8>) -> Result<&mut Self, ImageError> {
        if self.parts.len() >= PART_COUNT {
            return Err(ImageError::TooManyParts { max: PART_COUNT });
        }
        if name.len() >= NAME_SIZE {
            return Err(ImageError::NameTooLong {
                name: name.to_string(),
            });
        }
        self.parts.push((name.to_string(), data));
        Ok(self)
    }

    /// Serialize the image.
    pub fn build(&self) -> Vec<u8> {
        let total: usize = HEADER_SIZE + self.parts.iter().map(|(_, d)| d.len()).sum::<usize>();
        let mut image = vec![0u8; HEADER_SIZE];
        image.reserve(total - HEADER_SIZE);

        image[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        image[4..8].copy_from_slice(&self.hwid.to_le_bytes());
        image[8..12].copy_from_slice(&self.flags.to_le_bytes());

        let mut offset = HEADER_SIZE as u32;
        for (index, (name, data)) in self.parts.iter().enumerate() {
            let base = PART_TABLE_OFFSET + index * PART_RECORD_SIZE;

            image[base..base + name.len()].copy_from_slice(name.as_bytes());

            let digest: [u8; CRC_SIZE] = Md5::digest(data).into();
            image[base + NAME_SIZE..base + NAME_SIZE + CRC_SIZE].copy_from_slice(&digest);

            let len_at = base + NAME_SIZE + CRC_SIZE;
            image[len_at..len_at + 4].copy_from_slice(&(data.len() as u32).to_le_bytes());
            image[len_at + 4..len_at + 8].copy_from_slice(&offset.to_le_bytes());

            offset += data.len() as u32;
        }

        for (_, data) in &self.parts {
            image.extend_from_slice(data);
        }

        image
    }
}
