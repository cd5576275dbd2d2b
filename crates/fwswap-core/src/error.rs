//! Error taxonomy for the upgrade engine
//!
//! Every error here is terminal for the current upgrade attempt; nothing is
//! retried automatically. [`ProtocolError`] and [`ImageError`] are detected
//! before any flashing occurs, so they are always side-effect free.
//! [`PartitionError`] and [`FlashError`] can occur mid-sequence, but no slot
//! pointer is ever committed unless the whole part sequence flashed.

use thiserror::Error;

/// Malformed transport input: wrong method, missing headers, bad multipart
/// framing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Request method is not POST
    #[error("incorrect HTTP method: {0}")]
    BadMethod(String),

    /// CONTENT_TYPE missing from the CGI environment
    #[error("no content type")]
    MissingContentType,

    /// CONTENT_LENGTH missing from the CGI environment
    #[error("no content length")]
    MissingContentLength,

    /// REQUEST_METHOD missing from the CGI environment
    #[error("no request method")]
    MissingMethod,

    /// Content type is not multipart/form-data with a boundary
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// CONTENT_LENGTH is not a valid byte count
    #[error("incorrect content length: {0}")]
    BadContentLength(String),

    /// Fewer body bytes arrived than CONTENT_LENGTH declared
    #[error("short body: expected {expected} bytes, got {got}")]
    ShortBody {
        /// Declared byte count
        expected: u64,
        /// Bytes actually read
        got: u64,
    },

    /// Body does not start with the boundary delimiter
    #[error("boundary not found in request body")]
    BoundaryNotFound,

    /// Content-Disposition header line missing from the body part
    #[error("missing Content-Disposition in body part")]
    MissingDisposition,

    /// Body part does not declare an octet-stream content type
    #[error("body part is not application/octet-stream")]
    UnsupportedPartType,

    /// Closing boundary never reached
    #[error("truncated body: closing boundary not found")]
    TruncatedBody,
}

/// Invalid firmware container: wrong magic or hardware id, layout or
/// checksum violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// Image shorter than the fixed header
    #[error("image too small: {0} bytes")]
    TooSmall(usize),

    /// Magic constant mismatch
    #[error("bad magic: {found:#010x}")]
    BadMagic {
        /// Value found in the header
        found: u32,
    },

    /// Hardware id does not match this device
    #[error("bad hwid: image {found:#06x}, device {expected:#06x}")]
    BadHwid {
        /// Value found in the header
        found: u32,
        /// Hardware id of this device
        expected: u32,
    },

    /// Part data extends past the end of the image
    #[error("part {part} out of bounds: offset {offset} + length {length} > image {image_len}")]
    OutOfBounds {
        /// Part name (lossy if the name itself is damaged)
        part: String,
        /// Part offset from the header
        offset: u64,
        /// Part length from the header
        length: u64,
        /// Total image length
        image_len: u64,
    },

    /// Stored digest does not match the part data
    #[error("checksum mismatch in part {part}")]
    ChecksumMismatch {
        /// Part name
        part: String,
    },

    /// Part name field is not a NUL-terminated UTF-8 string
    #[error("unreadable name in part slot {index}")]
    BadPartName {
        /// Part slot index (0-7)
        index: usize,
    },

    /// Builder given a part name longer than the 15 usable bytes
    #[error("part name too long: {name:?}")]
    NameTooLong {
        /// The offending name
        name: String,
    },

    /// Builder given more parts than the header has slots
    #[error("too many parts: at most {max} supported")]
    TooManyParts {
        /// The fixed slot count
        max: usize,
    },
}

/// Malformed or oversized partition action table.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Record does not have the `name:slotA:slotB[:medium]` shape
    #[error("malformed action on line {line}: {reason}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// Unrecognized medium keyword
    #[error("unknown medium {medium:?} on line {line}")]
    UnknownMedium {
        /// 1-based line number
        line: usize,
        /// The offending keyword
        medium: String,
    },

    /// More records than firmware part slots
    #[error("too many actions: at most {max} supported")]
    TooManyActions {
        /// The fixed slot count
        max: usize,
    },

    /// Configuration file could not be read
    #[error("cannot read configuration {path}: {source}")]
    Unreadable {
        /// File path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Logical-partition resolution failures during the swap sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// Image names a part the action table does not know
    #[error("unknown partition {0:?} in firmware image")]
    UnknownPart(String),

    /// No durable pointer recorded for the part
    #[error("no current partition recorded for {0:?}")]
    MissingPointer(String),

    /// Durable pointer names neither configured slot
    #[error("invalid current partition {value:?} for {part:?}")]
    CorruptPointer {
        /// Logical part name
        part: String,
        /// The value found in the environment
        value: String,
    },
}

/// External erase/write program failures.
#[derive(Error, Debug)]
pub enum FlashError {
    /// Could not start or talk to the external program
    #[error("cannot run {program} for {device}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Target device
        device: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The external program exited abnormally or with non-zero status
    #[error("{program} failed for {device} ({status})")]
    Failed {
        /// Program name
        program: String,
        /// Target device
        device: String,
        /// Rendered exit status
        status: String,
    },
}

/// Durable environment store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// The store could not be opened; nothing was touched
    #[error("cannot open environment: {0}")]
    OpenFailed(String),

    /// The batch commit failed after flashing succeeded
    #[error("cannot rewrite environment: {0}")]
    CommitFailed(String),
}

/// Umbrella error for one upgrade attempt.
///
/// [`UpgradeError::EnvCommit`] is kept distinct from [`UpgradeError::Env`]:
/// a failed commit means flash content is ahead of the recorded pointers,
/// which callers may want to report differently from a store that never
/// opened.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// Transport-level failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Firmware container rejected
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Action table rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logical partition resolution failed
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// External flash program failed
    #[error(transparent)]
    Flash(#[from] FlashError),

    /// Environment store failed before any pointer was recorded
    #[error(transparent)]
    Env(EnvError),

    /// Environment commit failed after all parts flashed
    #[error("upgrade flashed but environment commit failed: {0}")]
    EnvCommit(EnvError),

    /// I/O failure outside the collaborators
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EnvError> for UpgradeError {
    fn from(e: EnvError) -> Self {
        match e {
            EnvError::CommitFailed(_) => UpgradeError::EnvCommit(e),
            EnvError::OpenFailed(_) => UpgradeError::Env(e),
        }
    }
}
