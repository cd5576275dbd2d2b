//! Multipart/form-data payload extraction
//!
//! Recovers the raw firmware payload from an already-buffered
//! `multipart/form-data` request body, given the boundary token from the
//! Content-Type header. No parsing library is used: the body is walked with
//! index-based slicing, and every malformed input is a [`ProtocolError`],
//! never a read past the buffer.
//!
//! Expected body shape:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="file"; filename="fw.img"\r\n
//! Content-Type: application/octet-stream\r\n
//! <more headers>\r\n
//! \r\n
//! <payload bytes>
//! --<boundary>--\r\n
//! ```
//!
//! Header names and value tokens are matched ASCII-case-insensitively;
//! parameter values are taken verbatim.

use tracing::debug;

use crate::error::ProtocolError;

const DISPOSITION_HEADER: &str = "content-disposition";
const CONTENT_TYPE_HEADER: &str = "content-type";
const OCTET_STREAM: &str = "application/octet-stream";

/// The embedded file recovered from a multipart body.
///
/// `data` is a zero-copy view into the request buffer and stays valid for
/// as long as the buffer does, which covers the subsequent container parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile<'a> {
    /// Raw payload bytes
    pub data: &'a [u8],

    /// Value of the `filename` parameter, if the client sent one
    pub filename: Option<String>,
}

/// Extract the embedded file payload from a multipart body.
///
/// `boundary_token` is the bare token from the Content-Type header; the
/// full delimiter line `--<token>` is reconstructed here.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the body does not start with the
/// boundary, the part headers are missing or not octet-stream, or the
/// closing boundary is never reached.
pub fn extract<'a>(
    body: &'a [u8],
    boundary_token: &str,
) -> Result<MultipartFile<'a>, ProtocolError> {
    let boundary = format!("--{boundary_token}");
    let boundary = boundary.as_bytes();

    // Opening line must be exactly the boundary.
    let (first, mut pos) = read_line(body, 0).ok_or(ProtocolError::BoundaryNotFound)?;
    if first != boundary {
        return Err(ProtocolError::BoundaryNotFound);
    }

    // Content-Disposition line, with an optional filename parameter.
    let (line, next) = read_line(body, pos).ok_or(ProtocolError::TruncatedBody)?;
    pos = next;
    let filename = parse_disposition(line)?;

    // The part must declare an octet-stream content type.
    let (line, next) = read_line(body, pos).ok_or(ProtocolError::TruncatedBody)?;
    pos = next;
    check_octet_stream(line)?;

    // Skip the remaining headers until the blank separator line.
    loop {
        let (line, next) = read_line(body, pos).ok_or(ProtocolError::TruncatedBody)?;
        pos = next;
        if line.is_empty() {
            break;
        }
    }

    // Payload runs from here to the next occurrence of the boundary.
    let tail = body.get(pos..).unwrap_or(&[]);
    let len = tail
        .windows(boundary.len())
        .position(|w| w == boundary)
        .ok_or(ProtocolError::TruncatedBody)?;
    let mut payload = &tail[..len];

    // One trailing CRLF belongs to the framing, not the payload. Guard the
    // length so 0- and 1-byte payloads pass through unmodified.
    if payload.len() >= 2 && payload.ends_with(b"\r\n") {
        payload = &payload[..payload.len() - 2];
    }

    debug!(
        payload_len = payload.len(),
        filename = filename.as_deref(),
        "extracted multipart payload"
    );

    Ok(MultipartFile {
        data: payload,
        filename,
    })
}

/// Return the line starting at `pos` (without its CRLF) and the position
/// just past it. `None` when no CRLF terminator exists before end of body.
fn read_line(body: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let tail = body.get(pos..)?;
    let rel = tail.windows(2).position(|w| w == b"\r\n")?;
    Some((&tail[..rel], pos + rel + 2))
}

/// Validate a `Content-Disposition: form-data` line and pull out the
/// filename parameter if present. Absence of a filename is not an error;
/// absence of the header is.
fn parse_disposition(line: &[u8]) -> Result<Option<String>, ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::MissingDisposition)?;
    let (name, value) = line
        .split_once(':')
        .ok_or(ProtocolError::MissingDisposition)?;
    if !name.trim().eq_ignore_ascii_case(DISPOSITION_HEADER) {
        return Err(ProtocolError::MissingDisposition);
    }

    let mut items = value.split(';').map(str::trim);
    match items.next() {
        Some(kind) if kind.eq_ignore_ascii_case("form-data") => {}
        _ => return Err(ProtocolError::MissingDisposition),
    }

    for item in items {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("filename") {
            return Ok(Some(unquote(value.trim()).to_string()));
        }
    }

    Ok(None)
}

/// Require a `Content-Type` header whose value is octet-stream.
fn check_octet_stream(line: &[u8]) -> Result<(), ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::UnsupportedPartType)?;
    let (name, value) = line
        .split_once(':')
        .ok_or(ProtocolError::UnsupportedPartType)?;
    if !name.trim().eq_ignore_ascii_case(CONTENT_TYPE_HEADER) {
        return Err(ProtocolError::UnsupportedPartType);
    }

    // Parameters after the media type (e.g. charset) are irrelevant here.
    let media = value.split(';').next().unwrap_or("").trim();
    if !media.eq_ignore_ascii_case(OCTET_STREAM) {
        return Err(ProtocolError::UnsupportedPartType);
    }

    Ok(())
}

/// Strip one pair of surrounding double quotes, if present.
fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}
