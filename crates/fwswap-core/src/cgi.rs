//! CGI transport validation
//!
//! The CGI gateway hands the request over as environment variables plus the
//! body on stdin. This module validates the request line material (method,
//! content type, declared length), extracts the multipart boundary token,
//! and reads exactly the declared number of body bytes. Everything past
//! that point is [`crate::multipart`]'s job.

use std::io::Read;

use tracing::info;

use crate::error::ProtocolError;

const MULTIPART_PREFIX: &str = "multipart/form-data; boundary=";

/// The transport-level facts of one CGI upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiRequest {
    /// REQUEST_METHOD value
    pub method: String,

    /// CONTENT_TYPE value
    pub content_type: String,

    /// CONTENT_LENGTH value, still unparsed
    pub content_length: String,
}

/// A validated request: the boundary token and the body length to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Multipart boundary token (without the leading `--`)
    pub boundary: String,

    /// Exact body length in bytes
    pub length: u64,
}

impl CgiRequest {
    /// Capture the request from the CGI process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] naming whichever variable is missing.
    pub fn from_env() -> Result<Self, ProtocolError> {
        Ok(Self {
            method: std::env::var("REQUEST_METHOD")
                .map_err(|_| ProtocolError::MissingMethod)?,
            content_type: std::env::var("CONTENT_TYPE")
                .map_err(|_| ProtocolError::MissingContentType)?,
            content_length: std::env::var("CONTENT_LENGTH")
                .map_err(|_| ProtocolError::MissingContentLength)?,
        })
    }

    /// Check the method, content type and declared length.
    ///
    /// The method must be POST (case-insensitively, as the legacy gateway
    /// accepted), the content type must start with
    /// `multipart/form-data; boundary=`, and the length must parse as a
    /// non-negative integer. A quoted boundary token has its quotes
    /// stripped.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] describing the first violated rule.
    pub fn validate(&self) -> Result<ValidatedRequest, ProtocolError> {
        if !self.method.eq_ignore_ascii_case("post") {
            return Err(ProtocolError::BadMethod(self.method.clone()));
        }

        let prefix_len = MULTIPART_PREFIX.len();
        let matches_prefix = self
            .content_type
            .get(..prefix_len)
            .is_some_and(|p| p.eq_ignore_ascii_case(MULTIPART_PREFIX));
        if !matches_prefix {
            return Err(ProtocolError::UnsupportedContentType(
                self.content_type.clone(),
            ));
        }
        let token = self.content_type.get(prefix_len..).unwrap_or("");
        let token = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(token);
        if token.is_empty() {
            return Err(ProtocolError::UnsupportedContentType(
                self.content_type.clone(),
            ));
        }

        let length: u64 = self.content_length.trim().parse().map_err(|_| {
            ProtocolError::BadContentLength(self.content_length.clone())
        })?;

        Ok(ValidatedRequest {
            boundary: token.to_string(),
            length,
        })
    }
}

/// Read exactly `length` body bytes from `reader`.
///
/// A short read is an error, never a partial result: flashing from a
/// half-received image must be impossible.
///
/// # Errors
///
/// [`ProtocolError::ShortBody`] when the stream ends early; any other I/O
/// failure is passed through.
pub fn read_body<R: Read>(reader: &mut R, length: u64) -> crate::Result<Vec<u8>> {
    let mut body = Vec::new();
    let got = reader.take(length).read_to_end(&mut body)?;
    if got as u64 != length {
        return Err(ProtocolError::ShortBody {
            expected: length,
            got: got as u64,
        }
        .into());
    }

    info!(bytes = length, "received firmware image");
    Ok(body)
}
