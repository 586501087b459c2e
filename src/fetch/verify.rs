//! Integrity verification of the finished file against the remote ETag.
//!
//! Servers are not obliged to make the ETag a content digest. Only a tag that
//! looks like an MD5 digest (32 hex digits) is checked; anything else, such
//! as the `<md5>-<parts>` tags of multipart uploads, is reported as
//! unrecognised so the caller can skip verification with a warning.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use md5::{Digest, Md5};
use tracing::{debug, instrument};

use super::FetchError;
use super::constants::VERIFY_BUFFER_SIZE;

/// A tag this crate knows how to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityTag {
    /// Lowercase hex MD5 digest.
    Md5(String),
}

impl IntegrityTag {
    /// Interprets an opaque ETag. Returns `None` if the format is not a
    /// recognised digest.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let tag = raw.trim();
        if tag.len() == 32 && tag.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self::Md5(tag.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Expected digest as lowercase hex.
    #[must_use]
    pub fn expected_hex(&self) -> &str {
        match self {
            Self::Md5(hex) => hex,
        }
    }

    /// Algorithm label for logs.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Md5(_) => "md5",
        }
    }
}

/// Hashes `path` and compares it with `expected`.
///
/// Callers must flush pending writes first; the file is reopened from disk.
/// Returns the computed digest on success.
///
/// # Errors
///
/// - [`FetchError::IntegrityMismatch`] if the digest differs
/// - [`FetchError::Verification`] if the file cannot be read
#[instrument(fields(path = %path.display(), algorithm = expected.algorithm()))]
pub async fn verify_file(path: &Path, expected: &IntegrityTag) -> Result<String, FetchError> {
    let owned_path = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || md5_hex(&owned_path))
        .await
        .map_err(|e| FetchError::verification(path, std::io::Error::other(e)))?
        .map_err(|e| FetchError::verification(path, e))?;

    if actual.eq_ignore_ascii_case(expected.expected_hex()) {
        debug!(digest = %actual, "digest matches");
        Ok(actual)
    } else {
        Err(FetchError::integrity_mismatch(
            path,
            expected.expected_hex(),
            actual,
        ))
    }
}

fn md5_hex(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(VERIFY_BUFFER_SIZE, File::open(path)?);
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; VERIFY_BUFFER_SIZE];

    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(hex::encode(hasher.finalize()))
}
