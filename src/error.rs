//! Error taxonomy for the ICE archive codec.
//!
//! Every public operation returns `Result<_, IceError>`.  The codec never
//! retries; each error aborts the current read or write and carries enough
//! context (field name, region) to diagnose the failure.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IceError {
    /// The first four bytes are not `"ICE\0"`.
    #[error("not an ICE archive (bad signature)")]
    NotAnArchive,
    /// The header names a version this build cannot parse.
    #[error("unsupported ICE version {0}")]
    UnsupportedVersion(u32),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    /// The input ended in the middle of the named region.
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("encrypted writing is not supported for {0}")]
    EncryptionNotSupported(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
