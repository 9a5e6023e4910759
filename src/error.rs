use std::io;

use thiserror::Error;

/// Errors produced while reading or writing a Password Safe database.
///
/// `WrongPassphrase` is deliberately not a variant here: a failed passphrase
/// check is a normal, expected outcome of `verify_pass`/`open`, not a
/// failure of the I/O or framing layers, so it is modeled as a value
/// (`Option`/a dedicated open-result enum) instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural truncation: fewer than one full block remained, or a
    /// field's declared length ran past the end of the stream.
    #[error("unexpected end of file")]
    UnexpectedEof,

    /// The probed format does not match (e.g. reading as V1 but the V2
    /// marker field was found, or the `PWS3` tag is missing). Recoverable:
    /// the caller should try the next format.
    #[error("wrong file version")]
    WrongFileVersion,

    /// HMAC-SHA256 mismatch at the end of a V3 read.
    #[error("checksum verification failed")]
    ChecksumFailed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;
