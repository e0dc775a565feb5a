//! Error types for the retrieval engine.
//!
//! Two levels of failure exist:
//!
//! - [`DownloadError`]: surfaced to callers. Construction failures (unknown
//!   file, destination not creatable, no active pieces) and final exhaustion.
//! - [`FetchError`]: a single piece attempt against a single host. These are
//!   absorbed by the retry loop and never escalate individually.

use std::io;

use thiserror::Error;

/// A failure surfaced to the caller of a download request.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// No file with the given nickname exists in the catalog.
    #[error("no file of that nickname: {0:?}")]
    UnknownFile(String),

    /// Every piece of the file is backed by a dead contract.
    #[error("no active pieces")]
    NoActivePieces,

    /// The destination file could not be created or maintained.
    #[error("destination file error: {0}")]
    Io(#[from] io::Error),

    /// All retry passes across all pieces failed.
    #[error("could not download any file pieces")]
    Exhausted,
}

/// A failure of one piece attempt against one host.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The host was unreachable within the connect timeout.
    #[error("could not connect to host: {0}")]
    Connect(#[source] io::Error),

    /// The connection failed mid-exchange (send, read, or timeout).
    #[error("connection to host failed: {0}")]
    Io(#[from] io::Error),

    /// The host closed the stream before the contract's declared size.
    #[error("host closed the stream after {received} of {expected} bytes")]
    ShortRead { received: u64, expected: u64 },

    /// The decrypted stream does not hash to the contract's recorded digest.
    #[error("host provided a file that does not match the contract digest")]
    Integrity,
}
