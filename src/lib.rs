//! # Quarry
//!
//! The client-side retrieval engine of a decentralized storage network.
//!
//! A file was previously split into redundant, encrypted pieces and
//! distributed to independent, untrusted remote hosts under signed storage
//! contracts. This crate retrieves one intact copy back from whichever
//! subset of hosts is currently reachable, verifies that the retrieved bytes
//! are exactly the bytes that were stored, and exposes live progress to
//! concurrent observers while the transfer is in flight.
//!
//! ## Architecture
//!
//! - **[`Piece`]**: immutable descriptor of one stored redundant copy —
//!   host, contract, decryption key, expected digest
//! - **Host fetch**: per-piece TCP exchange that streams, decrypts, hashes,
//!   and writes chunk by chunk, failing closed on a digest mismatch
//! - **[`Download`]**: per-session status entity with an atomic byte counter
//!   safe to poll from a monitor thread
//! - **[`Renter`]**: the service object owning the file catalog and the
//!   append-only download queue
//!
//! ## Example
//!
//! ```no_run
//! use quarry::{Manifest, Renter};
//!
//! let manifest = Manifest::load("pieces.json")?;
//! let renter = Renter::new();
//! for file in manifest.files {
//!     renter.insert_file(&file.nickname, file.pieces);
//! }
//!
//! // Blocks until one verified copy is on disk or all retries fail
//! renter.download("report.pdf", "report.pdf")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[macro_use]
extern crate log;

mod download;
mod error;
mod host;
mod manifest;
mod piece;
mod renter;

pub use download::{Download, DownloadInfo, RetryPolicy};
pub use error::{DownloadError, FetchError};
pub use manifest::{Manifest, ManifestError, ManifestFile};
pub use piece::{Contract, ContractId, Digest, Piece, PieceKey, CONTRACT_ID_SIZE, DIGEST_SIZE};
pub use renter::Renter;
