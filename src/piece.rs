//! # Piece Descriptors
//!
//! This module defines the immutable records identifying the stored redundant
//! copies of a file. Each piece lives on a single remote host under a signed
//! storage contract, encrypted with a per-piece symmetric key.
//!
//! ## Piece Anatomy
//!
//! A piece descriptor carries everything needed to get one copy back:
//!
//! - **Host address**: where to connect for retrieval
//! - **Contract**: the identifier the host serves the piece under, plus the
//!   declared plaintext size and expected content digest
//! - **Decryption key**: ChaCha20 key and nonce for the stored ciphertext
//! - **Activity flag**: pieces on dead contracts are excluded from retrieval
//!
//! ## Integrity Model
//!
//! Hosts are untrusted. The contract records a SHA-256 digest of the
//! plaintext; whatever a host streams back is decrypted and hashed
//! incrementally, and the result must match the contract or the piece is
//! rejected.

use std::fmt;
use std::net::SocketAddr;

use chacha20::cipher::KeyIvInit;
use chacha20::ChaCha20;
use serde::{Deserialize, Serialize};

/// Size of a contract identifier in bytes.
pub const CONTRACT_ID_SIZE: usize = 32;

/// Size of a content digest in bytes (SHA-256).
pub const DIGEST_SIZE: usize = 32;

/// Opaque identifier of a storage contract, as known to the host.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractId(#[serde(with = "hex::serde")] pub [u8; CONTRACT_ID_SIZE]);

impl ContractId {
    /// Returns the raw identifier bytes sent on the wire.
    pub fn as_bytes(&self) -> &[u8; CONTRACT_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", hex::encode(self.0))
    }
}

/// SHA-256 digest of a piece's full plaintext content.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "hex::serde")] pub [u8; DIGEST_SIZE]);

impl From<[u8; DIGEST_SIZE]> for Digest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

/// Per-piece symmetric decryption capability.
///
/// Each retrieval attempt mints a fresh cipher instance so the keystream
/// always starts at offset zero, matching how the piece was encrypted.
#[derive(Clone, Serialize, Deserialize)]
pub struct PieceKey {
    /// 32-byte ChaCha20 key.
    #[serde(with = "hex::serde")]
    pub key: [u8; 32],
    /// 12-byte ChaCha20 nonce.
    #[serde(with = "hex::serde")]
    pub nonce: [u8; 12],
}

impl PieceKey {
    /// Returns a stream cipher positioned at the start of the keystream.
    pub fn decryptor(&self) -> ChaCha20 {
        ChaCha20::new(&self.key.into(), &self.nonce.into())
    }
}

impl fmt::Debug for PieceKey {
    // Never print key material
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceKey(..)")
    }
}

/// Storage contract metadata recorded when the piece was uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Identifier the host serves the stored object under.
    pub id: ContractId,
    /// Declared size of the plaintext file in bytes.
    pub filesize: u64,
    /// Expected SHA-256 digest of the full plaintext.
    pub digest: Digest,
}

/// One stored redundant copy of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Piece {
    /// Network address of the host holding this piece.
    pub host: SocketAddr,
    /// The contract the piece is stored under.
    pub contract: Contract,
    /// Decryption capability for the stored ciphertext.
    pub key: PieceKey,
    /// Whether the backing contract is still alive. Inactive pieces are
    /// excluded from retrieval candidates.
    pub active: bool,
}
