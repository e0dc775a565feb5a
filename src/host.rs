//! # Host Fetch Protocol
//!
//! This module implements the client side of the point-to-point retrieval
//! exchange with a single storage host.
//!
//! ## Protocol Overview
//!
//! The exchange runs over one TCP connection:
//!
//! 1. **Request**: The client sends an 8-byte literal command tag
//!    (`"Retrieve"`) followed by the raw 32-byte contract identifier
//! 2. **Response**: The host streams exactly the contract's declared file
//!    size of ciphertext, then closes or idles
//!
//! There is no length prefix or trailer beyond the contract's already-known
//! declared size. The read is bounded: the client never reads past the
//! declared size even if the host sends more, and a stream that ends early
//! is a short-read error.
//!
//! ## Streaming Pipeline
//!
//! The response is processed in chunks of at most 16 KiB. Each chunk is
//! decrypted in place with the piece's ChaCha20 keystream, fed to an
//! incremental SHA-256 digest, and written to the progress sink — the whole
//! file is never buffered in memory.
//!
//! ## Integrity
//!
//! After the bounded read, the computed digest is compared against the
//! contract's recorded value. A mismatch means the host returned wrong or
//! corrupted data; the attempt fails closed and the written bytes must not
//! be used. This is a security check, not a best-effort one — hosts are
//! untrusted.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use chacha20::cipher::StreamCipher;
use sha2::{Digest as _, Sha256};

use crate::download::ProgressWriter;
use crate::error::FetchError;
use crate::piece::{Piece, DIGEST_SIZE};

/// Command tag identifying a retrieval request.
pub(crate) const RETRIEVE_TAG: [u8; 8] = *b"Retrieve";

/// Bound on establishing the TCP connection. Generous, but never indefinite.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on individual reads and writes once connected.
const IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Chunk size for the streaming decrypt/hash/write pipeline (16 KiB).
const CHUNK_SIZE: usize = 16384;

/// A connection to a single storage host.
#[derive(Debug)]
pub(crate) struct HostClient {
    conn: TcpStream,
}

impl HostClient {
    /// Opens a timeout-bounded connection to a host.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Connect`] if the host is unreachable within the
    /// bound, or an I/O error if the stream rejects timeout configuration.
    pub(crate) fn connect(addr: SocketAddr) -> Result<HostClient, FetchError> {
        let conn = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(FetchError::Connect)?;
        conn.set_read_timeout(Some(IO_TIMEOUT))?;
        conn.set_write_timeout(Some(IO_TIMEOUT))?;

        debug!("connected to host {}", addr);

        Ok(HostClient { conn })
    }

    /// Retrieves one piece, streaming it into the sink.
    ///
    /// Sends the retrieval request, then reads exactly the contract's
    /// declared size of ciphertext, decrypting, hashing, and writing each
    /// chunk as it arrives. Consumes the client; the connection is closed on
    /// return either way.
    ///
    /// # Errors
    ///
    /// Any network failure, short read, or digest mismatch fails the whole
    /// attempt with no partial success. The caller is responsible for
    /// resetting the sink before trying another piece.
    pub(crate) fn retrieve(
        mut self,
        piece: &Piece,
        sink: &mut ProgressWriter,
    ) -> Result<(), FetchError> {
        // Identify this as a retrieval request
        self.conn.write_all(&RETRIEVE_TAG)?;

        // Send the ID of the contract for the file piece we're requesting
        self.conn.write_all(piece.contract.id.as_bytes())?;

        // Simultaneously download, decrypt, and hash the file
        let mut cipher = piece.key.decryptor();
        let mut hasher = Sha256::new();
        let mut buf = [0u8; CHUNK_SIZE];
        let expected = piece.contract.filesize;
        let mut remaining = expected;

        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let n = self.conn.read(&mut buf[..want])?;
            if n == 0 {
                return Err(FetchError::ShortRead {
                    received: expected - remaining,
                    expected,
                });
            }

            let chunk = &mut buf[..n];
            cipher.apply_keystream(chunk);
            hasher.update(&chunk[..]);
            sink.write_all(chunk)?;

            remaining -= n as u64;
        }

        let digest: [u8; DIGEST_SIZE] = hasher.finalize().into();
        if digest != piece.contract.digest.0 {
            return Err(FetchError::Integrity);
        }

        Ok(())
    }
}

/// Attempts to retrieve a file piece from its host.
pub(crate) fn fetch_piece(piece: &Piece, sink: &mut ProgressWriter) -> Result<(), FetchError> {
    HostClient::connect(piece.host)?.retrieve(piece, sink)
}
