//! # Renter Service
//!
//! This module implements the state-holding service object that owns the
//! file catalog and the download queue. It is the entry point the API/CLI
//! layer talks to: request a download by nickname, observe the queue while
//! transfers are in flight.
//!
//! ## Locking
//!
//! One coarse reader/writer lock guards both the catalog and the queue:
//! exclusive for mutation, shared for reads. The only state mutated outside
//! the lock is each session's atomic progress counter and completion flag,
//! which observers read without synchronizing with the downloading thread.
//!
//! ## Queue Semantics
//!
//! The queue is append-only history: sessions are enqueued when a retrieval
//! request is accepted and never removed, accumulating for the life of the
//! process. Listing returns read-only status handles, most recent first.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::download::{Download, RetryPolicy, Session};
use crate::error::DownloadError;
use crate::piece::Piece;

/// The client-side retrieval service.
///
/// Holds the file catalog and the download history behind a single lock.
/// One download blocks its calling thread; downloads of different files may
/// run concurrently from different threads sharing the same `Renter`.
pub struct Renter {
    state: RwLock<State>,
    policy: RetryPolicy,
}

struct State {
    /// Catalog of known files, keyed by nickname.
    files: HashMap<String, Vec<Piece>>,
    /// Append-only download history.
    downloads: Vec<Arc<Download>>,
}

impl Renter {
    /// Creates a renter with the production retry policy.
    pub fn new() -> Renter {
        Renter::with_retry_policy(RetryPolicy::default())
    }

    /// Creates a renter with an explicit retry policy.
    pub fn with_retry_policy(policy: RetryPolicy) -> Renter {
        Renter {
            state: RwLock::new(State {
                files: HashMap::new(),
                downloads: Vec::new(),
            }),
            policy,
        }
    }

    /// Records a file's piece list in the catalog.
    ///
    /// The catalog itself is maintained by the upload pipeline; this is the
    /// minimal interface the retrieval engine consumes.
    pub fn insert_file(&self, nickname: &str, pieces: Vec<Piece>) {
        let mut state = self.state.write().unwrap();
        state.files.insert(nickname.to_string(), pieces);
    }

    /// Downloads a file, identified by its nickname, to the destination
    /// specified.
    ///
    /// Synchronous: blocks until one hash-verified copy is on disk or every
    /// retry pass is exhausted. The session appears in the queue as soon as
    /// the request is accepted, so observers can watch progress from other
    /// threads while this call runs.
    ///
    /// # Errors
    ///
    /// Construction failures (unknown nickname, destination not creatable,
    /// no active pieces) are returned immediately without retry. After
    /// construction, only exhaustion of all passes surfaces an error; the
    /// partial file is removed first.
    pub fn download(
        &self,
        nickname: &str,
        destination: impl AsRef<Path>,
    ) -> Result<(), DownloadError> {
        let session = {
            let mut state = self.state.write().unwrap();

            // Lookup the file associated with the nickname
            let pieces = state
                .files
                .get(nickname)
                .ok_or_else(|| DownloadError::UnknownFile(nickname.to_string()))?;

            let session = Session::new(nickname, pieces, destination.as_ref(), self.policy)?;

            // Add the download to the queue before releasing the lock
            state.downloads.push(session.handle());
            session
        };

        session.run()
    }

    /// Returns the list of downloads in the queue, most recent first.
    ///
    /// Safe to call concurrently with downloads in progress; the returned
    /// handles expose only read-only status accessors.
    pub fn download_queue(&self) -> Vec<Arc<Download>> {
        let state = self.state.read().unwrap();
        state.downloads.iter().rev().cloned().collect()
    }
}

impl Default for Renter {
    fn default() -> Self {
        Renter::new()
    }
}
