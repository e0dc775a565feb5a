//! # Download Sessions
//!
//! This module implements the file-level retrieval engine: the shared
//! [`Download`] status entity, the byte-accounting [`ProgressWriter`] sink,
//! and the [`Session`] retry loop that walks redundant pieces across hosts
//! until one verified copy lands on disk.
//!
//! ## Retrieval Process
//!
//! 1. **Construction**: Create/truncate the destination file, filter the
//!    piece list down to active contracts, fail if none remain
//! 2. **Passes**: Up to five full passes over the active pieces, in list
//!    order, one host fetch per piece
//! 3. **First success wins**: One hash-verified piece is a complete file;
//!    redundancy exists for host availability, not for combining content
//! 4. **Reset on failure**: A failed attempt rewinds the file cursor and
//!    zeroes the progress counter so the next attempt overwrites cleanly
//! 5. **Backoff**: A pass with no successes sleeps for a randomized duration
//!    that grows with the square of the pass index
//! 6. **Exhaustion**: After the final pass the partial file is deleted and a
//!    terminal error is returned
//!
//! ## Progress Observation
//!
//! The byte counter and completion flag are atomics: a monitor thread may
//! poll them while the retrieval loop runs, without any further
//! synchronization. The counter is published only *after* the bytes are
//! written, so an observer never sees progress the destination file cannot
//! back. Both values are advisory; all other session state is owned by the
//! thread running the loop.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use rand::Rng;
use serde::Serialize;

use crate::error::{DownloadError, FetchError};
use crate::host;
use crate::piece::Piece;

/// Number of full passes over the piece list before giving up.
const DOWNLOAD_ATTEMPTS: u32 = 5;

/// Base unit for the inter-pass backoff sleep.
const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Retry behavior of a session's retrieval loop.
///
/// The default matches production behavior: five passes with a backoff unit
/// of one second. Tests shrink the unit to run the full pass structure
/// without wall-clock sleeps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of full passes over the active pieces.
    pub attempts: u32,
    /// Base duration multiplied by `pass² × jitter` between failed passes.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: DOWNLOAD_ATTEMPTS,
            backoff_unit: BACKOFF_UNIT,
        }
    }
}

/// A queued file download, observable while the transfer is in flight.
///
/// One `Download` is created per accepted retrieval request and lives in the
/// download queue for the rest of the process. All accessors are safe to
/// call from any thread at any time.
#[derive(Debug)]
pub struct Download {
    received: AtomicU64,
    complete: AtomicBool,
    start_time: SystemTime,
    filesize: u64,
    destination: PathBuf,
    nickname: String,
}

impl Download {
    pub(crate) fn new(nickname: &str, filesize: u64, destination: &Path) -> Download {
        Download {
            received: AtomicU64::new(0),
            complete: AtomicBool::new(false),
            start_time: SystemTime::now(),
            filesize,
            destination: destination.to_path_buf(),
            nickname: nickname.to_string(),
        }
    }

    /// Returns when the download was initiated.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Returns whether the file is ready to be used.
    pub fn complete(&self) -> bool {
        self.complete.load(Ordering::Relaxed)
    }

    /// Returns the declared size of the file.
    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    /// Returns the number of bytes downloaded so far.
    ///
    /// Resets to zero whenever a piece attempt is abandoned, so the value
    /// never exceeds what the destination file currently holds.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Returns the file's location on disk.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Returns the identifier assigned to the file when it was uploaded.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Takes a point-in-time snapshot suitable for serialization.
    pub fn info(&self) -> DownloadInfo {
        DownloadInfo {
            start_time: self.start_time,
            complete: self.complete(),
            filesize: self.filesize,
            received: self.received(),
            destination: self.destination.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

/// Serializable snapshot of a download's status, for the API/CLI layer.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadInfo {
    pub start_time: SystemTime,
    pub complete: bool,
    pub filesize: u64,
    pub received: u64,
    pub destination: PathBuf,
    pub nickname: String,
}

/// Byte-accounting sink for the destination file.
///
/// Owns the session's only handle to the destination. Every write goes to
/// the file first and only then publishes the written count, keeping the
/// observable progress backed by bytes on disk at every instant.
#[derive(Debug)]
pub struct ProgressWriter {
    file: File,
    download: Arc<Download>,
}

impl ProgressWriter {
    pub(crate) fn new(file: File, download: Arc<Download>) -> ProgressWriter {
        ProgressWriter { file, download }
    }

    /// Abandons the current piece attempt: rewinds the file cursor to the
    /// start and zeroes the progress counter. The next attempt overwrites
    /// rather than appends.
    pub(crate) fn reset(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.download.received.store(0, Ordering::Relaxed);
        Ok(())
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.download.received.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// One in-progress attempt to retrieve a whole file back from its pieces.
///
/// Construction creates the destination file on disk before any bytes are
/// confirmed retrievable; file existence is not evidence of success.
#[derive(Debug)]
pub(crate) struct Session {
    download: Arc<Download>,
    sink: ProgressWriter,
    pieces: Vec<Piece>,
    policy: RetryPolicy,
}

impl Session {
    /// Builds a session from a file's full piece list.
    ///
    /// Creates (or truncates) the destination file, filters out pieces whose
    /// contracts are dead, and takes the declared size from the first active
    /// piece — all redundant pieces describe the same logical file.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be created or if no active
    /// pieces remain.
    pub(crate) fn new(
        nickname: &str,
        pieces: &[Piece],
        destination: &Path,
        policy: RetryPolicy,
    ) -> Result<Session, DownloadError> {
        // Create the download destination file
        let file = File::create(destination)?;

        // Filter out the inactive pieces
        let active: Vec<Piece> = pieces.iter().filter(|p| p.active).cloned().collect();
        if active.is_empty() {
            return Err(DownloadError::NoActivePieces);
        }

        let filesize = active[0].contract.filesize;
        let download = Arc::new(Download::new(nickname, filesize, destination));
        let sink = ProgressWriter::new(file, Arc::clone(&download));

        Ok(Session {
            download,
            sink,
            pieces: active,
            policy,
        })
    }

    /// Returns the shared status handle enqueued for observers.
    pub(crate) fn handle(&self) -> Arc<Download> {
        Arc::clone(&self.download)
    }

    /// Runs the retry loop to success or exhaustion.
    ///
    /// Blocks the calling thread. On success the destination file holds one
    /// complete, hash-verified copy and the handle is closed; on exhaustion
    /// the destination is deleted and a terminal error is returned.
    pub(crate) fn run(mut self) -> Result<(), DownloadError> {
        let pieces = mem::take(&mut self.pieces);

        for pass in 0..self.policy.attempts {
            for piece in &pieces {
                match host::fetch_piece(piece, &mut self.sink) {
                    Ok(()) => {
                        info!(
                            "downloaded {:?} from host {}",
                            self.download.nickname, piece.host
                        );
                        self.download.complete.store(true, Ordering::Relaxed);
                        // Dropping the session closes the handle
                        return Ok(());
                    }
                    Err(FetchError::Integrity) => {
                        // The host returned wrong or corrupted data; retried
                        // like any other failure, but worth the louder log
                        warn!(
                            "host {} provided invalid data for {:?} (contract {})",
                            piece.host, self.download.nickname, piece.contract.id
                        );
                    }
                    Err(err) => {
                        debug!(
                            "piece fetch from host {} failed for {:?}: {}",
                            piece.host, self.download.nickname, err
                        );
                    }
                }

                // The file may have been partially written; rewind so the
                // next attempt overwrites those bytes
                if let Err(err) = self.sink.reset() {
                    return self.discard(Some(err));
                }
            }

            // No host returned the piece this pass; wait before the next one
            if pass + 1 < self.policy.attempts {
                thread::sleep(backoff(pass, self.policy.backoff_unit));
            }
        }

        self.discard(None)
    }

    /// Closes the handle, removes the partial file, and reports failure.
    fn discard(self, cause: Option<io::Error>) -> Result<(), DownloadError> {
        let destination = self.download.destination.clone();

        // Close the handle before unlinking
        drop(self.sink);
        if let Err(err) = fs::remove_file(&destination) {
            warn!("could not remove partial file {:?}: {}", destination, err);
        }

        match cause {
            Some(err) => Err(DownloadError::Io(err)),
            None => Err(DownloadError::Exhausted),
        }
    }
}

/// Sleep duration after a fully failed pass.
///
/// Scales with the square of the pass index times a freshly drawn random
/// byte, so later passes back off substantially longer and
/// nondeterministically. Pass zero never waits.
fn backoff(pass: u32, unit: Duration) -> Duration {
    backoff_with_jitter(pass, unit, rand::thread_rng().gen())
}

fn backoff_with_jitter(pass: u32, unit: Duration, jitter: u8) -> Duration {
    unit * (pass * pass * jitter as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;
    use std::process;
    use std::sync::atomic::AtomicU64;

    use crate::piece::{Contract, ContractId, Digest, PieceKey};

    fn temp_path(tag: &str) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("quarry_download_{}_{}_{}", tag, process::id(), id))
    }

    fn test_piece(filesize: u64, active: bool) -> Piece {
        Piece {
            host: "127.0.0.1:1".parse().unwrap(),
            contract: Contract {
                id: ContractId([9; 32]),
                filesize,
                digest: Digest([0; 32]),
            },
            key: PieceKey {
                key: [1; 32],
                nonce: [2; 12],
            },
            active,
        }
    }

    #[test]
    fn progress_writer_publishes_after_write() {
        let path = temp_path("writer");
        let download = Arc::new(Download::new("file", 100, &path));
        let file = File::create(&path).unwrap();
        let mut writer = ProgressWriter::new(file, Arc::clone(&download));

        writer.write_all(b"hello world").unwrap();
        assert_eq!(download.received(), 11);

        writer.write_all(b"!").unwrap();
        assert_eq!(download.received(), 12);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reset_rewinds_and_zeroes() {
        let path = temp_path("reset");
        let download = Arc::new(Download::new("file", 100, &path));
        let file = File::create(&path).unwrap();
        let mut writer = ProgressWriter::new(file, Arc::clone(&download));

        writer.write_all(b"hello world").unwrap();
        writer.reset().unwrap();
        assert_eq!(download.received(), 0);

        // The next attempt overwrites from the start rather than appending
        writer.write_all(b"HELLO").unwrap();
        writer.flush().unwrap();
        assert_eq!(download.received(), 5);

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "HELLO world");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn session_rejects_files_without_active_pieces() {
        let path = temp_path("inactive");

        let err = Session::new("file", &[], &path, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, DownloadError::NoActivePieces));

        let pieces = vec![test_piece(10, false), test_piece(10, false)];
        let err = Session::new("file", &pieces, &path, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, DownloadError::NoActivePieces));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn session_filters_pieces_and_takes_size_from_first_active() {
        let path = temp_path("filter");
        let pieces = vec![
            test_piece(512, false),
            test_piece(1024, true),
            test_piece(1024, true),
        ];

        let session = Session::new("file", &pieces, &path, RetryPolicy::default()).unwrap();
        assert_eq!(session.pieces.len(), 2);
        assert_eq!(session.download.filesize(), 1024);
        assert!(path.exists());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn session_surfaces_destination_errors() {
        let path = std::env::temp_dir().join("quarry_no_such_dir").join("out");
        let pieces = vec![test_piece(10, true)];
        let err = Session::new("file", &pieces, &path, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, DownloadError::Io(_)));
    }

    #[test]
    fn backoff_is_zero_for_the_first_pass() {
        assert_eq!(
            backoff_with_jitter(0, Duration::from_secs(1), 255),
            Duration::ZERO
        );
        assert_eq!(backoff(0, Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_quadratically_with_pass_index() {
        let unit = Duration::from_secs(1);
        assert_eq!(backoff_with_jitter(1, unit, 10), Duration::from_secs(10));
        assert_eq!(backoff_with_jitter(2, unit, 10), Duration::from_secs(40));
        assert_eq!(backoff_with_jitter(3, unit, 10), Duration::from_secs(90));
        assert_eq!(backoff_with_jitter(4, unit, 255), Duration::from_secs(4080));
    }

    #[test]
    fn backoff_scales_with_jitter() {
        let unit = Duration::from_millis(1);
        assert_eq!(backoff_with_jitter(2, unit, 0), Duration::ZERO);
        assert_eq!(
            backoff_with_jitter(2, unit, 100),
            2 * backoff_with_jitter(2, unit, 50)
        );
    }

    #[test]
    fn info_snapshots_current_state() {
        let path = temp_path("info");
        let download = Download::new("report.pdf", 1024, &path);
        download.received.store(512, Ordering::Relaxed);

        let info = download.info();
        assert_eq!(info.nickname, "report.pdf");
        assert_eq!(info.filesize, 1024);
        assert_eq!(info.received, 512);
        assert!(!info.complete);
        assert_eq!(info.destination, path);

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["received"], 512);
        assert_eq!(value["complete"], false);
    }
}
