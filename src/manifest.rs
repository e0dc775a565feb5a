//! # Piece Manifests
//!
//! A manifest is the JSON form of a file catalog: for each file, its
//! nickname and the descriptors of its stored pieces, with binary fields
//! (contract ids, keys, nonces, digests) hex-encoded. The CLI loads one at
//! startup to populate a [`Renter`](crate::Renter).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::piece::Piece;

/// A catalog of files and their stored pieces.
#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestFile>,
}

/// One file entry in a manifest.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestFile {
    pub nickname: String,
    pub pieces: Vec<Piece>,
}

/// A failure to load or parse a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("could not read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse manifest: {0}")]
    Json(#[from] serde_json::Error),
}

impl Manifest {
    /// Loads a manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Returns the entry with the given nickname, if present.
    pub fn file(&self, nickname: &str) -> Option<&ManifestFile> {
        self.files.iter().find(|f| f.nickname == nickname)
    }
}
