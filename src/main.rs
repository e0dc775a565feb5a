//! # Quarry CLI
//!
//! A command-line client for retrieving files back from untrusted storage
//! hosts.
//!
//! ## Usage
//!
//! ```bash
//! quarry <manifest.json> <nickname>
//! quarry <manifest.json> <nickname> -o <output_file>
//! ```
//!
//! The manifest describes each file's stored pieces: which host holds each
//! redundant copy, under which contract, with which decryption key and
//! expected digest. The download blocks the main thread while a monitor
//! thread drives a progress bar off the session's atomic byte counter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use quarry::{Manifest, Renter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A client for retrieving files back from untrusted storage hosts."
)]
struct Args {
    /// Path to the piece manifest (JSON)
    manifest: String,

    /// Nickname of the file to retrieve
    nickname: String,

    /// Output filename (defaults to the nickname)
    #[arg(short = 'o', long)]
    output: Option<String>,
}

/// Sanitize a filename to prevent path traversal and basic issues.
fn sanitize_filename(filename: &str) -> String {
    // Replace path separators with underscores to prevent directory traversal
    let safe_name = filename.replace(['/', '\\'], "_");

    // Use default name if empty
    if safe_name.trim().is_empty() {
        "download".to_string()
    } else {
        safe_name
    }
}

fn run(args: Args) -> Result<()> {
    // Check if manifest file exists
    if !Path::new(&args.manifest).exists() {
        return Err(anyhow!("could not find manifest file: {}", args.manifest));
    }

    // Load the manifest and populate the catalog
    let manifest = Manifest::load(&args.manifest)?;
    let filesize = manifest
        .file(&args.nickname)
        .ok_or_else(|| anyhow!("no file of that nickname: {:?}", args.nickname))?
        .pieces
        .first()
        .map(|piece| piece.contract.filesize)
        .unwrap_or(0);

    let renter = Arc::new(Renter::new());
    for file in manifest.files {
        renter.insert_file(&file.nickname, file.pieces);
    }

    // Determine output filename
    let output = args
        .output
        .unwrap_or_else(|| sanitize_filename(&args.nickname));
    let output_path = PathBuf::from(&output);

    // Create progress bar
    let pb = ProgressBar::new(filesize);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
            .unwrap()
            .progress_chars("#>-"),
    );

    // Poll the session's byte counter from a monitor thread while the
    // download blocks the main thread
    let done = Arc::new(AtomicBool::new(false));
    let monitor = {
        let renter = Arc::clone(&renter);
        let done = Arc::clone(&done);
        let pb = pb.clone();
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                if let Some(download) = renter.download_queue().first() {
                    pb.set_position(download.received());
                }
                thread::sleep(Duration::from_millis(100));
            }
        })
    };

    let result = renter.download(&args.nickname, &output_path);
    done.store(true, Ordering::Relaxed);
    let _ = monitor.join();

    match result {
        Ok(()) => {
            pb.set_position(filesize);
            pb.finish();
            println!("Saved in \"{}\".", output);
            Ok(())
        }
        Err(error) => {
            pb.abandon();
            Err(anyhow!("could not download {:?}: {}", args.nickname, error))
        }
    }
}

fn main() {
    // Initialize logger
    pretty_env_logger::init_timed();

    // Parse arguments
    let args = Args::parse();

    // Run program, eventually exit failure
    if let Err(error) = run(args) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }

    std::process::exit(0);
}
