//! Zip packaging of a stem directory.
//!
//! The archive is flat: no directory entries, one entry per stem file,
//! named by the file's bare name (`vocals.wav`). Entries are stored
//! uncompressed; separated audio barely deflates.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::CoreError;

/// Write `files` into a new zip at `archive_path`, replacing any existing file.
///
/// Runs on the blocking pool. Returns the number of entries written.
pub async fn write_flat_archive(files: Vec<PathBuf>, archive_path: &Path) -> Result<usize, CoreError> {
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || write_flat_archive_blocking(&files, &archive_path))
        .await
        .map_err(|e| CoreError::Internal(format!("Archive task failed: {e}")))?
}

fn write_flat_archive_blocking(files: &[PathBuf], archive_path: &Path) -> Result<usize, CoreError> {
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }

    let file = File::create(archive_path).map_err(|e| CoreError::io(archive_path, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    for path in files {
        let entry_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CoreError::Internal(format!("Stem path has no file name: {}", path.display())))?;

        writer
            .start_file(entry_name.as_str(), entry_options())
            .map_err(|e| CoreError::Internal(format!("Failed to add {entry_name} to archive: {e}")))?;
        let mut source = File::open(path).map_err(|e| CoreError::io(path, e))?;
        std::io::copy(&mut source, &mut writer).map_err(|e| CoreError::io(path, e))?;
    }

    let mut inner = writer
        .finish()
        .map_err(|e| CoreError::Internal(format!("Failed to finalize archive: {e}")))?;
    inner.flush().map_err(|e| CoreError::io(archive_path, e))?;

    Ok(files.len())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true)
}
