//! Uploaded audio assets and the stored-filename convention.
//!
//! Convention: `{YYYYmmdd_HHMMSS}_{base}{_index}{.ext}`
//!
//! - `base` = original file stem, after dropping any client-supplied directories
//! - `_index` = `"_1"`, `"_2"`, etc. only when the plain name is already taken
//! - `.ext` = the original extension, verbatim (case preserved)

use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::CoreError;
use crate::types::{Timestamp, STAMP_FORMAT};

/// Container extensions accepted by the upload control (compared case-insensitively).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a"];

/// A file submitted through the upload form. Immutable once created.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    original_filename: String,
    bytes: Vec<u8>,
    uploaded_at: Timestamp,
}

impl UploadedAsset {
    /// Create an asset stamped with the current time.
    pub fn new(original_filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::with_timestamp(original_filename, bytes, chrono::Utc::now())
    }

    pub fn with_timestamp(
        original_filename: impl Into<String>,
        bytes: Vec<u8>,
        uploaded_at: Timestamp,
    ) -> Self {
        Self {
            original_filename: original_filename.into(),
            bytes,
            uploaded_at,
        }
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn uploaded_at(&self) -> Timestamp {
        self.uploaded_at
    }

    /// Local wall-clock time of the upload, used for the filename stamp.
    pub fn local_time(&self) -> NaiveDateTime {
        self.uploaded_at.with_timezone(&chrono::Local).naive_local()
    }
}

/// Reduce a client-supplied filename to its final component.
///
/// Browsers may send `C:\music\song.mp3` or `album/song.mp3`; both
/// separators are stripped regardless of the host platform.
pub fn base_filename(original: &str) -> &str {
    original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim()
}

/// Validate the filename's extension against [`ACCEPTED_EXTENSIONS`].
///
/// Returns the lowercased extension. Only the name is inspected, never the
/// content.
pub fn check_extension(filename: &str) -> Result<String, CoreError> {
    let ext = Path::new(base_filename(filename))
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported audio format '.{ext}'. Supported: {}",
            ACCEPTED_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// Build the stored filename for an upload.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use stemsplit_core::upload::stored_filename;
///
/// let at = NaiveDate::from_ymd_opt(2024, 1, 1)
///     .unwrap()
///     .and_hms_opt(12, 0, 0)
///     .unwrap();
/// assert_eq!(stored_filename("song.mp3", at, None).unwrap(), "20240101_120000_song.mp3");
/// assert_eq!(stored_filename("song.mp3", at, Some(2)).unwrap(), "20240101_120000_song_2.mp3");
/// ```
pub fn stored_filename(
    original: &str,
    at: NaiveDateTime,
    index: Option<u32>,
) -> Result<String, CoreError> {
    let base = base_filename(original);
    let path = Path::new(base);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::Validation(format!("Invalid upload filename '{original}'")))?;

    let mut name = format!("{}_{stem}", at.format(STAMP_FORMAT));

    if let Some(idx) = index {
        name.push('_');
        name.push_str(&idx.to_string());
    }

    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    Ok(name)
}
