//! Locating and enumerating the engine's stem output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CoreError;

/// Directory the engine writes stems into for a given source file.
///
/// Layout: `<output_root>/<model_name>/<source base name>` (no extension).
pub fn expected_dir(output_root: &Path, model_name: &str, source_base_name: &str) -> PathBuf {
    output_root.join(model_name).join(source_base_name)
}

/// The files one successful separation produced.
#[derive(Debug, Clone, Serialize)]
pub struct StemSet {
    pub dir: PathBuf,
    /// Regular files directly inside `dir`, in file-name order.
    pub files: Vec<PathBuf>,
}

impl StemSet {
    /// Read the regular files directly inside `dir`.
    ///
    /// Subdirectories are not descended into and are left out.
    pub async fn load(dir: &Path) -> Result<Self, CoreError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| CoreError::io(dir, e))?;
        let mut files = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::io(dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CoreError::io(entry.path(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    /// Stem name to file path, e.g. `"vocals" -> .../vocals.wav`.
    pub fn stems(&self) -> BTreeMap<String, &Path> {
        self.files
            .iter()
            .map(|p| {
                let name = p
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (name, p.as_path())
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
