use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// Replace the contents of `path` atomically.
///
/// The data is written to a hidden temp file in the same directory, synced,
/// and renamed over the target. A crash at any point leaves either the old
/// file or the new one, never a truncated mix. Readers that race the rename
/// see one complete version or the other.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path)?;

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(contents.as_bytes())?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Temp file sibling for `path`, e.g. `.config.json.tmp` next to `config.json`.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        )
    })?;

    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;

    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}
