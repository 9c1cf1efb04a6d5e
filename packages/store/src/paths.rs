//! File layout inside a store's data directory.

use std::path::{Path, PathBuf};

/// Flat-file table name.
pub const TABLE_FILE: &str = "tracks.csv";

/// Flat-file high-water mark name.
pub const SEQUENCE_FILE: &str = "tracks.seq";

/// Document database directory name.
pub const DOCUMENT_DB_DIR: &str = "tracks.sled";

/// Returns the flat-file table path.
#[must_use]
pub fn table_path(data_dir: &Path) -> PathBuf {
    data_dir.join(TABLE_FILE)
}

/// Returns the flat-file high-water mark path.
#[must_use]
pub fn sequence_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SEQUENCE_FILE)
}

/// Returns the document database path.
#[must_use]
pub fn document_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DOCUMENT_DB_DIR)
}

/// Returns the sibling path used while atomically replacing `path`.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
