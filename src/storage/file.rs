//! Atomic file operations.
//!
//! Writes go to a temp file next to the target, are synced to disk, then
//! renamed over the target, so readers see either the old or the new
//! content and never a partial file.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Write content to a file atomically.
///
/// This function:
/// 1. Creates the parent directory if needed
/// 2. Writes content to `<path>.tmp` (mode 0600 on unix)
/// 3. Calls `fsync` to ensure data is on disk
/// 4. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let file = opts.open(temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(temp_path, path)
}
