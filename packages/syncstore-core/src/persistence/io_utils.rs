//! I/O helpers shared by persistence operations.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::Duration;

use crate::error::StorageError;

/// Maps an I/O error onto the storage error taxonomy by its kind.
pub fn classify_io_error(error: std::io::Error, context: &str) -> StorageError {
    let message = format!("{}: {}", context, error);
    match error.kind() {
        ErrorKind::StorageFull | ErrorKind::OutOfMemory => StorageError::DiskFull(message),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            StorageError::TransientIoError(message)
        }
        _ => StorageError::IoError(message),
    }
}

/// Runs `operation`, retrying only transient I/O failures.
pub fn retry_io_operation<F, T>(
    operation: F,
    max_retries: u32,
    retry_delay_ms: u64,
    context: &str,
) -> Result<T, StorageError>
where
    F: Fn() -> Result<T, StorageError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(StorageError::TransientIoError(message)) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    context,
                    attempt,
                    max_retries,
                    error = %message,
                    "transient I/O error, retrying"
                );
                if retry_delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(retry_delay_ms));
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Replaces `path` with `bytes` via a synced temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| classify_io_error(e, "Failed to create temp file"))?;
    file.write_all(bytes)
        .map_err(|e| classify_io_error(e, "Failed to write temp file"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "Failed to sync temp file"))?;

    fs::rename(&temp_path, path).map_err(|e| classify_io_error(e, "Failed to rename temp file"))
}

/// CRC32 of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}
