//! Flushes dirty owners to disk and restores them on startup.

use std::fs::{self, File};
use std::io::ErrorKind;
#[cfg(not(feature = "persist"))]
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "persist")]
use memmap2::Mmap;

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::store::{OwnerShard, Store};

use super::io_utils::{checksum, classify_io_error, retry_io_operation, write_atomic};
use super::snapshot::{owner_file_name, Manifest, OwnerEntry, OwnerSnapshot, MANIFEST_VERSION};

const MANIFEST_FILE: &str = "manifest.json";
const DATA_DIR: &str = "data";

/// An owner written during the current flush, with the entry for its new file.
type WrittenOwner = (String, Arc<OwnerShard>, OwnerEntry);

/// Counts from one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Owners written successfully
    pub flushed: usize,
    /// Owners whose write failed and stay dirty
    pub failed: usize,
}

/// Checksum status of one owner's data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyEntry {
    pub owner: String,
    pub file: String,
    /// `None` when the file matches its manifest checksum
    pub error: Option<String>,
}

/// Persistence manager for the manifest and owner data files.
#[derive(Debug)]
pub struct PersistenceManager {
    /// Data directory path
    data_dir: PathBuf,
    /// Flush interval in ticks
    flush_interval_ticks: u32,
    /// Current tick count
    tick_count: AtomicU64,
    /// Maximum retry attempts for transient I/O errors
    max_retries: u32,
    /// Delay between retry attempts in milliseconds
    retry_delay_ms: u64,
}

impl PersistenceManager {
    /// Creates a new persistence manager with the given configuration.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            flush_interval_ticks: config.persistence_interval_ticks.max(1),
            tick_count: AtomicU64::new(0),
            max_retries: config.persistence_max_retries,
            retry_delay_ms: config.persistence_retry_delay_ms,
        }
    }

    /// Root of the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(MANIFEST_FILE)
    }

    fn owner_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(DATA_DIR).join(file)
    }

    /// Reads the manifest, or an empty one if none was written yet.
    pub fn read_manifest(&self) -> Result<Manifest, StorageError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest::new());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| classify_io_error(e, "Failed to read manifest"))?;
        let manifest: Manifest = serde_json::from_str(&contents)
            .map_err(|e| StorageError::DataCorruption(format!("Failed to parse manifest: {}", e)))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(StorageError::SerializationError(format!(
                "Unsupported manifest version: {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        retry_io_operation(
            || write_atomic(&self.manifest_path(), &json),
            self.max_retries,
            self.retry_delay_ms,
            "write_manifest",
        )
    }

    /// Restores every owner listed in the manifest into `store`.
    ///
    /// # Returns
    /// The number of owners loaded. Fails with `DataCorruption` if any data
    /// file does not match its checksum.
    pub fn load(&self, store: &Store) -> Result<usize, StorageError> {
        let manifest = self.read_manifest()?;
        for (owner, entry) in &manifest.owners {
            let snapshot = self.read_owner(owner, entry)?;
            store.restore_owner(owner.clone(), snapshot.into_state())?;
        }
        tracing::info!(
            owners = manifest.owners.len(),
            data_dir = %self.data_dir.display(),
            "loaded persisted owners"
        );
        Ok(manifest.owners.len())
    }

    fn read_owner(&self, owner: &str, entry: &OwnerEntry) -> Result<OwnerSnapshot, StorageError> {
        let path = self.owner_path(&entry.file);

        #[cfg(feature = "persist")]
        let snapshot = self.read_owner_mmap(owner, entry, &path)?;

        #[cfg(not(feature = "persist"))]
        let snapshot = self.read_owner_read(owner, entry, &path)?;

        if snapshot.owner != owner {
            return Err(StorageError::DataCorruption(format!(
                "Data file '{}' belongs to owner '{}', expected '{}'",
                entry.file, snapshot.owner, owner
            )));
        }
        Ok(snapshot)
    }

    /// Loads owner data using a plain file read.
    #[cfg(not(feature = "persist"))]
    fn read_owner_read(
        &self,
        owner: &str,
        entry: &OwnerEntry,
        path: &Path,
    ) -> Result<OwnerSnapshot, StorageError> {
        let mut file =
            File::open(path).map_err(|e| classify_io_error(e, "Failed to open data file"))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| classify_io_error(e, "Failed to read data file"))?;
        decode_owner(owner, entry, &data)
    }

    /// Loads owner data through a read-only memory map.
    #[cfg(feature = "persist")]
    fn read_owner_mmap(
        &self,
        owner: &str,
        entry: &OwnerEntry,
        path: &Path,
    ) -> Result<OwnerSnapshot, StorageError> {
        let file =
            File::open(path).map_err(|e| classify_io_error(e, "Failed to open data file"))?;
        // SAFETY: data files are only replaced by rename, never modified in place.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| classify_io_error(e, "Failed to memory map data file"))?;
        decode_owner(owner, entry, &mmap)
    }

    /// Checks every data file against its manifest checksum.
    pub fn verify(&self) -> Result<Vec<VerifyEntry>, StorageError> {
        let manifest = self.read_manifest()?;
        let mut entries = Vec::with_capacity(manifest.owners.len());
        for (owner, entry) in &manifest.owners {
            let error = match self.read_owner(owner, entry) {
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            entries.push(VerifyEntry {
                owner: owner.clone(),
                file: entry.file.clone(),
                error,
            });
        }
        Ok(entries)
    }

    /// Writes every owner changed since its last flush, then the manifest.
    ///
    /// A failed owner is logged, marked dirty again and retried on the next
    /// flush; the rest of the pass continues. Each write lands in a new file,
    /// so the manifest on disk keeps pointing at intact data until it is
    /// replaced. If the manifest write fails, every owner of the pass is
    /// marked dirty again and the error is returned.
    pub fn flush_dirty(&self, store: &Store) -> Result<FlushReport, StorageError> {
        let mut report = FlushReport::default();
        let mut written = Vec::new();

        for (owner, shard) in store.shards()? {
            if !shard.take_dirty() {
                continue;
            }
            let snapshot = match shard.read() {
                Ok(state) => OwnerSnapshot::capture(&owner, &state),
                Err(e) => {
                    shard.mark_dirty();
                    redirty(&written);
                    return Err(e);
                }
            };
            match self.write_owner(&snapshot) {
                Ok(entry) => {
                    report.flushed += 1;
                    written.push((owner, shard, entry));
                }
                Err(e) => {
                    tracing::error!(owner = %owner, error = %e, "failed to flush owner");
                    shard.mark_dirty();
                    report.failed += 1;
                }
            }
        }

        if !written.is_empty() {
            if let Err(e) = self.commit_manifest(&written) {
                tracing::error!(
                    owners = written.len(),
                    error = %e,
                    "failed to write manifest, owners stay dirty"
                );
                redirty(&written);
                return Err(e);
            }
        }

        if report.flushed > 0 || report.failed > 0 {
            tracing::debug!(
                flushed = report.flushed,
                failed = report.failed,
                "persistence flush completed"
            );
        }
        Ok(report)
    }

    /// Points the manifest at the freshly written files, then removes the
    /// files it no longer names.
    ///
    /// If the manifest cannot be replaced, the new files it would have
    /// named are removed instead and the previous manifest stays in effect.
    fn commit_manifest(&self, written: &[WrittenOwner]) -> Result<(), StorageError> {
        let previous = self.read_manifest()?;

        let mut manifest = previous.clone();
        for (owner, _, entry) in written {
            manifest.owners.insert(owner.clone(), entry.clone());
        }
        if let Err(e) = self.write_manifest(&manifest) {
            self.remove_new_files(&previous, written);
            return Err(e);
        }

        for (owner, _, entry) in written {
            if let Some(old) = previous.owners.get(owner) {
                if old.file != entry.file {
                    self.remove_data_file(&old.file);
                }
            }
        }
        Ok(())
    }

    /// Removes files from `written` that `manifest` does not reference.
    fn remove_new_files(&self, manifest: &Manifest, written: &[WrittenOwner]) {
        for (owner, _, entry) in written {
            let referenced = manifest
                .owners
                .get(owner)
                .is_some_and(|current| current.file == entry.file);
            if !referenced {
                self.remove_data_file(&entry.file);
            }
        }
    }

    fn remove_data_file(&self, file: &str) {
        if let Err(e) = fs::remove_file(self.owner_path(file)) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(file, error = %e, "failed to remove superseded data file");
            }
        }
    }

    /// Marks every owner dirty and flushes them all.
    pub fn flush_all(&self, store: &Store) -> Result<FlushReport, StorageError> {
        for (_, shard) in store.shards()? {
            shard.mark_dirty();
        }
        self.flush_dirty(store)
    }

    fn write_owner(&self, snapshot: &OwnerSnapshot) -> Result<OwnerEntry, StorageError> {
        let json = serde_json::to_vec(snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let crc = checksum(&json);
        let file = owner_file_name(&snapshot.owner, crc);
        let path = self.owner_path(&file);

        retry_io_operation(
            || {
                fs::create_dir_all(self.data_dir.join(DATA_DIR))
                    .map_err(|e| classify_io_error(e, "Failed to create data directory"))?;
                write_atomic(&path, &json)
            },
            self.max_retries,
            self.retry_delay_ms,
            "write_owner",
        )?;

        Ok(OwnerEntry {
            file,
            checksum: crc,
        })
    }

    /// Advances the tick counter, flushing dirty owners every interval.
    pub fn tick(&self, store: &Store) -> Result<Option<FlushReport>, StorageError> {
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        if tick % u64::from(self.flush_interval_ticks) != 0 {
            return Ok(None);
        }
        tracing::debug!(
            tick,
            interval = self.flush_interval_ticks,
            "persistence tick triggering flush"
        );
        self.flush_dirty(store).map(Some)
    }
}

fn redirty(written: &[WrittenOwner]) {
    for (_, shard, _) in written {
        shard.mark_dirty();
    }
}

/// Verifies the checksum of `data` and parses it.
fn decode_owner(owner: &str, entry: &OwnerEntry, data: &[u8]) -> Result<OwnerSnapshot, StorageError> {
    let actual = checksum(data);
    if actual != entry.checksum {
        return Err(StorageError::DataCorruption(format!(
            "Checksum mismatch for owner '{}': expected {:08x}, got {:08x}",
            owner, entry.checksum, actual
        )));
    }
    serde_json::from_slice(data).map_err(|e| {
        StorageError::DataCorruption(format!("Failed to parse data for owner '{}': {}", owner, e))
    })
}
