//! Storage configuration.

use std::path::PathBuf;

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maintenance tick rate in Hz (1-120)
    pub tickrate: u32,
    /// Persistence interval in ticks
    pub persistence_interval_ticks: u32,
    /// Expiry sweep interval in ticks
    pub sweep_interval_ticks: u32,
    /// Data directory for persistence
    pub data_dir: PathBuf,
    /// Whether owner data is flushed to `data_dir`
    pub persist: bool,
    /// Maximum payload size per object in bytes
    pub max_payload_bytes: usize,
    /// Maximum objects applied per batch; the rest fail with `retry bso`
    pub max_batch_records: usize,
    /// Request body read timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum retry attempts for transient I/O errors
    pub persistence_max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub persistence_retry_delay_ms: u64,
}

impl StoreConfig {
    /// Returns a config that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            persist: false,
            ..Default::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tickrate: 10,
            persistence_interval_ticks: 50, // 5 seconds at 10 Hz
            sweep_interval_ticks: 600,      // 1 minute at 10 Hz
            data_dir: PathBuf::from("./data"),
            persist: true,
            max_payload_bytes: 256 * 1024,
            max_batch_records: 100,
            request_timeout_ms: 5000,
            persistence_max_retries: 3,
            persistence_retry_delay_ms: 100,
        }
    }
}
