//! Runtime loop with tick phases and timing enforcement.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use syncstore_core::persistence::{FlushReport, PersistenceManager};
use syncstore_core::Store;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::stats::RuntimeStats;
use crate::tick_phases::TickPhaseProcessor;
use crate::{MaintenanceCommand, Result};

/// Seconds between periodic stats log lines.
const STATS_LOG_INTERVAL_SECS: u64 = 60;

/// Runtime tick phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// Drain and answer maintenance commands
    Commands,
    /// Expiry sweep, every `sweep_interval_ticks`
    Sweep,
    /// Persistence flush, every `persistence_interval_ticks`
    Persistence,
}

impl TickPhase {
    /// Every phase in the order a tick runs them.
    pub const ALL: [TickPhase; 3] = [TickPhase::Commands, TickPhase::Sweep, TickPhase::Persistence];
}

/// Main maintenance loop
pub struct Runtime {
    /// Store being maintained
    store: Arc<Store>,
    /// Flushes dirty owners; `None` for in-memory stores
    persistence: Option<PersistenceManager>,
    /// Tick duration
    tick_duration: Duration,
    /// Command receiver
    command_rx: mpsc::UnboundedReceiver<MaintenanceCommand>,
    /// Ticks between sweeps
    sweep_interval_ticks: u64,
    /// Ticks between stats log lines
    stats_interval_ticks: u64,
    /// Cumulative counters, shared with observers
    stats: Arc<Mutex<RuntimeStats>>,
    /// Current tick count
    tick_count: u64,
    /// Set by `Shutdown` or a closed command channel
    shutdown_requested: bool,
}

impl Runtime {
    /// Creates a runtime for `store`, configured from the store's config.
    pub fn new(
        store: Arc<Store>,
        persistence: Option<PersistenceManager>,
        command_rx: mpsc::UnboundedReceiver<MaintenanceCommand>,
    ) -> Self {
        let config = store.config();
        let tickrate = config.tickrate.clamp(1, 120);
        let tick_duration = Duration::from_secs_f64(1.0 / f64::from(tickrate));
        let sweep_interval_ticks = u64::from(config.sweep_interval_ticks.max(1));
        let stats_interval_ticks = u64::from(tickrate) * STATS_LOG_INTERVAL_SECS;
        Self {
            store,
            persistence,
            tick_duration,
            command_rx,
            sweep_interval_ticks,
            stats_interval_ticks,
            stats: Arc::new(Mutex::new(RuntimeStats::default())),
            tick_count: 0,
            shutdown_requested: false,
        }
    }

    /// Snapshot of the runtime counters.
    pub fn stats(&self) -> RuntimeStats {
        *self.stats.lock()
    }

    /// Shared handle to the counters, readable while the loop runs.
    pub fn stats_handle(&self) -> Arc<Mutex<RuntimeStats>> {
        self.stats.clone()
    }

    /// Returns true once the loop has been asked to stop.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Execute a single tick of the runtime
    pub fn tick(&mut self) -> Result<()> {
        let tick_start = Instant::now();
        self.tick_count += 1;

        for phase in TickPhase::ALL {
            self.process_tick_phase(phase, tick_start)?;
        }

        let stats = {
            let mut stats = self.stats.lock();
            stats.ticks += 1;
            *stats
        };
        if self.tick_count % self.stats_interval_ticks == 0 {
            tracing::info!(
                ticks = stats.ticks,
                sweeps = stats.sweeps,
                purged = stats.purged_records,
                failed_sweeps = stats.failed_sweeps,
                flushed = stats.flushed_owners,
                failed_flushes = stats.failed_flushes,
                "runtime stats"
            );
        }

        self.sleep_remaining(tick_start);
        Ok(())
    }

    /// Run the runtime loop until shutdown, then flush once more (blocking)
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            tick_ms = self.tick_duration.as_millis() as u64,
            persistence = self.persistence.is_some(),
            "maintenance runtime started"
        );
        while !self.shutdown_requested {
            self.tick()?;
        }

        let report = self.flush_now()?;
        tracing::info!(flushed = report.flushed, "maintenance runtime stopped after final flush");
        Ok(())
    }

    /// Drains pending commands without blocking.
    pub(crate) fn process_command_phase(&mut self) -> Result<()> {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.shutdown_requested {
                        tracing::info!("command channel closed, shutting down");
                    }
                    self.shutdown_requested = true;
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, command: MaintenanceCommand) {
        tracing::debug!(?command, "maintenance command");
        match command {
            MaintenanceCommand::Flush { response } => {
                let result = self.flush_now();
                if let Some(response) = response {
                    let _ = response.send(result);
                }
            }
            MaintenanceCommand::Sweep { response } => {
                let result = self.sweep_now();
                if let Some(response) = response {
                    let _ = response.send(result);
                }
            }
            MaintenanceCommand::Shutdown => {
                self.shutdown_requested = true;
            }
        }
    }

    /// Sweeps expired objects every `sweep_interval_ticks`.
    ///
    /// A failed sweep is logged and counted; the loop keeps running.
    pub(crate) fn process_sweep_phase(&mut self) -> Result<()> {
        if self.tick_count % self.sweep_interval_ticks != 0 {
            return Ok(());
        }
        if let Err(e) = self.sweep_now() {
            tracing::error!(error = %e, "periodic sweep failed");
        }
        Ok(())
    }

    /// Lets the persistence manager flush on its own interval.
    pub(crate) fn process_persistence_phase(&mut self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        match persistence.tick(&self.store) {
            Ok(Some(report)) => self.record_flush(&report),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "periodic flush failed");
                self.stats.lock().record_flush(0, true);
            }
        }
        Ok(())
    }

    fn sweep_now(&mut self) -> Result<usize> {
        match self.store.purge_expired() {
            Ok(purged) => {
                self.stats.lock().record_sweep(purged);
                Ok(purged)
            }
            Err(e) => {
                self.stats.lock().record_sweep_failure();
                Err(e)
            }
        }
    }

    fn flush_now(&mut self) -> Result<FlushReport> {
        let Some(persistence) = &self.persistence else {
            return Ok(FlushReport::default());
        };
        match persistence.flush_dirty(&self.store) {
            Ok(report) => {
                self.record_flush(&report);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "flush failed");
                self.stats.lock().record_flush(0, true);
                Err(e)
            }
        }
    }

    fn record_flush(&self, report: &FlushReport) {
        self.stats
            .lock()
            .record_flush(report.flushed, report.failed > 0);
    }

    /// Sleep remaining tick time
    fn sleep_remaining(&self, tick_start: Instant) {
        if let Some(remaining) = self.tick_duration.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
