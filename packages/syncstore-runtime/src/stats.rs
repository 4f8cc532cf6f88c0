//! Counters describing what the runtime has done so far.

/// Cumulative runtime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Ticks executed
    pub ticks: u64,
    /// Sweep passes run
    pub sweeps: u64,
    /// Sweep passes that hit an error
    pub failed_sweeps: u64,
    /// Expired objects removed by sweeps
    pub purged_records: u64,
    /// Owners written by flushes
    pub flushed_owners: u64,
    /// Flush passes that hit an error
    pub failed_flushes: u64,
}

impl RuntimeStats {
    pub(crate) fn record_sweep(&mut self, purged: usize) {
        self.sweeps += 1;
        self.purged_records += purged as u64;
    }

    pub(crate) fn record_sweep_failure(&mut self) {
        self.failed_sweeps += 1;
    }

    pub(crate) fn record_flush(&mut self, flushed: usize, failed: bool) {
        self.flushed_owners += flushed as u64;
        if failed {
            self.failed_flushes += 1;
        }
    }
}
