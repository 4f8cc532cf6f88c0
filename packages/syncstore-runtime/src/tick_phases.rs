//! Tick phase dispatch.

use std::time::Instant;

use crate::runtime::TickPhase;
use crate::Result;

/// Trait for tick phase processing
pub trait TickPhaseProcessor {
    /// Process a specific tick phase
    fn process_tick_phase(&mut self, phase: TickPhase, tick_start: Instant) -> Result<()>;
}

impl TickPhaseProcessor for crate::Runtime {
    fn process_tick_phase(&mut self, phase: TickPhase, tick_start: Instant) -> Result<()> {
        match phase {
            TickPhase::Commands => self.process_command_phase(),
            TickPhase::Sweep => self.process_sweep_phase(),
            TickPhase::Persistence => self.process_persistence_phase(),
        }?;
        tracing::trace!(?phase, elapsed = ?tick_start.elapsed(), "tick phase done");
        Ok(())
    }
}
