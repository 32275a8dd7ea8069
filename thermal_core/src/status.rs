//! Status returned from each control loop iteration.

/// Outcome of one `tick()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickStatus {
    /// Ticks executed since `initialize()`, including this one.
    pub tick: u64,
    /// Zones that latched a fault during this tick.
    pub newly_faulted: usize,
    /// Zones currently holding a fault.
    pub faulted: usize,
    /// An autotune session was still running after this tick.
    pub autotune_active: bool,
}

impl TickStatus {
    pub fn any_faulted(&self) -> bool {
        self.faulted > 0
    }
}
