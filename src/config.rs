//! Simulation-wide tunables, grouped so tests can reproduce the literal
//! scenarios in the specification without touching free constants.

/// A monotonically increasing simulation tick. Wraps the counter type the
/// CPU advances once per executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Tick(pub u64);

impl Tick {
    pub fn advance(self) -> Tick {
        Tick(self.0.wrapping_add(1))
    }

    pub fn saturating_sub(self, other: Tick) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

/// Tunable constants for one simulation run. Defaults match nothing in
/// particular; individual tests override them to reproduce the literal
/// scenarios from the spec (e.g. `CLOCK_FREQ=5, AGING_TIME=1`).
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Total words of RAM the machine is built with.
    pub ram_size: usize,
    /// Instructions executed between clock interrupts.
    pub clock_freq: u64,
    /// Number of clock periods between aging passes.
    pub aging_time: u64,
    /// Priority bump applied to every ready, non-current process on an
    /// aging pass.
    pub aging_priority: i64,
    /// Hysteresis bias added to the current process's priority so the
    /// scheduler doesn't thrash between equally-ranked processes.
    pub priority_threshold: i64,
    /// Priority reward for issuing a successful read request.
    pub read_priority: i64,
    /// Priority reward for issuing a successful write request.
    pub write_priority: i64,
    /// Ticks charged to the clock for a context switch (save + restore).
    pub context_switch_cost: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            ram_size: 4096,
            clock_freq: 100,
            aging_time: 10,
            aging_priority: 4,
            priority_threshold: 50,
            read_priority: 1,
            write_priority: 1,
            context_switch_cost: 30,
        }
    }
}
