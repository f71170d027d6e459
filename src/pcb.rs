//! Process control block: saved registers, block state, priority and
//! starvation statistics. Owned exclusively by the process table; the
//! "current process" is a borrowed reference re-resolved each step rather
//! than a PCB shared between the scheduler and the CPU.

use crate::config::Tick;
use crate::registers::Registers;
use crate::word::{DeviceId, Pid, Word};

/// What a process is waiting on while `Blocked`. Stores only the device id,
/// never a reference to the device record itself — see the design note on
/// breaking PCB/DeviceRecord cyclic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedOp {
    Open,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockState {
    pub device_id: DeviceId,
    pub op: BlockedOp,
    pub addr: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Blocked(BlockState),
}

#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: Pid,
    pub saved: Registers,
    pub state: RunState,
    pub priority: i64,
    pub last_ready_tick: Tick,
    pub num_ready_entries: u64,
    pub max_starve_ticks: u64,
    pub avg_starve_ticks: f64,
    /// True for the canned filler program the scheduler runs when no user
    /// process is ready.
    pub is_idle: bool,
}

impl Pcb {
    pub fn new(pid: Pid, saved: Registers, priority: i64, created_at: Tick) -> Pcb {
        Pcb {
            pid,
            saved,
            state: RunState::Ready,
            priority,
            last_ready_tick: created_at,
            num_ready_entries: 0,
            max_starve_ticks: 0,
            avg_starve_ticks: 0.0,
            is_idle: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, RunState::Ready)
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.state, RunState::Blocked(_))
    }

    pub fn blocked_on(&self, device_id: DeviceId, op: BlockedOp, addr: Word) -> bool {
        matches!(self.state, RunState::Blocked(b) if b.device_id == device_id && b.op == op && b.addr == addr)
    }

    /// Record a transition into Ready and update starvation statistics for
    /// the span just spent waiting (since `last_ready_tick` was last set).
    pub fn record_starvation(&mut self, now: Tick) {
        let waited = now.saturating_sub(self.last_ready_tick);
        self.max_starve_ticks = self.max_starve_ticks.max(waited);
        self.num_ready_entries += 1;
        let n = self.num_ready_entries as f64;
        self.avg_starve_ticks += (waited as f64 - self.avg_starve_ticks) / n;
    }
}
