//! Priority scheduler with aging and I/O reward (spec §4.5).

use crate::config::{SimConfig, Tick};
use crate::pcb::RunState;
use crate::process_table::ProcessTable;
use crate::registers::Registers;
use crate::word::Pid;

#[derive(Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler
    }

    /// Step 1 of `get_next_process`: on an aging boundary, bump the
    /// priority of every ready, non-current process.
    pub fn apply_aging(&self, table: &mut ProcessTable, current: Option<Pid>, tick: Tick, config: &SimConfig) {
        if config.clock_freq == 0 || config.aging_time == 0 {
            return;
        }
        if (tick.0 / config.clock_freq) % config.aging_time != 0 {
            return;
        }
        for pcb in table.iter_mut() {
            if pcb.is_ready() && Some(pcb.pid) != current {
                pcb.priority += config.aging_priority;
            }
        }
    }

    /// Steps 2-4: pick the next process to run, favoring the current
    /// process by `priority_threshold` to avoid thrashing, tie-breaking on
    /// earliest table index. Returns `None` when no process is runnable —
    /// the caller must create an idle process and call again.
    pub fn select(&self, table: &ProcessTable, current: Option<Pid>, config: &SimConfig) -> Option<Pid> {
        let mut best: Option<Pid> = None;
        let mut best_priority = i64::MIN;

        if let Some(pid) = current {
            if let Some(pcb) = table.get(pid) {
                if pcb.is_ready() || matches!(pcb.state, RunState::Running) {
                    best = Some(pid);
                    best_priority = pcb.priority + config.priority_threshold;
                }
            }
        }

        for pcb in table.iter() {
            if !pcb.is_ready() {
                continue;
            }
            if pcb.priority > best_priority {
                best = Some(pcb.pid);
                best_priority = pcb.priority;
            }
        }

        best
    }

    /// Save `cpu_regs` into the outgoing PCB, mark it `Ready`, and load the
    /// incoming PCB's registers into `cpu_regs`. Used when the outgoing
    /// process simply yields the CPU (a clock tick, or an explicit `YIELD`)
    /// rather than blocking or exiting. Returns `true` if an actual switch
    /// occurred (the two pids differ), which is what the caller uses to
    /// decide whether to charge the context-switch overhead.
    pub fn context_switch(
        &self,
        table: &mut ProcessTable,
        from: Option<Pid>,
        to: Pid,
        cpu_regs: &mut Registers,
        tick: Tick,
    ) -> bool {
        let switched = from != Some(to);

        if let Some(from_pid) = from {
            if from_pid != to {
                if let Some(pcb) = table.get_mut(from_pid) {
                    pcb.saved = *cpu_regs;
                    pcb.state = RunState::Ready;
                    pcb.last_ready_tick = tick;
                }
            }
        }

        self.switch_in(table, to, cpu_regs, tick, switched);
        switched
    }

    /// Load the chosen PCB's registers into `cpu_regs` and mark it
    /// `Running`, without touching whatever PCB was previously current. Used
    /// after a process has already been blocked, exited, or otherwise had
    /// its own state set by the caller, so this never clobbers that state
    /// back to `Ready` the way [`Scheduler::context_switch`] would.
    pub fn switch_in(&self, table: &mut ProcessTable, to: Pid, cpu_regs: &mut Registers, tick: Tick, switched: bool) {
        let pcb = table.get_mut(to).expect("scheduler selected a pid not in the table");
        if switched {
            pcb.record_starvation(tick);
        }
        pcb.state = RunState::Running;
        *cpu_regs = pcb.saved;
    }
}
