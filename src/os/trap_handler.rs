//! `impl TrapHandler for Kernel`: the callbacks `Cpu::step` invokes (spec
//! §4.4). Hardware traps are fatal; I/O completions unblock whichever PCB
//! was waiting; the clock interrupt drives a reschedule.

use crate::config::Tick;
use crate::cpu::{HaltReason, TrapHandler};
use crate::instruction::RawInstruction;
use crate::pcb::{BlockedOp, RunState};
use crate::ram::Ram;
use crate::registers::Registers;
use crate::word::{DeviceId, Word};

use super::{push_to_saved, Kernel};
use crate::error::SyscallStatus;

impl TrapHandler for Kernel {
    fn illegal_memory_access(&mut self, addr: Word) {
        self.fatal(HaltReason::IllegalMemoryAccess(addr));
    }

    fn divide_by_zero(&mut self) {
        self.fatal(HaltReason::DivideByZero);
    }

    fn illegal_instruction(&mut self, raw: RawInstruction) {
        self.fatal(HaltReason::IllegalInstruction(raw.0[0]));
    }

    fn system_call(&mut self, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
        super::syscalls::dispatch(self, ram, regs, tick);
    }

    fn io_read_complete(&mut self, ram: &mut Ram, device_id: DeviceId, addr: Word, data: Word, tick: Tick) {
        let Some(pcb) = self
            .process_table
            .iter_mut()
            .find(|p| p.blocked_on(device_id, BlockedOp::Read, addr))
        else {
            // The requesting process exited before its I/O completed.
            // Spec §5: drop the completion, never fault.
            tracing::debug!(%device_id, addr, "read completion for a process that no longer exists");
            return;
        };
        push_to_saved(pcb, ram, data);
        push_to_saved(pcb, ram, SyscallStatus::Success.as_word());
        pcb.state = RunState::Ready;
        pcb.last_ready_tick = tick;
        tracing::debug!(pid = %pcb.pid, %device_id, addr, data, "read completed, process unblocked");
    }

    fn io_write_complete(&mut self, ram: &mut Ram, device_id: DeviceId, addr: Word, tick: Tick) {
        let Some(pcb) = self
            .process_table
            .iter_mut()
            .find(|p| p.blocked_on(device_id, BlockedOp::Write, addr))
        else {
            tracing::debug!(%device_id, addr, "write completion for a process that no longer exists");
            return;
        };
        push_to_saved(pcb, ram, SyscallStatus::Success.as_word());
        pcb.state = RunState::Ready;
        pcb.last_ready_tick = tick;
        tracing::debug!(pid = %pcb.pid, %device_id, addr, "write completed, process unblocked");
    }

    fn interrupt_clock(&mut self, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
        let current_is_idle = self
            .current_pid
            .and_then(|pid| self.process_table.get(pid))
            .map(|pcb| pcb.is_idle)
            .unwrap_or(false);
        if current_is_idle {
            // Let the idle process run its one TRAP and exit on its own.
            return;
        }
        self.save_current(regs);
        self.reschedule_voluntary(ram, regs, tick);
    }
}
