//! System-call dispatch (spec §4.8). Calling convention: arguments are
//! pushed in the order listed, with the syscall id pushed last — so
//! `dispatch` pops the id first and each handler pops its own arguments in
//! the mirror order (last-listed argument first).

use crate::config::Tick;
use crate::cpu::HaltReason;
use crate::device_table::OpenOutcome;
use crate::error::SyscallStatus;
use crate::pcb::{BlockState, BlockedOp, RunState};
use crate::ram::{in_window, Ram};
use crate::registers::Registers;
use crate::word::{DeviceId, Word, INSTRSIZE};

use super::{pop_word, push_to_saved, push_word, Kernel};

const SYS_EXIT: Word = 0;
const SYS_OUTPUT: Word = 1;
const SYS_GETPID: Word = 2;
const SYS_OPEN: Word = 3;
const SYS_CLOSE: Word = 4;
const SYS_READ: Word = 5;
const SYS_WRITE: Word = 6;
const SYS_EXEC: Word = 7;
const SYS_YIELD: Word = 8;
const SYS_COREDUMP: Word = 9;

pub fn dispatch(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let id = pop_word(regs, ram);
    tracing::debug!(pid = ?kernel.current_pid, id, "syscall");
    match id {
        SYS_EXIT => sys_exit(kernel, ram, regs, tick),
        SYS_OUTPUT => sys_output(regs, ram),
        SYS_GETPID => sys_getpid(kernel, regs, ram),
        SYS_OPEN => sys_open(kernel, ram, regs, tick),
        SYS_CLOSE => sys_close(kernel, ram, regs, tick),
        SYS_READ => sys_read(kernel, ram, regs, tick),
        SYS_WRITE => sys_write(kernel, ram, regs, tick),
        SYS_EXEC => sys_exec(kernel, ram, regs, tick),
        SYS_YIELD => sys_yield(kernel, ram, regs, tick),
        SYS_COREDUMP => sys_coredump(kernel, ram, regs, tick),
        other => tracing::warn!(id = other, "unknown syscall id, ignoring"),
    }
}

/// Shared by `EXIT` and the tail of `COREDUMP`: remove the current process,
/// free its memory window, and reschedule. Halts the simulation if that was
/// the last process in the table.
fn do_exit(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let pid = kernel.current_pid.take().expect("EXIT dispatched with no current process");
    let pcb = kernel.process_table.remove(pid).expect("current_pid always names a live PCB");
    kernel.memory.free(pcb.saved.base, pcb.saved.lim);
    tracing::info!(%pid, "process exited");
    if kernel.process_table.is_empty() {
        kernel.fatal(HaltReason::ProcessTableEmpty);
        return;
    }
    kernel.reschedule_after_departure(ram, regs, tick);
}

fn sys_exit(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    do_exit(kernel, ram, regs, tick);
}

fn sys_output(regs: &mut Registers, ram: &mut Ram) {
    let value = pop_word(regs, ram);
    println!("OUTPUT: {value}");
    tracing::info!(value, "OUTPUT");
}

fn sys_getpid(kernel: &mut Kernel, regs: &mut Registers, ram: &mut Ram) {
    let pid = kernel.current_pid.expect("GETPID dispatched with no current process");
    push_word(regs, ram, pid.0 as Word);
}

fn sys_open(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let device_id = DeviceId(pop_word(regs, ram) as u32);
    let pid = kernel.current_pid.expect("OPEN dispatched with no current process");
    match kernel.device_table.open(device_id, pid) {
        OpenOutcome::Opened => push_word(regs, ram, SyscallStatus::Success.as_word()),
        OpenOutcome::NotFound => push_word(regs, ram, SyscallStatus::DeviceNotFound.as_word()),
        OpenOutcome::AlreadyOpen => push_word(regs, ram, SyscallStatus::DeviceAlreadyOpen.as_word()),
        OpenOutcome::Blocked => {
            kernel.save_current(regs);
            kernel.current_pcb_mut().state = RunState::Blocked(BlockState {
                device_id,
                op: BlockedOp::Open,
                addr: 0,
            });
            kernel.reschedule_after_departure(ram, regs, tick);
        }
    }
}

fn sys_close(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let device_id = DeviceId(pop_word(regs, ram) as u32);
    let pid = kernel.current_pid.expect("CLOSE dispatched with no current process");
    let status = match kernel.device_table.get(device_id) {
        None => SyscallStatus::DeviceNotFound,
        Some(record) if !record.is_opened_by(pid) => SyscallStatus::DeviceNotOpen,
        Some(_) => {
            if let Some(promoted) = kernel.device_table.close(device_id, pid) {
                if let Some(pcb) = kernel.process_table.get_mut(promoted) {
                    push_to_saved(pcb, ram, SyscallStatus::Success.as_word());
                    pcb.state = RunState::Ready;
                    pcb.last_ready_tick = *tick;
                    tracing::debug!(pid = %promoted, %device_id, "promoted open-waiter");
                }
            }
            SyscallStatus::Success
        }
    };
    push_word(regs, ram, status.as_word());
}

fn sys_read(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let addr = pop_word(regs, ram);
    let device_id = DeviceId(pop_word(regs, ram) as u32);
    let pid = kernel.current_pid.expect("READ dispatched with no current process");

    let Some(record) = kernel.device_table.get(device_id) else {
        push_word(regs, ram, SyscallStatus::DeviceNotFound.as_word());
        return;
    };
    if !record.is_opened_by(pid) {
        push_word(regs, ram, SyscallStatus::DeviceNotOpen.as_word());
        return;
    }
    if !record.device().is_readable() {
        push_word(regs, ram, SyscallStatus::DeviceWriteOnly.as_word());
        return;
    }
    if !record.device().is_available() {
        // Rewind: put the arguments back the way we found them, including
        // the syscall id `dispatch` already popped, and replay the TRAP
        // once this process is scheduled again.
        push_word(regs, ram, device_id.0 as Word);
        push_word(regs, ram, addr);
        push_word(regs, ram, SYS_READ);
        regs.pc -= INSTRSIZE;
        kernel.save_current(regs);
        kernel.reschedule_voluntary(ram, regs, tick);
        return;
    }

    kernel
        .device_table
        .get_mut(device_id)
        .expect("looked up above")
        .device_mut()
        .read(addr);
    let read_priority = kernel.config.read_priority;
    kernel.save_current(regs);
    let pcb = kernel.current_pcb_mut();
    pcb.priority += read_priority;
    pcb.state = RunState::Blocked(BlockState {
        device_id,
        op: BlockedOp::Read,
        addr,
    });
    kernel.reschedule_after_departure(ram, regs, tick);
}

fn sys_write(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let value = pop_word(regs, ram);
    let addr = pop_word(regs, ram);
    let device_id = DeviceId(pop_word(regs, ram) as u32);
    let pid = kernel.current_pid.expect("WRITE dispatched with no current process");

    let Some(record) = kernel.device_table.get(device_id) else {
        push_word(regs, ram, SyscallStatus::DeviceNotFound.as_word());
        return;
    };
    if !record.is_opened_by(pid) {
        push_word(regs, ram, SyscallStatus::DeviceNotOpen.as_word());
        return;
    }
    if !record.device().is_writeable() {
        push_word(regs, ram, SyscallStatus::DeviceReadOnly.as_word());
        return;
    }
    if !record.device().is_available() {
        // Rewind: put the arguments back the way we found them, including
        // the syscall id `dispatch` already popped, and replay the TRAP
        // once this process is scheduled again.
        push_word(regs, ram, device_id.0 as Word);
        push_word(regs, ram, addr);
        push_word(regs, ram, value);
        push_word(regs, ram, SYS_WRITE);
        regs.pc -= INSTRSIZE;
        kernel.save_current(regs);
        kernel.reschedule_voluntary(ram, regs, tick);
        return;
    }

    kernel
        .device_table
        .get_mut(device_id)
        .expect("looked up above")
        .device_mut()
        .write(addr, value);
    let write_priority = kernel.config.write_priority;
    kernel.save_current(regs);
    let pcb = kernel.current_pcb_mut();
    pcb.priority += write_priority;
    pcb.state = RunState::Blocked(BlockState {
        device_id,
        op: BlockedOp::Write,
        addr,
    });
    kernel.reschedule_after_departure(ram, regs, tick);
}

/// `EXEC` never needs the caller-PC rewind the specification describes for
/// designs that advance `PC` generically after every instruction including
/// `TRAP`: `Cpu::step` already applied `TRAP`'s PC advance before dispatch
/// (see the design note on `Cpu::step`), so the caller resumes correctly as
/// soon as its registers are current. They might not be: allocating the new
/// process can run `compact()`, which relocates live processes by rewriting
/// their PCB's saved `BASE`/`LIM`/`SP`/`PC` — including the caller's own PCB,
/// if the caller doesn't happen to already sit at the lowest free address.
/// The live `Registers` the CPU is about to resume with are a copy held
/// outside the table, so that rewrite is invisible to the CPU unless we
/// save the caller's registers in before the allocation and reload them
/// after.
fn sys_exec(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &Tick) {
    let Some(index) = kernel.programs.choose_least_called() else {
        tracing::warn!("EXEC: no registered programs, ignoring");
        return;
    };
    let program = kernel.programs.get(index).expect("index from choose_least_called").clone();
    kernel.save_current(regs);
    let result = kernel.create_process(ram, &program.instructions, program.alloc_size(), *tick);
    if let Some(pid) = kernel.current_pid {
        if let Some(pcb) = kernel.process_table.get(pid) {
            *regs = pcb.saved;
        }
    }
    match result {
        Ok(pid) => tracing::info!(%pid, program_index = index, "EXEC"),
        Err(err) => tracing::warn!(%err, program_index = index, "EXEC: not enough memory, ignoring"),
    }
}

fn sys_yield(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    kernel.save_current(regs);
    kernel.reschedule_voluntary(ram, regs, tick);
}

/// Print registers and the top three stack words, in that order, then pop
/// those words and exit. The spec leaves print-vs-pop ordering an open
/// question; this crate pins it to print-then-pop (see DESIGN.md).
fn sys_coredump(kernel: &mut Kernel, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
    let pid = kernel.current_pid.expect("COREDUMP dispatched with no current process");
    tracing::info!(
        %pid,
        gp = ?regs.gp,
        pc = regs.pc,
        sp = regs.sp,
        base = regs.base,
        lim = regs.lim,
        "COREDUMP registers"
    );
    println!("COREDUMP pid={pid} gp={:?} pc={} sp={} base={} lim={}", regs.gp, regs.pc, regs.sp, regs.base, regs.lim);

    let mut depth = 0;
    for i in 0..3 {
        let addr = regs.sp_addr() + i as Word;
        if !in_window(addr, regs.base, regs.lim) {
            break;
        }
        depth += 1;
    }
    let top: Vec<Word> = (0..depth).map(|i| ram.read(regs.sp_addr() + i as Word)).collect();
    println!("COREDUMP top-{depth} stack: {top:?}");
    tracing::info!(%pid, ?top, "COREDUMP stack");
    for _ in 0..depth {
        pop_word(regs, ram);
    }

    do_exit(kernel, ram, regs, tick);
}
