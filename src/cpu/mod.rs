//! Fetch-decode-execute with base/limit protection, integer-trap
//! generation, system-call trap, and interrupt polling (spec §4.2).

mod ops;

use crate::config::{SimConfig, Tick};
use crate::instruction::{decode, RawInstruction};
use crate::interrupt::{InterruptController, RecordKind};
use crate::ram::{instruction_window_ok, Ram};
use crate::registers::Registers;
use crate::word::{DeviceId, Word, INSTRSIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    IllegalMemoryAccess(Word),
    DivideByZero,
    IllegalInstruction(Word),
    ProcessTableEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halted(HaltReason),
}

/// The seven-method capability the CPU calls into the OS through. Passed as
/// a value-held `&mut dyn` reference rather than via inheritance (design
/// note). `ram` is threaded through explicitly wherever a callback needs to
/// touch memory (writing a blocked process's saved stack, popping a
/// syscall's arguments) instead of the trap handler owning its own copy.
pub trait TrapHandler {
    fn illegal_memory_access(&mut self, addr: Word);
    fn divide_by_zero(&mut self);
    fn illegal_instruction(&mut self, raw: RawInstruction);
    fn system_call(&mut self, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick);
    /// `tick` is the current simulation tick, threaded through so the OS can
    /// stamp the unblocked PCB's `last_ready_tick` the same way a voluntary
    /// reschedule does (a supplement to the spec's capability signature,
    /// needed for correct starvation accounting — see DESIGN.md).
    fn io_read_complete(&mut self, ram: &mut Ram, device_id: DeviceId, addr: Word, data: Word, tick: Tick);
    fn io_write_complete(&mut self, ram: &mut Ram, device_id: DeviceId, addr: Word, tick: Tick);
    fn interrupt_clock(&mut self, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick);
    /// Non-`None` once a fatal trap or a transition to an empty process
    /// table has asked the simulation to stop.
    fn halted(&self) -> Option<HaltReason>;
}

pub struct Cpu {
    pub regs: Registers,
    pub tick: Tick,
    /// Diagnostic-output toggle only; never affects execution semantics.
    pub verbose: bool,
}

impl Cpu {
    pub fn new(regs: Registers) -> Cpu {
        Cpu {
            regs,
            tick: Tick::default(),
            verbose: false,
        }
    }

    /// Run exactly one instruction cycle, per the strict order in spec
    /// §4.2: poll for completed I/O, fetch, (dump if verbose), execute,
    /// advance PC, tick the clock.
    pub fn step(
        &mut self,
        ram: &mut Ram,
        interrupts: &InterruptController,
        traps: &mut dyn TrapHandler,
        config: &SimConfig,
    ) -> StepOutcome {
        // 1. Poll before fetch so completions posted during the OS's
        // previous step are observed before the next user instruction.
        if let Some(record) = interrupts.take() {
            match record.kind {
                RecordKind::ReadDone => traps.io_read_complete(ram, record.device_id, record.addr, record.data, self.tick),
                RecordKind::WriteDone => traps.io_write_complete(ram, record.device_id, record.addr, self.tick),
            }
            if let Some(reason) = traps.halted() {
                return StepOutcome::Halted(reason);
            }
        }

        // 2. Fetch. RAM does no bounds policy of its own (spec §4.1); the
        // CPU is the caller responsible for checking the access falls in
        // this process's window before touching RAM.
        if !instruction_window_ok(self.regs.pc, self.regs.base, self.regs.lim) {
            traps.illegal_memory_access(self.regs.pc);
            return StepOutcome::Halted(traps.halted().unwrap_or(HaltReason::IllegalMemoryAccess(self.regs.pc)));
        }
        let raw_words = ram.fetch_instruction(self.regs.pc);

        if self.verbose {
            tracing::trace!(pc = self.regs.pc, raw = ?raw_words, "fetch");
        }

        let instr = match decode(raw_words) {
            Ok(instr) => instr,
            Err(raw) => {
                traps.illegal_instruction(raw);
                return StepOutcome::Halted(traps.halted().unwrap_or(HaltReason::IllegalInstruction(raw_words[0])));
            }
        };

        if self.verbose {
            tracing::trace!(?instr, "decode");
        }

        // 4. Execute. `TRAP` is special: it applies this step's PC advance
        // itself, before dispatching to `system_call`, so a process that
        // gets swapped out mid-syscall carries a correct resume address and
        // the (possibly different) process swapped in isn't bumped an
        // extra instruction by the generic advance below. See DESIGN.md.
        let is_trap = matches!(instr, crate::instruction::Instruction::Trap);
        ops::execute(instr, &mut self.regs, ram, traps, &mut self.tick);
        if let Some(reason) = traps.halted() {
            return StepOutcome::Halted(reason);
        }

        // 5. Advance PC.
        if !is_trap {
            self.regs.pc += INSTRSIZE;
        }

        // 6. Tick the clock.
        self.tick = self.tick.advance();
        if config.clock_freq != 0 && self.tick.0 % config.clock_freq == 0 {
            traps.interrupt_clock(ram, &mut self.regs, &mut self.tick);
            if let Some(reason) = traps.halted() {
                return StepOutcome::Halted(reason);
            }
        }

        StepOutcome::Continue
    }
}
