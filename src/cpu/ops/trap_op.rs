use crate::config::Tick;
use crate::cpu::TrapHandler;
use crate::ram::Ram;
use crate::registers::Registers;
use crate::word::INSTRSIZE;

/// `TRAP`: system call. Applies this step's PC advance itself (see the note
/// on `Cpu::step`) before handing off to the OS, so the resume address is
/// correct for whichever process ends up saved — the trapping one, if the
/// syscall blocks or exits it, or the same live registers if it doesn't
/// switch at all.
pub fn exec(regs: &mut Registers, ram: &mut Ram, traps: &mut dyn TrapHandler, tick: &mut Tick) {
    regs.pc += INSTRSIZE;
    traps.system_call(ram, regs, tick);
}
