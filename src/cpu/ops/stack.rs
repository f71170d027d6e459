use crate::cpu::TrapHandler;
use crate::ram::{in_window, Ram};
use crate::registers::Registers;
use crate::word::RegId;

/// `PUSH r`: decrement SP, then write. A stack overflow (SP walking past
/// `BASE`) degrades to an `IllegalMemoryAccess` trap via the same
/// bounds-check every other data access goes through (spec §7d).
pub fn exec_push(r: RegId, regs: &mut Registers, ram: &mut Ram, traps: &mut dyn TrapHandler) {
    let new_sp = regs.sp - 1;
    let addr = regs.base + new_sp;
    if !in_window(addr, regs.base, regs.lim) {
        traps.illegal_memory_access(addr);
        return;
    }
    ram.write(addr, regs.get(r));
    regs.sp = new_sp;
}

/// `POP r`: read the top occupied word, then increment SP.
pub fn exec_pop(r: RegId, regs: &mut Registers, ram: &mut Ram, traps: &mut dyn TrapHandler) {
    let addr = regs.sp_addr();
    if !in_window(addr, regs.base, regs.lim) {
        traps.illegal_memory_access(addr);
        return;
    }
    let value = ram.read(addr);
    regs.set(r, value);
    regs.sp += 1;
}
