use crate::cpu::TrapHandler;
use crate::ram::{in_window, Ram};
use crate::registers::Registers;
use crate::word::RegId;

/// `LOAD d, s`: `R[d] <- RAM[BASE + R[s]]`.
pub fn exec_load(d: RegId, s: RegId, regs: &mut Registers, ram: &mut Ram, traps: &mut dyn TrapHandler) {
    let addr = regs.base + regs.get(s);
    if !in_window(addr, regs.base, regs.lim) {
        traps.illegal_memory_access(addr);
        return;
    }
    let value = ram.read(addr);
    regs.set(d, value);
}

/// `SAVE s, d`: `RAM[BASE + R[d]] <- R[s]`.
pub fn exec_save(s: RegId, d: RegId, regs: &mut Registers, ram: &mut Ram, traps: &mut dyn TrapHandler) {
    let addr = regs.base + regs.get(d);
    if !in_window(addr, regs.base, regs.lim) {
        traps.illegal_memory_access(addr);
        return;
    }
    ram.write(addr, regs.get(s));
}
