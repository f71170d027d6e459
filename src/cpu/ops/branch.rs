use crate::cpu::TrapHandler;
use crate::instruction::Cond;
use crate::ram::instruction_window_ok;
use crate::registers::Registers;
use crate::word::{RegId, Word, INSTRSIZE};

/// `BRANCH rel`: `PC <- BASE + rel`. `rel` is relative to this process's
/// window (spec's illegal-branch scenario: `BRANCH 100000` with `LIM=40`
/// faults at `BASE+100000`, confirming the operand is base-relative). We
/// write `target - INSTRSIZE` so the unconditional post-execute increment
/// (spec §4.2 step 5) lands exactly on the absolute `target`.
pub fn exec_branch(rel: Word, regs: &mut Registers, traps: &mut dyn TrapHandler) {
    jump_to(rel, regs, traps);
}

/// `BNE/BLT a, b, rel`: conditional branch, same base-relative-address
/// semantics as `BRANCH` when the condition holds.
pub fn exec_cond_branch(cond: Cond, a: RegId, b: RegId, rel: Word, regs: &mut Registers, traps: &mut dyn TrapHandler) {
    let taken = match cond {
        Cond::Ne => regs.get(a) != regs.get(b),
        Cond::Lt => regs.get(a) < regs.get(b),
    };
    if taken {
        jump_to(rel, regs, traps);
    }
}

fn jump_to(rel: Word, regs: &mut Registers, traps: &mut dyn TrapHandler) {
    let target = regs.base + rel;
    if !instruction_window_ok(target, regs.base, regs.lim) {
        traps.illegal_memory_access(target);
        return;
    }
    regs.pc = target - INSTRSIZE;
}
