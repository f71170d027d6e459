use crate::registers::Registers;
use crate::word::{RegId, Word};

/// `SET r, imm`: `R[r] <- imm`.
pub fn exec(r: RegId, imm: Word, regs: &mut Registers) {
    regs.set(r, imm);
}
