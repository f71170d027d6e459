use crate::registers::Registers;
use crate::word::RegId;

/// `COPY d, s`: `R[d] <- R[s]`. Register-to-register only, never touches
/// RAM, so there is nothing to bounds-check.
pub fn exec(d: RegId, s: RegId, regs: &mut Registers) {
    regs.set(d, regs.get(s));
}
