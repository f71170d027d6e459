use crate::cpu::TrapHandler;
use crate::instruction::ArithOp;
use crate::registers::Registers;
use crate::word::RegId;

/// `ADD/SUB/MUL/DIV d, s1, s2`. A zero divisor raises `DivideByZero` and
/// leaves `R[d]` untouched.
pub fn exec(op: ArithOp, d: RegId, s1: RegId, s2: RegId, regs: &mut Registers, traps: &mut dyn TrapHandler) {
    let a = regs.get(s1);
    let b = regs.get(s2);
    let result = match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div => {
            if b == 0 {
                traps.divide_by_zero();
                return;
            }
            a.wrapping_div(b)
        }
    };
    regs.set(d, result);
}
