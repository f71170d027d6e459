//! Tagged-variant instruction representation (design note: keep the raw
//! `(opcode, a, b, c)` tuple only at the RAM-fetch boundary; everywhere else
//! an `Instruction` makes operand-count mismatches unreachable).

use crate::word::{RegId, Word};

const OP_SET: Word = 0;
const OP_ADD: Word = 1;
const OP_SUB: Word = 2;
const OP_MUL: Word = 3;
const OP_DIV: Word = 4;
const OP_COPY: Word = 5;
const OP_BRANCH: Word = 6;
const OP_BNE: Word = 7;
const OP_BLT: Word = 8;
const OP_PUSH: Word = 9;
const OP_POP: Word = 10;
const OP_LOAD: Word = 11;
const OP_SAVE: Word = 12;
const OP_TRAP: Word = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Ne,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Set { r: RegId, imm: Word },
    Arith { op: ArithOp, d: RegId, s1: RegId, s2: RegId },
    Copy { d: RegId, s: RegId },
    Branch { rel: Word },
    CondBranch { cond: Cond, a: RegId, b: RegId, rel: Word },
    Push { r: RegId },
    Pop { r: RegId },
    Load { d: RegId, s: RegId },
    Save { s: RegId, d: RegId },
    Trap,
}

/// The raw four words fetched from RAM, kept around only so
/// `IllegalInstruction` can report what it choked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInstruction(pub [Word; 4]);

fn reg(value: Word) -> Option<RegId> {
    RegId::from_word(value)
}

/// Decode the four-word tuple fetched from RAM into a tagged instruction.
/// Fails (returning the raw tuple) on an unrecognized opcode or an operand
/// that doesn't name a valid register; both degrade to `IllegalInstruction`
/// at the call site.
pub fn decode(words: [Word; 4]) -> Result<Instruction, RawInstruction> {
    let [op, a, b, c] = words;
    let bad = || Err(RawInstruction(words));
    match op {
        OP_SET => match reg(a) {
            Some(r) => Ok(Instruction::Set { r, imm: b }),
            None => bad(),
        },
        OP_ADD | OP_SUB | OP_MUL | OP_DIV => {
            let arith = match op {
                OP_ADD => ArithOp::Add,
                OP_SUB => ArithOp::Sub,
                OP_MUL => ArithOp::Mul,
                _ => ArithOp::Div,
            };
            match (reg(a), reg(b), reg(c)) {
                (Some(d), Some(s1), Some(s2)) => Ok(Instruction::Arith { op: arith, d, s1, s2 }),
                _ => bad(),
            }
        }
        OP_COPY => match (reg(a), reg(b)) {
            (Some(d), Some(s)) => Ok(Instruction::Copy { d, s }),
            _ => bad(),
        },
        OP_BRANCH => Ok(Instruction::Branch { rel: a }),
        OP_BNE | OP_BLT => {
            let cond = if op == OP_BNE { Cond::Ne } else { Cond::Lt };
            match (reg(a), reg(b)) {
                (Some(ra), Some(rb)) => Ok(Instruction::CondBranch { cond, a: ra, b: rb, rel: c }),
                _ => bad(),
            }
        }
        OP_PUSH => match reg(a) {
            Some(r) => Ok(Instruction::Push { r }),
            None => bad(),
        },
        OP_POP => match reg(a) {
            Some(r) => Ok(Instruction::Pop { r }),
            None => bad(),
        },
        OP_LOAD => match (reg(a), reg(b)) {
            (Some(d), Some(s)) => Ok(Instruction::Load { d, s }),
            _ => bad(),
        },
        OP_SAVE => match (reg(a), reg(b)) {
            (Some(s), Some(d)) => Ok(Instruction::Save { s, d }),
            _ => bad(),
        },
        OP_TRAP => Ok(Instruction::Trap),
        _ => bad(),
    }
}

/// Encode an instruction back into its four-word RAM representation. Used by
/// tests and by the reference program builders to assemble small programs
/// without hand-computing opcode tuples (the real assembler/loader is an
/// external collaborator, out of scope here).
pub fn encode(instr: Instruction) -> [Word; 4] {
    match instr {
        Instruction::Set { r, imm } => [OP_SET, r.index() as Word, imm, 0],
        Instruction::Arith { op, d, s1, s2 } => {
            let opc = match op {
                ArithOp::Add => OP_ADD,
                ArithOp::Sub => OP_SUB,
                ArithOp::Mul => OP_MUL,
                ArithOp::Div => OP_DIV,
            };
            [opc, d.index() as Word, s1.index() as Word, s2.index() as Word]
        }
        Instruction::Copy { d, s } => [OP_COPY, d.index() as Word, s.index() as Word, 0],
        Instruction::Branch { rel } => [OP_BRANCH, rel, 0, 0],
        Instruction::CondBranch { cond, a, b, rel } => {
            let opc = if cond == Cond::Ne { OP_BNE } else { OP_BLT };
            [opc, a.index() as Word, b.index() as Word, rel]
        }
        Instruction::Push { r } => [OP_PUSH, r.index() as Word, 0, 0],
        Instruction::Pop { r } => [OP_POP, r.index() as Word, 0, 0],
        Instruction::Load { d, s } => [OP_LOAD, d.index() as Word, s.index() as Word, 0],
        Instruction::Save { s, d } => [OP_SAVE, s.index() as Word, d.index() as Word, 0],
        Instruction::Trap => [OP_TRAP, 0, 0, 0],
    }
}
