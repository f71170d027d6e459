//! Runs the literal arithmetic/output scenario end to end: computes `7 + 5`,
//! prints it through the `OUTPUT` syscall, then exits. Stands in for the
//! external assembler/loader and `Sim` harness just enough to exercise the
//! crate from a runnable binary.

use micro210::cpu::HaltReason;
use micro210::instruction::{encode, ArithOp, Instruction};
use micro210::word::RegId;
use micro210::{Os, SimConfig};

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        // Keep stdout readable by default; set RUST_LOG=trace for the full
        // per-instruction fetch/decode/execute log.
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut program = Vec::new();
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 7 }));
    program.extend(encode(Instruction::Set { r: RegId::R1, imm: 5 }));
    program.extend(encode(Instruction::Arith {
        op: ArithOp::Add,
        d: RegId::R2,
        s1: RegId::R0,
        s2: RegId::R1,
    }));
    program.extend(encode(Instruction::Push { r: RegId::R2 }));
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 1 })); // OUTPUT syscall id
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    program.extend(encode(Instruction::Trap));
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 })); // EXIT syscall id
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    program.extend(encode(Instruction::Trap));

    let mut os = Os::new(SimConfig::default());
    os.spawn(&program, program.len() * 2).expect("fits in a fresh machine");

    match os.run_until_halt(Some(10_000)) {
        HaltReason::ProcessTableEmpty => println!("simulation halted: all processes exited"),
        other => println!("simulation halted unexpectedly: {other:?}"),
    }
}
