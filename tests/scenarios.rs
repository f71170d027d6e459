//! The six literal end-to-end scenarios. Each drives a full `Os` (CPU + RAM
//! + kernel) through hand-assembled instruction streams and checks the
//! externally observable outcome the scenario describes.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use micro210::cpu::{HaltReason, StepOutcome};
use micro210::device::Device;
use micro210::devices::AsyncEchoDevice;
use micro210::error::SyscallStatus;
use micro210::instruction::{encode, ArithOp, Cond, Instruction};
use micro210::interrupt::{InterruptController, Record, RecordKind};
use micro210::program::Program;
use micro210::word::{DeviceId, RegId, Word};
use micro210::{Os, SimConfig};

/// A sharable counterpart to [`AsyncEchoDevice`], used only to exercise the
/// busy-rewind-and-retry path: two *different* openers can both be
/// mid-operation on the same device, which a non-sharable device never
/// allows (only one process ever holds it open at a time).
struct SharedDelayDevice {
    id: DeviceId,
    interrupts: Arc<InterruptController>,
    delay: Duration,
    busy: Arc<AtomicBool>,
    last_read_addr: Arc<AtomicI64>,
}

impl SharedDelayDevice {
    fn new(interrupts: Arc<InterruptController>, delay: Duration) -> SharedDelayDevice {
        SharedDelayDevice {
            id: DeviceId(0),
            interrupts,
            delay,
            busy: Arc::new(AtomicBool::new(false)),
            last_read_addr: Arc::new(AtomicI64::new(0)),
        }
    }
}

impl Device for SharedDelayDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn set_id(&mut self, id: DeviceId) {
        self.id = id;
    }

    fn is_sharable(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        false
    }

    fn read(&mut self, addr: Word) {
        self.last_read_addr.store(addr, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);
        let interrupts = Arc::clone(&self.interrupts);
        let busy = Arc::clone(&self.busy);
        let device_id = self.id;
        let delay = self.delay;
        // The completion carries back `addr * 10` so the test can tell which
        // process's read actually resolved.
        let data = addr * 10;
        thread::spawn(move || {
            thread::sleep(delay);
            let mut record = Record {
                kind: RecordKind::ReadDone,
                device_id,
                addr,
                data,
            };
            while let Err(rejected) = interrupts.post(record) {
                record = rejected;
                thread::sleep(Duration::from_micros(50));
            }
            busy.store(false, Ordering::SeqCst);
        });
    }

    fn write(&mut self, _addr: Word, _value: Word) {
        unreachable!("SharedDelayDevice is read-only");
    }
}

const EXIT: i64 = 0;
const OUTPUT: i64 = 1;
#[allow(dead_code)]
const GETPID: i64 = 2;
const OPEN: i64 = 3;
const CLOSE: i64 = 4;
const READ: i64 = 5;
const WRITE: i64 = 6;
const EXEC: i64 = 7;
const YIELD: i64 = 8;

fn push_syscall(words: &mut Vec<i64>, id: i64) {
    words.extend(encode(Instruction::Set { r: RegId::R0, imm: id }));
    words.extend(encode(Instruction::Push { r: RegId::R0 }));
    words.extend(encode(Instruction::Trap));
}

fn step_until_halt(os: &mut Os, max_steps: u64) -> HaltReason {
    for _ in 0..max_steps {
        if let StepOutcome::Halted(reason) = os.step() {
            return reason;
        }
    }
    panic!("simulation did not halt within {max_steps} steps");
}

#[test]
fn arithmetic_and_output() {
    // [SET R0 7; SET R1 5; ADD R2 R0 R1; PUSH R2; SET R0 1; PUSH R0; TRAP]
    // => prints OUTPUT: 12, then exits.
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
    push_syscall(&mut program, OUTPUT);
    push_syscall(&mut program, EXIT);

    let mut os = Os::new(SimConfig::default());
    os.spawn(&program, program.len() * 2).unwrap();

    let reason = step_until_halt(&mut os, 1_000);
    assert_eq!(reason, HaltReason::ProcessTableEmpty);
}

#[test]
fn div_by_zero_is_fatal() {
    let mut program = Vec::new();
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 10 }));
    program.extend(encode(Instruction::Set { r: RegId::R1, imm: 0 }));
    program.extend(encode(Instruction::Arith {
        op: ArithOp::Div,
        d: RegId::R2,
        s1: RegId::R0,
        s2: RegId::R1,
    }));

    let mut os = Os::new(SimConfig::default());
    os.spawn(&program, program.len() * 2).unwrap();

    let reason = step_until_halt(&mut os, 100);
    assert_eq!(reason, HaltReason::DivideByZero);
}

#[test]
fn illegal_branch_faults_at_base_plus_operand() {
    // [BRANCH 100000] with LIM=40 => fatal illegal memory access at
    // BASE+100000. The sole process is allocated at BASE=0.
    let program = encode(Instruction::Branch { rel: 100_000 }).to_vec();

    let mut os = Os::new(SimConfig::default());
    os.spawn(&program, 40).unwrap();

    let reason = step_until_halt(&mut os, 10);
    assert_eq!(reason, HaltReason::IllegalMemoryAccess(100_000));
}

#[test]
fn second_opener_of_a_busy_nonsharable_device_blocks_until_close() {
    // Two processes each OPEN a non-sharable device. The first succeeds
    // immediately; the second blocks; closing the first promotes and
    // unblocks the second.
    let mut config = SimConfig::default();
    config.clock_freq = 1_000_000; // keep the clock out of this test's way
    config.priority_threshold = 0; // let the boosted second process preempt on YIELD
    let mut os = Os::new(config);

    let interrupts = os.interrupt_handle();
    let device_id = os.register_device(Box::new(AsyncEchoDevice::new(interrupts, Duration::from_millis(1))));
    assert_eq!(device_id.0, 0);

    // Process A: OPEN, POP status, YIELD, CLOSE, POP status, EXIT.
    let mut a = Vec::new();
    a.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 })); // device id
    a.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut a, OPEN);
    a.extend(encode(Instruction::Pop { r: RegId::R1 })); // open status
    push_syscall(&mut a, YIELD);
    a.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 })); // device id
    a.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut a, CLOSE);
    a.extend(encode(Instruction::Pop { r: RegId::R1 })); // close status
    push_syscall(&mut a, EXIT);

    // Process B: OPEN (blocks the first time), POP status, EXIT.
    let mut b = Vec::new();
    b.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 }));
    b.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut b, OPEN);
    b.extend(encode(Instruction::Pop { r: RegId::R1 })); // promoted open status
    push_syscall(&mut b, EXIT);

    let pid_a = os.spawn(&a, a.len() * 2).unwrap();
    let pid_b = os.spawn(&b, b.len() * 2).unwrap();

    // Give B enough priority that A's YIELD actually hands it the CPU.
    os.kernel.process_table.get_mut(pid_b).unwrap().priority = 1000;

    // Run A through OPEN + YIELD.
    while os.kernel.current_pid == Some(pid_a) {
        assert!(matches!(os.step(), StepOutcome::Continue));
    }
    assert_eq!(os.kernel.current_pid, Some(pid_b));

    // B's OPEN should block it immediately (device already opened by A).
    while os.kernel.current_pid == Some(pid_b) {
        assert!(matches!(os.step(), StepOutcome::Continue));
    }
    assert_eq!(os.kernel.current_pid, Some(pid_a));
    assert!(os.kernel.process_table.get(pid_b).unwrap().is_blocked());

    // Run A through CLOSE; this should promote and unblock B.
    while !os.kernel.process_table.get(pid_b).unwrap().is_ready() {
        assert!(matches!(os.step(), StepOutcome::Continue));
    }

    // A finishes and exits; B gets the CPU and also exits.
    let reason = step_until_halt(&mut os, 1_000);
    assert_eq!(reason, HaltReason::ProcessTableEmpty);
}

#[test]
fn compaction_lets_a_too_big_allocation_succeed() {
    // Three 100-word processes in 400-word RAM; EXIT the middle one; EXEC a
    // 150-word program => the allocator fails first-fit, compacts, and
    // succeeds with a single 200-word free trailer.
    let mut config = SimConfig::default();
    config.ram_size = 400;
    config.clock_freq = 1_000_000;
    config.priority_threshold = 0;
    config.context_switch_cost = 0;
    let mut os = Os::new(config);

    // P1: YIELD once (so P2 can exit), then EXEC, then EXIT.
    let mut p1 = Vec::new();
    push_syscall(&mut p1, YIELD);
    push_syscall(&mut p1, EXEC);
    push_syscall(&mut p1, EXIT);

    // P2: exits immediately once scheduled.
    let mut p2 = Vec::new();
    push_syscall(&mut p2, EXIT);

    // P3: never scheduled in this test; content is irrelevant.
    let p3 = encode(Instruction::Trap).to_vec();

    let pid1 = os.spawn(&p1, 100).unwrap();
    let pid2 = os.spawn(&p2, 100).unwrap();
    let _pid3 = os.spawn(&p3, 100).unwrap();

    os.kernel.process_table.get_mut(pid2).unwrap().priority = 1000;

    let exec_body = encode(Instruction::Trap).to_vec(); // a trivial program body
    os.register_program(Program::new(exec_body, 150));

    assert_eq!(os.kernel.memory.total_free(), 100);

    // Run P1's YIELD, then P2 to completion.
    while os.kernel.current_pid == Some(pid1) {
        os.step();
    }
    assert_eq!(os.kernel.current_pid, Some(pid2));
    while os.kernel.process_table.get(pid2).is_some() {
        os.step();
    }
    assert_eq!(os.kernel.current_pid, Some(pid1));

    // Free memory is now two non-adjacent 100-word blocks.
    assert_eq!(os.kernel.memory.total_free(), 200);
    assert_eq!(os.kernel.memory.largest_free(), 100);

    // Run P1 through EXEC: first-fit fails, compaction runs, retry succeeds.
    while os.kernel.process_table.len() < 3 {
        os.step();
    }

    assert_eq!(os.kernel.memory.total_free(), 50);
    let windows = os.kernel.process_table.windows_sorted_by_base();
    // P1 at 0, the relocated P3 at 100, the new EXEC'd process at 200.
    assert_eq!(windows[0].1, 0);
    assert_eq!(windows[1].1, 100);
    assert_eq!(windows[2].1, 200);
}

#[test]
fn aging_guarantees_every_process_eventually_runs() {
    // 5 CPU-bound processes, CLOCK_FREQ=5, AGING_TIME=1, AGING_PRIORITY=4,
    // PRIORITY_THRESHOLD=500: every process must run within
    // 5 * 500 / 4 = 625 ticks of entering the table.
    let mut config = SimConfig::default();
    config.clock_freq = 5;
    config.aging_time = 1;
    config.aging_priority = 4;
    config.priority_threshold = 500;
    config.context_switch_cost = 0;
    let mut os = Os::new(config);

    // SET R0,0; SET R1,1; ADD R0,R0,R1; BRANCH <back to the ADD> — a busy
    // loop that never traps.
    let mut loop_program = Vec::new();
    loop_program.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 }));
    loop_program.extend(encode(Instruction::Set { r: RegId::R1, imm: 1 }));
    loop_program.extend(encode(Instruction::Arith {
        op: ArithOp::Add,
        d: RegId::R0,
        s1: RegId::R0,
        s2: RegId::R1,
    }));
    loop_program.extend(encode(Instruction::Branch { rel: 8 }));

    let mut pids = Vec::new();
    for _ in 0..5 {
        pids.push(os.spawn(&loop_program, loop_program.len() * 4).unwrap());
    }

    let mut has_run: std::collections::HashSet<_> = std::collections::HashSet::new();
    for _ in 0..700 {
        has_run.insert(os.kernel.current_pid.unwrap());
        os.step();
    }

    for pid in pids.drain(..) {
        assert!(has_run.contains(&pid), "process {pid} never ran within the aging bound");
    }
}

#[test]
fn illegal_instruction_unknown_opcode_is_fatal() {
    // Invariant 1 (isolation) and fault reporting, exercised on an opcode
    // the decoder cannot recognize.
    let program = vec![999, 0, 0, 0];
    let mut os = Os::new(SimConfig::default());
    os.spawn(&program, 40).unwrap();
    let reason = step_until_halt(&mut os, 10);
    assert_eq!(reason, HaltReason::IllegalInstruction(999));
}

#[test]
fn exec_survives_self_relocation_during_compaction() {
    // Three 100-word processes in 400-word RAM, mirroring the literal
    // compaction scenario (spec §8), but arranged so the *EXEC-issuing*
    // process itself is the one compaction relocates: P1 anchors address
    // 0, P2 frees a non-adjacent hole by exiting, and P3 — sitting above
    // that hole — is the one that calls EXEC and must keep executing
    // correctly out of its new location afterward.
    let mut config = SimConfig::default();
    config.ram_size = 400;
    config.clock_freq = 4;
    config.priority_threshold = 0;
    config.context_switch_cost = 0;
    let mut os = Os::new(config);

    // P1: busy loop, never traps; just occupies address 0 throughout.
    let mut p1 = Vec::new();
    p1.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 }));
    p1.extend(encode(Instruction::Set { r: RegId::R1, imm: 1 }));
    p1.extend(encode(Instruction::Arith {
        op: ArithOp::Add,
        d: RegId::R0,
        s1: RegId::R0,
        s2: RegId::R1,
    }));
    p1.extend(encode(Instruction::Branch { rel: 8 }));

    // P2: exits the instant it is scheduled, opening a hole at [100, 200).
    let mut p2 = Vec::new();
    push_syscall(&mut p2, EXIT);

    // P3: EXEC (forces compaction, which relocates P3 itself down into
    // the hole P2 left), then OUTPUT a marker value, then EXIT. If P3's
    // registers didn't track the relocation it would fault or corrupt
    // memory somewhere in this tail instead of exiting cleanly.
    let mut p3 = Vec::new();
    push_syscall(&mut p3, EXEC);
    p3.extend(encode(Instruction::Set { r: RegId::R0, imm: 777 }));
    p3.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut p3, OUTPUT);
    push_syscall(&mut p3, EXIT);

    let pid1 = os.spawn(&p1, 100).unwrap();
    let pid2 = os.spawn(&p2, 100).unwrap();
    let pid3 = os.spawn(&p3, 100).unwrap();
    os.kernel.process_table.get_mut(pid2).unwrap().priority = 1000;
    os.kernel.process_table.get_mut(pid3).unwrap().priority = 500;

    let exec_body = encode(Instruction::Trap).to_vec();
    os.register_program(Program::new(exec_body, 50));

    let ram_size = os.kernel.config.ram_size;
    for _ in 0..2_000 {
        match os.step() {
            StepOutcome::Continue => {}
            StepOutcome::Halted(reason) => panic!("unexpected halt: {reason:?}"),
        }
        // RAM partition invariant (spec §8, property 2): free words plus
        // every live process's window always tile the whole machine.
        let live: usize = os.kernel.process_table.iter().map(|p| p.saved.lim as usize).sum();
        assert_eq!(live + os.kernel.memory.total_free(), ram_size);

        if os.kernel.process_table.get(pid3).is_none() {
            // P3 reached its own EXIT after EXEC relocated it out from
            // under itself — it never faulted, so its registers tracked
            // the relocation correctly.
            assert!(os.kernel.process_table.get(pid1).is_some());
            return;
        }
    }
    panic!("P3 never exited");
}

#[test]
fn cond_branch_not_taken_falls_through() {
    // BNE R0,R1 when R0==R1 does not jump; execution continues and the
    // process reaches its own EXIT normally.
    let mut program = Vec::new();
    program.extend(encode(Instruction::CondBranch {
        cond: Cond::Ne,
        a: RegId::R0,
        b: RegId::R1,
        rel: 9999,
    }));
    push_syscall(&mut program, EXIT);

    let mut os = Os::new(SimConfig::default());
    os.spawn(&program, program.len() * 2).unwrap();
    let reason = step_until_halt(&mut os, 100);
    assert_eq!(reason, HaltReason::ProcessTableEmpty);
}

#[test]
fn read_completion_delivers_the_value_last_written() {
    // Spec testable property 7: for a completed READ, the data word pushed
    // onto the requester's resumed stack equals the word the device
    // emitted. WRITE 42, then READ it back from the same address.
    let mut config = SimConfig::default();
    config.clock_freq = 1_000_000;
    let mut os = Os::new(config);

    let interrupts = os.interrupt_handle();
    let device_id = os.register_device(Box::new(AsyncEchoDevice::new(interrupts, Duration::from_millis(1))));

    let mut program = Vec::new();
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: device_id.0 as i64 }));
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut program, OPEN);
    program.extend(encode(Instruction::Pop { r: RegId::R3 })); // open status, discarded

    program.extend(encode(Instruction::Set { r: RegId::R0, imm: device_id.0 as i64 })); // device id
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 })); // addr
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 42 })); // value
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut program, WRITE);
    program.extend(encode(Instruction::Pop { r: RegId::R3 })); // write status, discarded

    program.extend(encode(Instruction::Set { r: RegId::R0, imm: device_id.0 as i64 })); // device id
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    program.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 })); // addr
    program.extend(encode(Instruction::Push { r: RegId::R0 }));
    push_syscall(&mut program, READ);
    program.extend(encode(Instruction::Pop { r: RegId::R1 })); // data
    program.extend(encode(Instruction::Pop { r: RegId::R2 })); // read status
    push_syscall(&mut program, EXIT);

    os.spawn(&program, program.len() * 2).unwrap();

    // `do_exit` never rewrites the live CPU registers, so whatever the sole
    // process last left in R1/R2 just before its own EXIT is still sitting
    // in `os.cpu.regs` once the simulation halts.
    let reason = step_until_halt(&mut os, 10_000);
    assert_eq!(reason, HaltReason::ProcessTableEmpty);
    assert_eq!(os.cpu.regs.get(RegId::R1), 42);
    assert_eq!(os.cpu.regs.get(RegId::R2), SyscallStatus::Success.as_word());
}

#[test]
fn read_against_a_busy_device_rewinds_and_retries_cleanly() {
    // Two processes share a readable async device. The first's READ leaves
    // the device busy for a few milliseconds; the second's READ, issued
    // while the first is still in flight, must rewind (pushing its
    // arguments *and* the READ syscall id back onto its own stack) and
    // retry once the device frees up, rather than corrupting its stack or
    // silently dropping the retry.
    let mut config = SimConfig::default();
    config.clock_freq = 1_000_000;
    config.priority_threshold = 0;
    config.context_switch_cost = 0;
    let mut os = Os::new(config);

    let interrupts = os.interrupt_handle();
    let device_id = os.register_device(Box::new(SharedDelayDevice::new(interrupts, Duration::from_millis(20))));

    fn reader(device_id: DeviceId, addr: i64) -> Vec<Word> {
        let mut p = Vec::new();
        p.extend(encode(Instruction::Set { r: RegId::R0, imm: device_id.0 as i64 }));
        p.extend(encode(Instruction::Push { r: RegId::R0 }));
        push_syscall(&mut p, OPEN);
        p.extend(encode(Instruction::Pop { r: RegId::R3 })); // open status, discarded

        p.extend(encode(Instruction::Set { r: RegId::R0, imm: device_id.0 as i64 }));
        p.extend(encode(Instruction::Push { r: RegId::R0 }));
        p.extend(encode(Instruction::Set { r: RegId::R0, imm: addr }));
        p.extend(encode(Instruction::Push { r: RegId::R0 }));
        push_syscall(&mut p, READ);
        p.extend(encode(Instruction::Pop { r: RegId::R1 })); // data
        p.extend(encode(Instruction::Pop { r: RegId::R2 })); // read status
        push_syscall(&mut p, EXIT);
        p
    }

    let a = reader(device_id, 1);
    let b = reader(device_id, 2);

    let _pid_a = os.spawn(&a, a.len() * 2).unwrap();
    let pid_b = os.spawn(&b, b.len() * 2).unwrap();
    // Give B enough priority to run immediately once A blocks on its READ,
    // landing B's own READ while the device is still busy with A's.
    os.kernel.process_table.get_mut(pid_b).unwrap().priority = 1000;

    let mut steps = 0;
    let reason = loop {
        match os.step() {
            StepOutcome::Continue => {}
            StepOutcome::Halted(reason) => break reason,
        }
        steps += 1;
        assert!(steps < 2_000_000, "simulation never halted");
    };
    assert_eq!(reason, HaltReason::ProcessTableEmpty);
}
