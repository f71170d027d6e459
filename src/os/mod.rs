//! The operating system: owns every piece of state the CPU does not (the
//! process table, the device table, the free list, the program registry),
//! and implements the trap-handler capability the CPU calls into.
//!
//! Split into `Kernel` (the OS-owned state, generic over nothing but `Ram`
//! passed in by reference) and `Os` (the CPU/RAM/interrupt-controller/Kernel
//! quadruple a caller actually drives). The split exists so `Os::step` can
//! borrow `self.cpu`, `self.ram` and `self.kernel` as disjoint fields at the
//! same time — a single `Os` struct holding all of them unsplit would make
//! `self.cpu.step(&mut self.ram, ..., &mut self.kernel, ...)` reject on the
//! borrow checker the moment `self.kernel` also needed `&self.ram`.

mod syscalls;
mod trap_handler;

use std::sync::Arc;

use crate::config::{SimConfig, Tick};
use crate::cpu::{Cpu, HaltReason, StepOutcome};
use crate::device::Device;
use crate::device_table::DeviceTable;
use crate::error::NotEnoughMemory;
use crate::instruction::{encode, Instruction};
use crate::interrupt::InterruptController;
use crate::memory_manager::MemoryManager;
use crate::pcb::Pcb;
use crate::process_table::ProcessTable;
use crate::program::{Program, ProgramRegistry};
use crate::ram::Ram;
use crate::registers::Registers;
use crate::scheduler::Scheduler;
use crate::word::{DeviceId, Pid, RegId, Word};

/// Priority newly created processes (and the idle process) start at. Not
/// named by the specification; aging and I/O reward move it from here.
const DEFAULT_PRIORITY: i64 = 0;

/// Words given to the idle process: the 16-word canned program itself plus
/// slack for the single PUSH it executes before trapping (spec §4.6).
const IDLE_ALLOC_WORDS: usize = 32;

/// The OS-owned state the CPU has no direct access to. Everything here is
/// mutated only from inside a trap/syscall dispatch or from `Os`'s process
/// setup helpers — never from `Cpu::step`'s fetch/execute path itself.
pub struct Kernel {
    pub process_table: ProcessTable,
    pub device_table: DeviceTable,
    pub memory: MemoryManager,
    pub scheduler: Scheduler,
    pub programs: ProgramRegistry,
    pub config: SimConfig,
    pub current_pid: Option<Pid>,
    halted: Option<HaltReason>,
}

impl Kernel {
    fn new(config: SimConfig) -> Kernel {
        Kernel {
            process_table: ProcessTable::new(),
            device_table: DeviceTable::new(),
            memory: MemoryManager::new(config.ram_size),
            scheduler: Scheduler::new(),
            programs: ProgramRegistry::new(),
            config,
            current_pid: None,
            halted: None,
        }
    }

    fn fatal(&mut self, reason: HaltReason) {
        if self.halted.is_none() {
            tracing::error!(?reason, "fatal trap, halting simulation");
            self.halted = Some(reason);
        }
    }

    pub fn halted(&self) -> Option<HaltReason> {
        self.halted
    }

    /// Look up the currently running process's PCB. Panics if called with no
    /// current process set, which would be a bug in the caller — every
    /// dispatch path that reaches the kernel runs on behalf of some process.
    fn current_pcb_mut(&mut self) -> &mut Pcb {
        let pid = self.current_pid.expect("syscall dispatched with no current process");
        self.process_table.get_mut(pid).expect("current_pid always names a live PCB")
    }

    /// Copy `regs` into the current PCB's saved slot without changing its
    /// `RunState`. The caller sets the state afterward (`Ready` for a
    /// voluntary yield, `Blocked` for a blocking syscall) — see
    /// [`Scheduler::switch_in`] for why this is kept separate from loading
    /// the next process in.
    fn save_current(&mut self, regs: &Registers) {
        if let Some(pid) = self.current_pid {
            if let Some(pcb) = self.process_table.get_mut(pid) {
                pcb.saved = *regs;
            }
        }
    }

    /// Create a process from a raw instruction image: allocate its memory
    /// window, load the program, and insert a `Ready` PCB. Used both for
    /// the initial process load (`Os::spawn`) and by the `EXEC` syscall.
    fn create_process(&mut self, ram: &mut Ram, instructions: &[Word], alloc_size: usize, tick: Tick) -> Result<Pid, NotEnoughMemory> {
        let base = self.memory.alloc(alloc_size, &mut self.process_table, ram)?;
        ram.load(base, instructions);
        let pid = self.process_table.alloc_pid();
        let regs = Registers::new(base, alloc_size as Word, base);
        let pcb = Pcb::new(pid, regs, DEFAULT_PRIORITY, tick);
        tracing::info!(%pid, base, size = alloc_size, "process created");
        self.process_table.insert(pcb);
        Ok(pid)
    }

    /// The 16-word canned idle program: `SET R0,0; SET R0,0; PUSH R0; TRAP`,
    /// which EXITs (syscall id 0, pushed by the `PUSH R0` since R0 is 0) the
    /// instant it is scheduled.
    fn idle_program() -> Vec<Word> {
        let mut words = Vec::with_capacity(16);
        words.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 }));
        words.extend(encode(Instruction::Set { r: RegId::R0, imm: 0 }));
        words.extend(encode(Instruction::Push { r: RegId::R0 }));
        words.extend(encode(Instruction::Trap));
        words
    }

    fn spawn_idle_process(&mut self, ram: &mut Ram, tick: Tick) {
        let program = Self::idle_program();
        match self.create_process(ram, &program, IDLE_ALLOC_WORDS, tick) {
            Ok(pid) => {
                self.process_table.get_mut(pid).expect("just inserted").is_idle = true;
                tracing::debug!(%pid, "spawned idle process");
            }
            Err(err) => {
                // Only reachable if RAM is too small to ever host the idle
                // program; nothing recovers from this, so it's fatal.
                tracing::error!(%err, "cannot create idle process");
                self.fatal(HaltReason::ProcessTableEmpty);
            }
        }
    }

    /// Pick the next runnable process, spawning idle processes until one is
    /// available. Loops at most a handful of times in practice: a spawned
    /// idle process is immediately `Ready` and therefore immediately
    /// selectable.
    fn pick_next(&mut self, ram: &mut Ram, tick: Tick) -> Option<Pid> {
        loop {
            if let Some(next) = self.scheduler.select(&self.process_table, self.current_pid, &self.config) {
                return Some(next);
            }
            if self.halted.is_some() {
                return None;
            }
            self.spawn_idle_process(ram, tick);
        }
    }

    /// Reschedule after the current process voluntarily yields the CPU
    /// (clock-driven preemption, explicit `YIELD`, or a `READ`/`WRITE` that
    /// had to rewind because its device was momentarily unavailable). The
    /// outgoing PCB goes back to `Ready` as part of the switch itself.
    fn reschedule_voluntary(&mut self, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
        self.scheduler.apply_aging(&mut self.process_table, self.current_pid, *tick, &self.config);
        let Some(next) = self.pick_next(ram, *tick) else { return };
        let switched = self.scheduler.context_switch(&mut self.process_table, self.current_pid, next, regs, *tick);
        if switched {
            *tick = *tick + self.config.context_switch_cost * 2;
        }
        self.current_pid = Some(next);
    }

    /// Reschedule after the current process has already left the table
    /// (`EXIT`) or been marked `Blocked` by the caller. Never touches the
    /// departed PCB's state — only picks and loads whatever runs next.
    fn reschedule_after_departure(&mut self, ram: &mut Ram, regs: &mut Registers, tick: &mut Tick) {
        self.scheduler.apply_aging(&mut self.process_table, self.current_pid, *tick, &self.config);
        let Some(next) = self.pick_next(ram, *tick) else { return };
        self.scheduler.switch_in(&mut self.process_table, next, regs, *tick, true);
        *tick = *tick + self.config.context_switch_cost * 2;
        self.current_pid = Some(next);
    }
}

/// Pop one word off the live stack: read the top occupied word, then
/// increment SP. Used by the syscall layer to read its own calling
/// convention directly, bypassing the bounds-checked `PUSH`/`POP` opcode
/// path — the OS trusts its own syscall ABI rather than trapping itself.
pub(super) fn pop_word(regs: &mut Registers, ram: &Ram) -> Word {
    let addr = regs.sp_addr();
    let value = ram.read(addr);
    regs.sp += 1;
    value
}

/// Push one word onto the live stack: decrement SP, then write — the same
/// order the `PUSH` opcode uses, so the syscall layer's pushes are
/// indistinguishable on the stack from ones the user program made itself.
pub(super) fn push_word(regs: &mut Registers, ram: &mut Ram, value: Word) {
    regs.sp -= 1;
    let addr = regs.sp_addr();
    ram.write(addr, value);
}

/// Push one word onto a *blocked* process's saved stack: same
/// decrement-then-write order as [`push_word`], but computed from the
/// PCB's saved `BASE`/`SP` rather than the live CPU registers, since the
/// process whose stack is being grown is not the one currently running
/// (spec §9: "write at `BASE + saved_SP`, then decrement" — read here as
/// pinning the address computation, not reversing the decrement-then-write
/// order already fixed for `PUSH` elsewhere in the same document).
pub(super) fn push_to_saved(pcb: &mut Pcb, ram: &mut Ram, value: Word) {
    pcb.saved.sp -= 1;
    let addr = pcb.saved.base + pcb.saved.sp;
    ram.write(addr, value);
}

/// The simulation: CPU, RAM, interrupt controller, and the kernel state
/// tying them together. `interrupts` is an `Arc` (not a plain owned value)
/// because asynchronous devices post completions from a background thread
/// (see [`crate::devices::AsyncEchoDevice`]) while the OS — running on the
/// main thread — is, per spec, the exclusive logical owner of the
/// controller's consumer side.
pub struct Os {
    pub cpu: Cpu,
    pub ram: Ram,
    interrupts: Arc<InterruptController>,
    pub kernel: Kernel,
}

impl Os {
    pub fn new(config: SimConfig) -> Os {
        let ram = Ram::new(config.ram_size);
        let cpu = Cpu::new(Registers::new(0, 0, 0));
        Os {
            cpu,
            ram,
            interrupts: Arc::new(InterruptController::new()),
            kernel: Kernel::new(config),
        }
    }

    /// A handle devices can clone to post completions asynchronously.
    pub fn interrupt_handle(&self) -> Arc<InterruptController> {
        Arc::clone(&self.interrupts)
    }

    pub fn register_device(&mut self, device: Box<dyn Device>) -> DeviceId {
        self.kernel.device_table.register(device)
    }

    pub fn register_program(&mut self, program: Program) -> usize {
        self.kernel.programs.register(program)
    }

    /// Load an instruction image as a fresh process and, if this is the
    /// first process created, make it the one the CPU runs next.
    pub fn spawn(&mut self, instructions: &[Word], alloc_size: usize) -> Result<Pid, NotEnoughMemory> {
        let pid = self.kernel.create_process(&mut self.ram, instructions, alloc_size, self.cpu.tick)?;
        if self.kernel.current_pid.is_none() {
            let pcb = self.kernel.process_table.get_mut(pid).expect("just created");
            pcb.state = crate::pcb::RunState::Running;
            self.cpu.regs = pcb.saved;
            self.kernel.current_pid = Some(pid);
        }
        Ok(pid)
    }

    /// Run exactly one CPU step. The `config` snapshot is taken by value
    /// (`SimConfig` is `Copy`) so `self.kernel` can be borrowed mutably as
    /// the trap handler at the same time without a conflicting immutable
    /// borrow of `self.kernel.config`.
    pub fn step(&mut self) -> StepOutcome {
        let config = self.kernel.config;
        self.cpu.step(&mut self.ram, &self.interrupts, &mut self.kernel, &config)
    }

    /// Drive the simulation to completion (a fatal trap, or the process
    /// table going empty after the last `EXIT`), or until `max_ticks`
    /// instructions have run, whichever comes first. Ambient convenience
    /// wrapped around the bare `step()` loop so tests and the demo binary
    /// don't hand-roll it.
    pub fn run_until_halt(&mut self, max_ticks: Option<u64>) -> HaltReason {
        loop {
            if let Some(limit) = max_ticks {
                if self.cpu.tick.0 >= limit {
                    return HaltReason::ProcessTableEmpty;
                }
            }
            match self.step() {
                StepOutcome::Continue => continue,
                StepOutcome::Halted(reason) => return reason,
            }
        }
    }
}
