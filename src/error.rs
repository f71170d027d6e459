//! Typed errors for the three non-fatal-trap error categories the spec
//! distinguishes: hardware traps, syscall validation, and allocation
//! exhaustion.

use thiserror::Error;

use crate::word::Word;

/// A hardware-level trap. Fatal: the OS logs it and halts the whole
/// simulation, never just the offending process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalTrap {
    #[error("illegal memory access at address {0}")]
    IllegalMemoryAccess(Word),
    #[error("cannot divide by zero")]
    DivideByZero,
    #[error("illegal instruction: opcode {0}")]
    IllegalInstruction(Word),
}

/// Status codes pushed onto a process's stack by the blocking and
/// validation-only system calls. `Success` doubles as "no error".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum SyscallStatus {
    Success = 0,
    DeviceNotFound = -1,
    DeviceNotSharable = -2,
    DeviceAlreadyOpen = -3,
    DeviceNotOpen = -4,
    DeviceReadOnly = -5,
    DeviceWriteOnly = -6,
}

impl SyscallStatus {
    pub fn as_word(self) -> Word {
        self as i64
    }
}

/// Raised by the allocator when a request cannot be satisfied even after a
/// compaction attempt. The EXEC syscall handler is the only consumer: it
/// advances past the EXEC instruction without creating a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not enough memory to satisfy a request of {requested} words")]
pub struct NotEnoughMemory {
    pub requested: usize,
}
