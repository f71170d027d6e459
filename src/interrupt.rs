//! Single-slot mailbox carrying I/O completion records from devices to the
//! CPU. Producers (devices) and the consumer (the CPU's poll at the top of
//! every step) may run on different threads for asynchronous devices, so
//! the slot is guarded by a mutex rather than assumed single-threaded.

use std::sync::Mutex;

use crate::word::{DeviceId, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    ReadDone,
    WriteDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub device_id: DeviceId,
    pub addr: Word,
    /// Only meaningful for `ReadDone`.
    pub data: Word,
}

/// At most one pending record. The spec permits a bounded queue of length
/// >= 1 per *device* for overflow; that queuing, if a device needs it,
/// belongs to the device implementation, not here.
#[derive(Default)]
pub struct InterruptController {
    slot: Mutex<Option<Record>>,
}

impl InterruptController {
    pub fn new() -> InterruptController {
        InterruptController {
            slot: Mutex::new(None),
        }
    }

    /// Post a completion record. Overwrites only if the slot is empty;
    /// otherwise the record is handed back to the caller so a device can
    /// requeue it for a later retry.
    pub fn post(&self, record: Record) -> Result<(), Record> {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            return Err(record);
        }
        *slot = Some(record);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().unwrap().is_none()
    }

    pub fn take(&self) -> Option<Record> {
        self.slot.lock().unwrap().take()
    }
}
