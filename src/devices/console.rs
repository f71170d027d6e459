//! A synchronous, sharable, write-only console — the device-table analogue
//! of the teacher emulator's memory-mapped display data register (`DDR`):
//! every write is echoed to stdout and acknowledged on the spot.

use std::sync::Arc;

use crate::device::Device;
use crate::interrupt::{InterruptController, Record, RecordKind};
use crate::word::{DeviceId, Word};

pub struct ConsoleOutputDevice {
    id: DeviceId,
    interrupts: Arc<InterruptController>,
}

impl ConsoleOutputDevice {
    pub fn new(interrupts: Arc<InterruptController>) -> ConsoleOutputDevice {
        ConsoleOutputDevice {
            id: DeviceId(0),
            interrupts,
        }
    }
}

impl Device for ConsoleOutputDevice {
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
        true
    }

    fn is_readable(&self) -> bool {
        false
    }

    fn is_writeable(&self) -> bool {
        true
    }

    fn read(&mut self, _addr: Word) {
        unreachable!("console device is write-only; OS must reject READ before calling in");
    }

    fn write(&mut self, addr: Word, value: Word) {
        println!("OUTPUT: {value}");
        tracing::trace!(device = %self.id, addr, value, "console write");
        let record = Record {
            kind: RecordKind::WriteDone,
            device_id: self.id,
            addr,
            data: 0,
        };
        // Synchronous: the completion is always posted before `write`
        // returns, so it is visible on the very next CPU poll.
        self.interrupts
            .post(record)
            .expect("console writes never overlap; the slot must be empty");
    }
}
