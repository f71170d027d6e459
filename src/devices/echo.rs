//! A non-sharable, asynchronous device that echoes back whatever was last
//! written to it. Modeled on the pack's mock-device idiom (a background
//! worker that completes a request and reports back through a shared
//! channel) adapted to this simulation's single interrupt-controller
//! mailbox instead of a richer async runtime.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::device::Device;
use crate::interrupt::{InterruptController, Record, RecordKind};
use crate::word::{DeviceId, Word};

pub struct AsyncEchoDevice {
    id: DeviceId,
    interrupts: Arc<InterruptController>,
    delay: Duration,
    busy: Arc<AtomicBool>,
    last_written: Arc<AtomicI64>,
}

impl AsyncEchoDevice {
    pub fn new(interrupts: Arc<InterruptController>, delay: Duration) -> AsyncEchoDevice {
        AsyncEchoDevice {
            id: DeviceId(0),
            interrupts,
            delay,
            busy: Arc::new(AtomicBool::new(false)),
            last_written: Arc::new(AtomicI64::new(0)),
        }
    }

    fn spawn_completion(&self, kind: RecordKind, addr: Word, data: Word) {
        self.busy.store(true, Ordering::SeqCst);
        let interrupts = Arc::clone(&self.interrupts);
        let busy = Arc::clone(&self.busy);
        let device_id = self.id;
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            let mut record = Record {
                kind,
                device_id,
                addr,
                data,
            };
            // The controller only holds one pending record; if another
            // completion beat us to it, keep retrying. A real driver would
            // bound this with its own per-device queue (spec §4.3).
            while let Err(rejected) = interrupts.post(record) {
                record = rejected;
                thread::sleep(Duration::from_micros(50));
            }
            busy.store(false, Ordering::SeqCst);
        });
    }
}

impl Device for AsyncEchoDevice {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn set_id(&mut self, id: DeviceId) {
        self.id = id;
    }

    fn is_sharable(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        true
    }

    fn read(&mut self, addr: Word) {
        let data = self.last_written.load(Ordering::SeqCst);
        self.spawn_completion(RecordKind::ReadDone, addr, data);
    }

    fn write(&mut self, addr: Word, value: Word) {
        self.last_written.store(value, Ordering::SeqCst);
        self.spawn_completion(RecordKind::WriteDone, addr, 0);
    }
}
