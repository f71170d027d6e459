//! Owns every registered device capability plus the bookkeeping the OS
//! needs around it: who has it open, and who is waiting to open a
//! non-sharable device that's currently busy. Stores only `Pid`s, never
//! `Pcb` references, so the device table and the process table never need
//! to see each other (design note on breaking PCB/DeviceRecord cycles).

use std::collections::VecDeque;

use crate::device::Device;
use crate::word::{DeviceId, Pid};

pub struct DeviceRecord {
    device: Box<dyn Device>,
    openers: Vec<Pid>,
    open_waiters: VecDeque<Pid>,
}

impl DeviceRecord {
    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    pub fn is_opened_by(&self, pid: Pid) -> bool {
        self.openers.contains(&pid)
    }
}

pub enum OpenOutcome {
    Opened,
    /// Pushed onto the device's open-waiter queue; the caller must block
    /// the process for `(device_id, Open, 0)`.
    Blocked,
    NotFound,
    /// The caller already holds this device open. Queuing it as an
    /// open-waiter too would deadlock it against itself, since only a
    /// matching `CLOSE` promotes a waiter and this process could never
    /// reach `CLOSE` while blocked.
    AlreadyOpen,
}

#[derive(Default)]
pub struct DeviceTable {
    records: Vec<DeviceRecord>,
}

impl DeviceTable {
    pub fn new() -> DeviceTable {
        DeviceTable {
            records: Vec::new(),
        }
    }

    /// Register a device, assigning it the next sequential id.
    pub fn register(&mut self, mut device: Box<dyn Device>) -> DeviceId {
        let id = DeviceId(self.records.len() as u32);
        device.set_id(id);
        self.records.push(DeviceRecord {
            device,
            openers: Vec::new(),
            open_waiters: VecDeque::new(),
        });
        id
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceRecord> {
        self.records.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut DeviceRecord> {
        self.records.get_mut(id.0 as usize)
    }

    /// `open` per spec §4.8: add the process to the opener-set; if the
    /// device is non-sharable and already in use, queue the process as a
    /// waiter instead of opening it. A process that already holds the
    /// device open is reported back rather than queued, since it could
    /// never unblock itself.
    pub fn open(&mut self, id: DeviceId, pid: Pid) -> OpenOutcome {
        let Some(record) = self.records.get_mut(id.0 as usize) else {
            return OpenOutcome::NotFound;
        };
        if record.is_opened_by(pid) {
            return OpenOutcome::AlreadyOpen;
        }
        if record.device.is_sharable() || record.openers.is_empty() {
            record.openers.push(pid);
            OpenOutcome::Opened
        } else {
            record.open_waiters.push_back(pid);
            OpenOutcome::Blocked
        }
    }

    /// `close`: remove the process from the opener-set. If a process was
    /// queued waiting to open a now-available non-sharable device, promote
    /// the earliest waiter into the opener-set and return its pid so the
    /// caller can unblock it.
    pub fn close(&mut self, id: DeviceId, pid: Pid) -> Option<Pid> {
        let record = self.records.get_mut(id.0 as usize)?;
        record.openers.retain(|&p| p != pid);
        if record.openers.is_empty() {
            if let Some(next) = record.open_waiters.pop_front() {
                record.openers.push(next);
                return Some(next);
            }
        }
        None
    }
}
