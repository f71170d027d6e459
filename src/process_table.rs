//! The process table: exclusive owner of every [`Pcb`]. Table order is
//! significant — the scheduler's "earliest table index wins" tie-break
//! walks this table front to back — so it is a plain `Vec`, not a map.

use crate::pcb::Pcb;
use crate::word::Pid;

#[derive(Default)]
pub struct ProcessTable {
    entries: Vec<Pcb>,
    next_pid: u32,
}

impl ProcessTable {
    pub fn new() -> ProcessTable {
        ProcessTable {
            entries: Vec::new(),
            next_pid: 1,
        }
    }

    pub fn alloc_pid(&mut self) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        pid
    }

    pub fn insert(&mut self, pcb: Pcb) {
        self.entries.push(pcb);
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.entries.iter().find(|p| p.pid == pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.entries.iter_mut().find(|p| p.pid == pid)
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Pcb> {
        let idx = self.entries.iter().position(|p| p.pid == pid)?;
        Some(self.entries.remove(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate in table order — the order the scheduler's tie-break and the
    /// aging pass both rely on.
    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pcb> {
        self.entries.iter_mut()
    }

    /// Every live process's `(BASE, LIM)` window, sorted by `BASE`. Used by
    /// the memory manager to relocate processes during compaction and by
    /// the RAM-partition property test.
    pub fn windows_sorted_by_base(&self) -> Vec<(Pid, i64, i64)> {
        let mut windows: Vec<(Pid, i64, i64)> = self
            .entries
            .iter()
            .map(|p| (p.pid, p.saved.base, p.saved.lim))
            .collect();
        windows.sort_by_key(|&(_, base, _)| base);
        windows
    }
}
