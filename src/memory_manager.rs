//! Contiguous-memory allocator: a first-fit free list plus on-demand
//! compaction. The free list is kept sorted by address at all times so
//! `alloc`'s first-fit scan and `free`'s coalescing pass don't need to sort
//! on every call.

use crate::error::NotEnoughMemory;
use crate::process_table::ProcessTable;
use crate::ram::Ram;
use crate::word::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemBlock {
    pub addr: Word,
    pub size: usize,
}

pub struct MemoryManager {
    free_list: Vec<MemBlock>,
    ram_size: usize,
}

/// A read-only snapshot of free-list health, used by tests and by the
/// `tracing` event `compact()` emits when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_free: usize,
    pub largest_free: usize,
    pub fragment_count: usize,
}

impl MemoryManager {
    pub fn new(ram_size: usize) -> MemoryManager {
        MemoryManager {
            free_list: vec![MemBlock {
                addr: 0,
                size: ram_size,
            }],
            ram_size,
        }
    }

    pub fn free_blocks(&self) -> &[MemBlock] {
        &self.free_list
    }

    pub fn total_free(&self) -> usize {
        self.free_list.iter().map(|b| b.size).sum()
    }

    pub fn largest_free(&self) -> usize {
        self.free_list.iter().map(|b| b.size).max().unwrap_or(0)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            total_free: self.total_free(),
            largest_free: self.largest_free(),
            fragment_count: self.free_list.len(),
        }
    }

    fn first_fit(&mut self, size: usize) -> Option<Word> {
        let idx = self.free_list.iter().position(|b| b.size >= size)?;
        let block = self.free_list[idx];
        if block.size == size {
            self.free_list.remove(idx);
        } else {
            self.free_list[idx] = MemBlock {
                addr: block.addr + size as Word,
                size: block.size - size,
            };
        }
        Some(block.addr)
    }

    /// Allocate `size` words. Tries a first-fit scan; if no single block is
    /// big enough but the total free memory would satisfy the request,
    /// compacts once and retries (guaranteed to succeed by construction —
    /// compaction turns all free space into one trailing block).
    pub fn alloc(&mut self, size: usize, table: &mut ProcessTable, ram: &mut Ram) -> Result<Word, NotEnoughMemory> {
        if let Some(addr) = self.first_fit(size) {
            return Ok(addr);
        }
        if self.total_free() < size {
            return Err(NotEnoughMemory { requested: size });
        }
        self.compact(table, ram);
        self.first_fit(size).ok_or(NotEnoughMemory { requested: size })
    }

    /// Relocate every live process to the low end of RAM, in `BASE` order,
    /// and replace the free list with a single block spanning the
    /// remainder. The caller is responsible for saving the currently
    /// running process's registers into its PCB before calling this (and
    /// reloading them afterward) so this can operate uniformly over saved
    /// register sets (design note: running-process registers flow through
    /// the PCB, never aliased).
    pub fn compact(&mut self, table: &mut ProcessTable, ram: &mut Ram) {
        let pids_by_base: Vec<_> = table
            .windows_sorted_by_base()
            .into_iter()
            .map(|(pid, _, _)| pid)
            .collect();

        let mut cursor: Word = 0;
        for pid in pids_by_base {
            let pcb = table.get_mut(pid).expect("pid came from this table");
            let old_base = pcb.saved.base;
            let lim = pcb.saved.lim;
            if old_base != cursor {
                let shift = cursor - old_base;
                ram.copy_within(old_base, cursor, lim as usize);
                pcb.saved.base = cursor;
                pcb.saved.pc += shift;
                tracing::debug!(
                    pid = %pcb.pid,
                    old_base,
                    new_base = cursor,
                    "relocated process during compaction"
                );
            }
            cursor += lim;
        }

        self.free_list = if (cursor as usize) < self.ram_size {
            vec![MemBlock {
                addr: cursor,
                size: self.ram_size - cursor as usize,
            }]
        } else {
            Vec::new()
        };
        let stats = self.stats();
        tracing::info!(
            free_words = stats.total_free,
            largest_free = stats.largest_free,
            fragments = stats.fragment_count,
            "compaction complete"
        );
    }

    /// Return a process's memory window to the free list and coalesce any
    /// now-adjacent blocks.
    pub fn free(&mut self, base: Word, lim: Word) {
        self.free_list.push(MemBlock {
            addr: base,
            size: lim as usize,
        });
        self.free_list.sort_by_key(|b| b.addr);
        self.coalesce();
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<MemBlock> = Vec::with_capacity(self.free_list.len());
        for block in self.free_list.drain(..) {
            if let Some(prev) = merged.last_mut() {
                if prev.addr + prev.size as Word == block.addr {
                    prev.size += block.size;
                    continue;
                }
            }
            merged.push(block);
        }
        self.free_list = merged;
    }
}
