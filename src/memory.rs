//! Memory management: the mode switch and the contiguous first-fit
//! allocator.
//!
//! The emulator runs exactly one of two managers, chosen at `initialize`
//! from the configuration: first-fit contiguous allocation over one flat
//! byte span, or demand paging (see [`crate::paging`]). Both expose the
//! same word-level access surface to the interpreter.

use tracing::error;

use crate::backing::BackingStore;
use crate::config::Config;
use crate::paging::PagingMemory;
use crate::process::Pcb;
use crate::stats::Stats;
use crate::types::VirtAddr;

/// Why a memory reference failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// Address out of range, misaligned, or not owned by the process.
    Violation,
    /// Paging only: no frame can be evicted because every occupied frame
    /// belongs to a currently-running process.
    Deadlock,
}

/// One entry in the contiguous block list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    pub size: usize,
    pub free: bool,
    /// Owning process name; empty while free.
    pub owner: String,
}

/// First-fit allocator over `[0, capacity)` with split on allocate and
/// coalesce on free.
///
/// Blocks are address-ordered, non-overlapping, and always sum to the
/// capacity; that invariant is re-checked after every mutation and a
/// violation is fatal.
pub struct ContiguousMemory {
    capacity: usize,
    /// Fallback size for processes registered without a requirement.
    min_alloc: usize,
    blocks: Vec<Block>,
    /// One 16-bit cell per even byte address.
    words: Vec<u16>,
}

impl ContiguousMemory {
    pub fn new(capacity: usize, min_alloc: usize) -> Self {
        ContiguousMemory {
            capacity,
            min_alloc,
            blocks: vec![Block {
                start: 0,
                size: capacity,
                free: true,
                owner: String::new(),
            }],
            words: vec![0; capacity / 2],
        }
    }

    pub fn owns(&self, name: &str) -> bool {
        self.blocks
            .iter()
            .any(|block| !block.free && block.owner == name)
    }

    /// First free block with room gets the low end; a remainder splits off
    /// as a new free block. Fails when nothing fits or the process already
    /// owns memory.
    pub fn allocate(&mut self, name: &str, requirement: usize) -> bool {
        let required = if requirement > 0 {
            requirement
        } else {
            self.min_alloc
        };
        if self.owns(name) {
            return false;
        }

        for i in 0..self.blocks.len() {
            if !self.blocks[i].free || self.blocks[i].size < required {
                continue;
            }
            self.blocks[i].free = false;
            self.blocks[i].owner = name.to_string();
            if self.blocks[i].size > required {
                let remainder = Block {
                    start: self.blocks[i].start + required,
                    size: self.blocks[i].size - required,
                    free: true,
                    owner: String::new(),
                };
                self.blocks[i].size = required;
                self.blocks.insert(i + 1, remainder);
            }
            self.verify();
            return true;
        }
        false
    }

    /// Free every block owned by `name`, coalescing with free neighbours
    /// (left, then right) in a single pass.
    pub fn deallocate(&mut self, name: &str) {
        let mut i = 0;
        while i < self.blocks.len() {
            if self.blocks[i].free || self.blocks[i].owner != name {
                i += 1;
                continue;
            }
            self.blocks[i].free = true;
            self.blocks[i].owner.clear();
            if i > 0 && self.blocks[i - 1].free {
                let absorbed = self.blocks.remove(i).size;
                i -= 1;
                self.blocks[i].size += absorbed;
            }
            if i + 1 < self.blocks.len() && self.blocks[i + 1].free {
                let absorbed = self.blocks.remove(i + 1).size;
                self.blocks[i].size += absorbed;
            }
            i += 1;
        }
        self.verify();
    }

    fn owned_span(&self, name: &str) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .find(|block| !block.free && block.owner == name)
            .map(|block| (block.start, block.size))
    }

    fn cell_index(&self, name: &str, addr: VirtAddr) -> Result<usize, MemError> {
        let (start, size) = self.owned_span(name).ok_or(MemError::Violation)?;
        if addr % 2 != 0 || addr + 2 > size {
            return Err(MemError::Violation);
        }
        Ok((start + addr) / 2)
    }

    pub fn read_word(&self, name: &str, addr: VirtAddr) -> Result<u16, MemError> {
        let index = self.cell_index(name, addr)?;
        Ok(self.words[index])
    }

    pub fn write_word(&mut self, name: &str, addr: VirtAddr, value: u16) -> Result<(), MemError> {
        let index = self.cell_index(name, addr)?;
        self.words[index] = value;
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn used_bytes(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| !block.free)
            .map(|block| block.size)
            .sum()
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity - self.used_bytes()
    }

    pub fn proc_count(&self) -> usize {
        self.blocks.iter().filter(|block| !block.free).count()
    }

    /// Block sizes must partition the capacity exactly. A violation means
    /// allocator state is corrupt; dump the map and terminate.
    fn verify(&self) {
        let mut expected_start = 0;
        let mut total = 0;
        for block in &self.blocks {
            if block.size == 0 || block.start != expected_start {
                error!("memory invariant violated\n{}", self.render_map());
                std::process::exit(1);
            }
            expected_start += block.size;
            total += block.size;
        }
        if total != self.capacity {
            error!(
                expected = self.capacity,
                actual = total,
                "memory block sizes do not sum to capacity\n{}",
                self.render_map()
            );
            std::process::exit(1);
        }
    }

    fn render_map(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let end = block.start + block.size;
            if block.free {
                out.push_str(&format!("[{}-{}] FREE\n", block.start, end - 1));
            } else {
                out.push_str(&format!("[{}-{}] USED by {}\n", block.start, end - 1, block.owner));
            }
        }
        out
    }

    /// Textual memory map, high to low, allocated blocks only.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Number of processes in memory: {}\n",
            self.proc_count()
        ));
        out.push_str(&format!(
            "Total external fragmentation in KB: {}\n\n",
            self.free_bytes() / 1024
        ));
        out.push_str(&format!("----end---- = {}\n\n", self.capacity));
        for block in self.blocks.iter().rev() {
            if block.free {
                continue;
            }
            out.push_str(&format!("{}\n{}\n{}\n\n", block.start + block.size, block.owner, block.start));
        }
        out.push_str("----start---- = 0\n");
        out
    }
}

/// The mode switch the rest of the emulator talks to.
pub enum MemoryManager {
    Contiguous(ContiguousMemory),
    Paging(PagingMemory),
}

impl MemoryManager {
    pub fn from_config(cfg: &Config) -> Self {
        if cfg.paging_enabled() {
            MemoryManager::Paging(PagingMemory::new(
                cfg.max_overall_mem,
                cfg.mem_per_frame,
                BackingStore::open(cfg.paths.backing_store.clone()),
            ))
        } else {
            MemoryManager::Contiguous(ContiguousMemory::new(
                cfg.max_overall_mem,
                cfg.min_mem_per_proc,
            ))
        }
    }

    pub fn is_paging(&self) -> bool {
        matches!(self, MemoryManager::Paging(_))
    }

    pub fn owns(&self, name: &str) -> bool {
        match self {
            MemoryManager::Contiguous(mem) => mem.owns(name),
            MemoryManager::Paging(mem) => mem.owns(name),
        }
    }

    pub fn allocate(&mut self, pcb: &Pcb) -> bool {
        match self {
            MemoryManager::Contiguous(mem) => mem.allocate(&pcb.name, pcb.memory_requirement),
            MemoryManager::Paging(mem) => mem.allocate(&pcb.name, pcb.memory_requirement),
        }
    }

    pub fn deallocate(&mut self, name: &str) {
        match self {
            MemoryManager::Contiguous(mem) => mem.deallocate(name),
            MemoryManager::Paging(mem) => mem.deallocate(name),
        }
    }

    pub fn read_word(
        &mut self,
        pcb: &Pcb,
        addr: VirtAddr,
        running: &[String],
        stats: &Stats,
    ) -> Result<u16, MemError> {
        match self {
            MemoryManager::Contiguous(mem) => mem.read_word(&pcb.name, addr),
            MemoryManager::Paging(mem) => {
                mem.read_word(&pcb.name, pcb.memory_requirement, addr, running, stats)
            }
        }
    }

    pub fn write_word(
        &mut self,
        pcb: &Pcb,
        addr: VirtAddr,
        value: u16,
        running: &[String],
        stats: &Stats,
    ) -> Result<(), MemError> {
        match self {
            MemoryManager::Contiguous(mem) => mem.write_word(&pcb.name, addr, value),
            MemoryManager::Paging(mem) => {
                mem.write_word(&pcb.name, pcb.memory_requirement, addr, value, running, stats)
            }
        }
    }

    pub fn total_bytes(&self) -> usize {
        match self {
            MemoryManager::Contiguous(mem) => mem.capacity,
            MemoryManager::Paging(mem) => mem.total_bytes(),
        }
    }

    pub fn used_bytes(&self) -> usize {
        match self {
            MemoryManager::Contiguous(mem) => mem.used_bytes(),
            MemoryManager::Paging(mem) => mem.used_bytes(),
        }
    }

    pub fn free_bytes(&self) -> usize {
        self.total_bytes() - self.used_bytes()
    }

    pub fn proc_count(&self) -> usize {
        match self {
            MemoryManager::Contiguous(mem) => mem.proc_count(),
            MemoryManager::Paging(mem) => mem.proc_count(),
        }
    }

    pub fn snapshot(&self) -> String {
        match self {
            MemoryManager::Contiguous(mem) => mem.snapshot(),
            MemoryManager::Paging(mem) => mem.snapshot(),
        }
    }
}
