//! Demand paging: frames, per-process page tables, LRU replacement.
//!
//! Allocation never reserves physical memory up front; every page starts
//! out-of-memory and is faulted in on first touch. Victim selection is
//! least-recently-used over a global access counter that advances on every
//! memory reference and every page-in, so LRU ordering is strict.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::backing::BackingStore;
use crate::memory::MemError;
use crate::stats::Stats;
use crate::types::VirtAddr;

/// One physical frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub free: bool,
    pub owner: String,
    pub virtual_page: usize,
    pub last_access: u64,
}

impl Frame {
    fn empty() -> Self {
        Frame {
            free: true,
            owner: String::new(),
            virtual_page: 0,
            last_access: 0,
        }
    }
}

/// One entry in a process's page table. The page is in memory iff `frame`
/// is set.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub frame: Option<usize>,
    pub dirty: bool,
    pub last_access: u64,
}

pub struct PagingMemory {
    frame_size: usize,
    frames: Vec<Frame>,
    /// Flat physical store, `frame_size / 2` words per frame.
    words: Vec<u16>,
    tables: HashMap<String, Vec<Page>>,
    backing: BackingStore,
    access_clock: u64,
}

impl PagingMemory {
    pub fn new(total_mem: usize, frame_size: usize, backing: BackingStore) -> Self {
        let total_frames = total_mem / frame_size;
        PagingMemory {
            frame_size,
            frames: vec![Frame::empty(); total_frames],
            words: vec![0; total_mem / 2],
            tables: HashMap::new(),
            backing,
            access_clock: 0,
        }
    }

    fn words_per_frame(&self) -> usize {
        self.frame_size / 2
    }

    pub fn owns(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Build the page table: `ceil(requirement / frame_size)` pages, none
    /// resident. Always succeeds unless the process already has a table.
    pub fn allocate(&mut self, name: &str, requirement: usize) -> bool {
        if self.tables.contains_key(name) {
            return false;
        }
        let requirement = requirement.max(1);
        let pages = requirement.div_ceil(self.frame_size);
        self.tables.insert(name.to_string(), vec![Page::default(); pages]);
        true
    }

    /// Drop the page table, persisting dirty resident pages first.
    pub fn deallocate(&mut self, name: &str) {
        let Some(pages) = self.tables.remove(name) else {
            return;
        };
        let wpf = self.words_per_frame();
        for (number, page) in pages.iter().enumerate() {
            let Some(frame) = page.frame else { continue };
            if page.dirty {
                let base = frame * wpf;
                let key = BackingStore::page_key(name, number);
                self.backing.save(&key, &self.words[base..base + wpf]);
            }
            self.frames[frame] = Frame::empty();
        }
    }

    pub fn read_word(
        &mut self,
        name: &str,
        span: usize,
        addr: VirtAddr,
        running: &[String],
        stats: &Stats,
    ) -> Result<u16, MemError> {
        let (index, _page) = self.locate(name, span, addr, running, stats)?;
        Ok(self.words[index])
    }

    pub fn write_word(
        &mut self,
        name: &str,
        span: usize,
        addr: VirtAddr,
        value: u16,
        running: &[String],
        stats: &Stats,
    ) -> Result<(), MemError> {
        let (index, page) = self.locate(name, span, addr, running, stats)?;
        self.words[index] = value;
        self.tables.get_mut(name).expect("located page table")[page].dirty = true;
        Ok(())
    }

    /// Translate a virtual byte address to a physical word index, faulting
    /// the page in if needed.
    fn locate(
        &mut self,
        name: &str,
        span: usize,
        addr: VirtAddr,
        running: &[String],
        stats: &Stats,
    ) -> Result<(usize, usize), MemError> {
        let page_count = self.tables.get(name).ok_or(MemError::Violation)?.len();
        let span = if span > 0 {
            span
        } else {
            page_count * self.frame_size
        };
        if addr % 2 != 0 || addr + 2 > span {
            return Err(MemError::Violation);
        }
        let page = addr / self.frame_size;
        if page >= page_count {
            return Err(MemError::Violation);
        }

        self.access_clock += 1;
        let stamp = self.access_clock;
        let offset_words = (addr % self.frame_size) / 2;
        let wpf = self.words_per_frame();

        let resident = self.tables.get(name).expect("checked above")[page].frame;
        if let Some(frame) = resident {
            self.frames[frame].last_access = stamp;
            self.tables.get_mut(name).expect("checked above")[page].last_access = stamp;
            return Ok((frame * wpf + offset_words, page));
        }

        let frame = self.handle_fault(name, page, running, stats)?;
        Ok((frame * wpf + offset_words, page))
    }

    /// Bring `page` of `name` into some frame: a free one if available,
    /// otherwise the LRU victim, unless eviction would deadlock.
    fn handle_fault(
        &mut self,
        name: &str,
        page: usize,
        running: &[String],
        stats: &Stats,
    ) -> Result<usize, MemError> {
        let frame = match self.frames.iter().position(|f| f.free) {
            Some(free) => free,
            None => {
                // Liveness guard: with every occupied frame pinned under a
                // running process, no eviction can make progress.
                if self
                    .frames
                    .iter()
                    .all(|f| running.iter().any(|r| r == &f.owner))
                {
                    warn!(process = name, page, "page replacement deadlock");
                    return Err(MemError::Deadlock);
                }
                let victim = self
                    .frames
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, f)| f.last_access)
                    .map(|(i, _)| i)
                    .expect("frame table is never empty");
                self.evict(victim, stats);
                victim
            }
        };

        let wpf = self.words_per_frame();
        let key = BackingStore::page_key(name, page);
        let data = self.backing.load(&key, wpf);
        let base = frame * wpf;
        self.words[base..base + wpf].copy_from_slice(&data);

        self.access_clock += 1;
        let stamp = self.access_clock;
        self.frames[frame] = Frame {
            free: false,
            owner: name.to_string(),
            virtual_page: page,
            last_access: stamp,
        };
        let entry = &mut self.tables.get_mut(name).expect("allocated")[page];
        entry.frame = Some(frame);
        entry.dirty = false;
        entry.last_access = stamp;
        stats.record_page_in();

        debug!(process = name, page, frame, "page in");
        Ok(frame)
    }

    /// Push the victim frame's page out, persisting it when dirty.
    fn evict(&mut self, victim: usize, stats: &Stats) {
        let owner = self.frames[victim].owner.clone();
        let number = self.frames[victim].virtual_page;
        let wpf = self.words_per_frame();

        let dirty = self.tables[&owner][number].dirty;
        if dirty {
            let base = victim * wpf;
            let key = BackingStore::page_key(&owner, number);
            self.backing.save(&key, &self.words[base..base + wpf]);
        }
        let entry = &mut self.tables.get_mut(&owner).expect("frame owner has a table")[number];
        entry.frame = None;
        entry.dirty = false;
        self.frames[victim] = Frame::empty();
        stats.record_page_out();

        debug!(process = %owner, page = number, frame = victim, "page out");
    }

    pub fn total_bytes(&self) -> usize {
        self.frames.len() * self.frame_size
    }

    pub fn used_frames(&self) -> usize {
        self.frames.iter().filter(|f| !f.free).count()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_frames() * self.frame_size
    }

    pub fn proc_count(&self) -> usize {
        self.tables.len()
    }

    pub fn page_count(&self, name: &str) -> Option<usize> {
        self.tables.get(name).map(|pages| pages.len())
    }

    pub fn resident_pages(&self, name: &str) -> usize {
        self.tables
            .get(name)
            .map(|pages| pages.iter().filter(|p| p.frame.is_some()).count())
            .unwrap_or(0)
    }

    pub fn page_in_memory(&self, name: &str, page: usize) -> bool {
        self.tables
            .get(name)
            .and_then(|pages| pages.get(page))
            .map(|p| p.frame.is_some())
            .unwrap_or(false)
    }

    /// Totals only; per-frame detail is deliberately omitted.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Frames in use: {} / {}\n",
            self.used_frames(),
            self.frames.len()
        ));
        out.push_str(&format!(
            "Processes in memory: {}\n",
            self.proc_count()
        ));
        let mut names: Vec<_> = self.tables.keys().cloned().collect();
        names.sort();
        for name in names {
            out.push_str(&format!(
                "{}: {} / {} pages resident\n",
                name,
                self.resident_pages(&name),
                self.page_count(&name).unwrap_or(0)
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn scratch_store() -> BackingStore {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let path = std::env::temp_dir().join(format!(
            "tickos-paging-{}-{}.txt",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        BackingStore::open(PathBuf::from(path))
    }

    fn paging(total: usize, frame: usize) -> (PagingMemory, Stats) {
        (PagingMemory::new(total, frame, scratch_store()), Stats::new())
    }

    #[test]
    fn page_table_size_rounds_up() {
        let (mut mem, _) = paging(256, 64);
        assert!(mem.allocate("a", 100));
        assert_eq!(mem.page_count("a"), Some(2));
        assert!(!mem.allocate("a", 100));
    }

    #[test]
    fn first_touch_faults_the_page_in() {
        let (mut mem, stats) = paging(256, 64);
        assert!(mem.allocate("a", 64));
        assert_eq!(mem.read_word("a", 64, 0, &[], &stats), Ok(0));
        assert_eq!(stats.pages_in(), 1);
        assert_eq!(mem.used_frames(), 1);
        // A second reference hits the resident page.
        assert_eq!(mem.read_word("a", 64, 2, &[], &stats), Ok(0));
        assert_eq!(stats.pages_in(), 1);
    }

    #[test]
    fn lru_evicts_the_oldest_page() {
        let (mut mem, stats) = paging(256, 64); // 4 frames
        for name in ["p1", "p2", "p3", "p4"] {
            assert!(mem.allocate(name, 64));
            mem.write_word(name, 64, 0, 9, &[], &stats).unwrap();
        }
        assert_eq!(mem.used_frames(), 4);

        assert!(mem.allocate("p5", 64));
        mem.write_word("p5", 64, 0, 5, &[], &stats).unwrap();

        assert!(!mem.page_in_memory("p1", 0), "oldest page is the victim");
        assert!(mem.page_in_memory("p5", 0));
        assert_eq!(stats.pages_in(), 5);
        assert_eq!(stats.pages_out(), 1);
    }

    #[test]
    fn evicted_dirty_page_survives_the_round_trip() {
        let (mut mem, stats) = paging(128, 64); // 2 frames
        assert!(mem.allocate("a", 64));
        assert!(mem.allocate("b", 64));
        assert!(mem.allocate("c", 64));
        mem.write_word("a", 64, 0, 1234, &[], &stats).unwrap();
        mem.write_word("b", 64, 0, 1, &[], &stats).unwrap();
        // Faulting c in evicts a (LRU); a's dirty page goes to the store.
        mem.write_word("c", 64, 0, 2, &[], &stats).unwrap();
        assert!(!mem.page_in_memory("a", 0));
        // Touching a again faults it back with its data intact.
        assert_eq!(mem.read_word("a", 64, 0, &[], &stats), Ok(1234));
    }

    #[test]
    fn deadlock_when_all_frames_belong_to_running_processes() {
        let (mut mem, stats) = paging(128, 64); // 2 frames
        assert!(mem.allocate("a", 64));
        assert!(mem.allocate("b", 64));
        assert!(mem.allocate("c", 64));
        let running = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        mem.read_word("a", 64, 0, &running, &stats).unwrap();
        mem.read_word("b", 64, 0, &running, &stats).unwrap();
        assert_eq!(
            mem.read_word("c", 64, 0, &running, &stats),
            Err(MemError::Deadlock)
        );
        // With one owner no longer running, eviction proceeds.
        let running = vec!["b".to_string(), "c".to_string()];
        assert_eq!(mem.read_word("c", 64, 0, &running, &stats), Ok(0));
        assert!(!mem.page_in_memory("a", 0));
    }

    #[test]
    fn invalid_addresses_fault() {
        let (mut mem, stats) = paging(256, 64);
        assert!(mem.allocate("a", 64));
        assert_eq!(mem.read_word("a", 64, 1, &[], &stats), Err(MemError::Violation));
        assert_eq!(mem.read_word("a", 64, 64, &[], &stats), Err(MemError::Violation));
        assert_eq!(
            mem.read_word("a", 64, 0x1000, &[], &stats),
            Err(MemError::Violation)
        );
        assert_eq!(mem.read_word("ghost", 64, 0, &[], &stats), Err(MemError::Violation));
    }

    #[test]
    fn deallocate_frees_frames_and_persists_dirty_pages() {
        let (mut mem, stats) = paging(128, 64);
        assert!(mem.allocate("a", 64));
        mem.write_word("a", 64, 0, 77, &[], &stats).unwrap();
        mem.deallocate("a");
        assert_eq!(mem.used_frames(), 0);
        assert!(!mem.owns("a"));
        // A new allocation under the same name reloads the persisted page.
        assert!(mem.allocate("a", 64));
        assert_eq!(mem.read_word("a", 64, 0, &[], &stats), Ok(77));
    }
}
