//! The process table: canonical owner of every PCB plus the scheduling
//! collections that reference them.
//!
//! Lock layout follows the shared-resource policy: one lock for the ready
//! queue, one for the running slots + finished list, one for the cancelled
//! list. When more than one is needed, running-lists are taken before the
//! ready queue, and memory locks always come after both.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

use crate::process::{Pcb, ProcessState};
use crate::types::{CoreId, Pid};

/// Finished entries kept for reporting; older ones are discarded.
pub const FINISHED_CAP: usize = 100;

/// Audit record for a process terminated by a memory fault.
#[derive(Clone)]
pub struct CancelRecord {
    pub pcb: Arc<Pcb>,
    pub cancelled_at: DateTime<Local>,
    /// `HH:MM:SSAM`-style time of day, quoted back by `screen -r`.
    pub time_of_day: String,
    /// The offending address exactly as it appeared in the instruction.
    pub address: String,
}

struct RunLists {
    running: Vec<Option<Arc<Pcb>>>,
    finished: VecDeque<Arc<Pcb>>,
}

pub struct ProcessTable {
    next_id: AtomicU64,
    registry: Mutex<HashMap<String, Arc<Pcb>>>,
    ready: Mutex<VecDeque<Arc<Pcb>>>,
    lists: Mutex<RunLists>,
    cancelled: Mutex<Vec<CancelRecord>>,
}

impl ProcessTable {
    pub fn new(num_cores: usize) -> Self {
        ProcessTable {
            next_id: AtomicU64::new(1),
            registry: Mutex::new(HashMap::new()),
            ready: Mutex::new(VecDeque::new()),
            lists: Mutex::new(RunLists {
                running: vec![None; num_cores],
                finished: VecDeque::new(),
            }),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn alloc_id(&self) -> Pid {
        Pid(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a PCB to the registry. Fails (false) when the name is taken.
    pub fn register(&self, pcb: Arc<Pcb>) -> bool {
        let mut registry = self.registry.lock().unwrap();
        if registry.contains_key(&pcb.name) {
            return false;
        }
        registry.insert(pcb.name.clone(), pcb);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Pcb>> {
        self.registry.lock().unwrap().get(name).cloned()
    }

    /// Every registered PCB, ordered by id for stable reports.
    pub fn all_processes(&self) -> Vec<Arc<Pcb>> {
        let mut all: Vec<_> = self.registry.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|p| p.id);
        all
    }

    /// Push to the ready-queue tail and mark Ready.
    pub fn enqueue(&self, pcb: Arc<Pcb>) {
        pcb.set_state(ProcessState::Ready);
        pcb.set_core(None);
        self.ready.lock().unwrap().push_back(pcb);
    }

    pub fn pop_ready(&self) -> Option<Arc<Pcb>> {
        self.ready.lock().unwrap().pop_front()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().unwrap().len()
    }

    /// Lowest-index empty slot, if any.
    pub fn free_core(&self) -> Option<CoreId> {
        let lists = self.lists.lock().unwrap();
        lists.running.iter().position(|slot| slot.is_none()).map(CoreId)
    }

    pub fn slot(&self, core: CoreId) -> Option<Arc<Pcb>> {
        let lists = self.lists.lock().unwrap();
        lists.running.get(core.0).and_then(|slot| slot.clone())
    }

    /// Bind a PCB to a core slot. The caller has already allocated memory
    /// and set state/core/quantum.
    pub fn install(&self, core: CoreId, pcb: &Arc<Pcb>) {
        let mut lists = self.lists.lock().unwrap();
        debug_assert!(lists.running[core.0].is_none());
        lists.running[core.0] = Some(pcb.clone());
    }

    pub fn clear_slot(&self, core: CoreId) {
        let mut lists = self.lists.lock().unwrap();
        if let Some(slot) = lists.running.get_mut(core.0) {
            *slot = None;
        }
    }

    /// Mark Finished, append to the bounded finished list, and free the
    /// core slot in one critical section.
    pub fn finish(&self, core: CoreId, pcb: &Arc<Pcb>) {
        pcb.set_state(ProcessState::Finished);
        pcb.set_core(None);
        let mut lists = self.lists.lock().unwrap();
        if let Some(slot) = lists.running.get_mut(core.0) {
            *slot = None;
        }
        push_finished(&mut lists.finished, pcb.clone());
    }

    /// Record a finished process that never held a core (synchronous runs).
    pub fn finish_detached(&self, pcb: &Arc<Pcb>) {
        pcb.set_state(ProcessState::Finished);
        let mut lists = self.lists.lock().unwrap();
        push_finished(&mut lists.finished, pcb.clone());
    }

    /// Mark Cancelled and append the audit record.
    pub fn cancel(&self, pcb: &Arc<Pcb>, address: &str) {
        pcb.set_state(ProcessState::Cancelled);
        pcb.set_executed(pcb.instructions_total);
        let now = Local::now();
        self.cancelled.lock().unwrap().push(CancelRecord {
            pcb: pcb.clone(),
            cancelled_at: now,
            time_of_day: now.format("%I:%M:%S%p").to_string(),
            address: address.to_string(),
        });
    }

    pub fn cancel_record(&self, name: &str) -> Option<CancelRecord> {
        self.cancelled
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.pcb.name == name)
            .cloned()
    }

    pub fn cancelled_snapshot(&self) -> Vec<CancelRecord> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn running_snapshot(&self) -> Vec<Option<Arc<Pcb>>> {
        self.lists.lock().unwrap().running.clone()
    }

    pub fn finished_snapshot(&self) -> Vec<Arc<Pcb>> {
        self.lists.lock().unwrap().finished.iter().cloned().collect()
    }

    /// Names of processes currently bound to a core. Feeds the paging
    /// manager's eviction liveness guard.
    pub fn running_names(&self) -> Vec<String> {
        let lists = self.lists.lock().unwrap();
        lists
            .running
            .iter()
            .flatten()
            .map(|pcb| pcb.name.clone())
            .collect()
    }

    pub fn used_cores(&self) -> usize {
        let lists = self.lists.lock().unwrap();
        lists.running.iter().flatten().count()
    }

    /// Drain the ready queue and all slots, clear the finished list, and
    /// return every PCB that was still running. Part of scheduler shutdown;
    /// the caller frees their memory afterwards.
    pub fn clear_for_stop(&self) -> Vec<Arc<Pcb>> {
        self.ready.lock().unwrap().clear();
        let mut lists = self.lists.lock().unwrap();
        let evicted: Vec<_> = lists.running.iter_mut().filter_map(Option::take).collect();
        lists.finished.clear();
        for pcb in &evicted {
            pcb.set_state(ProcessState::Ready);
            pcb.set_core(None);
        }
        evicted
    }
}

fn push_finished(finished: &mut VecDeque<Arc<Pcb>>, pcb: Arc<Pcb>) {
    finished.push_back(pcb);
    while finished.len() > FINISHED_CAP {
        finished.pop_front();
    }
}
