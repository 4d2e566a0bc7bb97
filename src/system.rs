//! The shared emulator state.
//!
//! One `System` value owns the clock, counters, process table, memory
//! manager, and trace; tasks share it by `Arc`. Interior mutability is
//! confined to the tables that need locks, so nothing here requires an
//! outer lock of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::TickClock;
use crate::config::Config;
use crate::memory::MemoryManager;
use crate::process::Pcb;
use crate::stats::Stats;
use crate::table::ProcessTable;
use crate::trace::SchedTrace;

pub struct System {
    pub config: Config,
    pub clock: TickClock,
    pub stats: Stats,
    pub table: ProcessTable,
    pub memory: Mutex<MemoryManager>,
    pub trace: SchedTrace,

    /// Raised by `scheduler-stop`; wakes every tick waiter. Re-armed after
    /// the runtime has joined so a later start works.
    pub stop: AtomicBool,
    /// True while a runtime's threads are alive.
    pub started: AtomicBool,
    /// Gate for the batch generator. The stop flag always wins.
    pub generating: AtomicBool,
}

impl System {
    pub fn new(config: Config) -> Arc<Self> {
        let memory = MemoryManager::from_config(&config);
        let table = ProcessTable::new(config.num_cpu);
        Arc::new(System {
            config,
            clock: TickClock::new(),
            stats: Stats::new(),
            table,
            memory: Mutex::new(memory),
            trace: SchedTrace::new(),
            stop: AtomicBool::new(false),
            started: AtomicBool::new(false),
            generating: AtomicBool::new(false),
        })
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Allocate memory for a PCB, treating an existing allocation as
    /// success. Used at dispatch so a requeued process keeps its memory.
    pub fn ensure_allocated(&self, pcb: &Pcb) -> bool {
        let mut memory = self.memory.lock().unwrap();
        memory.owns(&pcb.name) || memory.allocate(pcb)
    }

    pub fn free_memory(&self, pcb: &Pcb) {
        self.memory.lock().unwrap().deallocate(&pcb.name);
    }
}
