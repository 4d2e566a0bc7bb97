//! Process control blocks and their bounded symbol tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::types::{CoreId, Pid};

/// Maximum number of variables a process may declare.
pub const SYMBOL_TABLE_CAP: usize = 32;

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Finished,
    /// Terminated by a memory access violation. Distinct from `Finished`.
    Cancelled,
}

impl ProcessState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ProcessState::Ready,
            1 => ProcessState::Running,
            2 => ProcessState::Finished,
            _ => ProcessState::Cancelled,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ProcessState::Ready => 0,
            ProcessState::Running => 1,
            ProcessState::Finished => 2,
            ProcessState::Cancelled => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Finished => "FINISHED",
            ProcessState::Cancelled => "CANCELLED",
        }
    }
}

/// Per-process variable store, capacity-bounded.
///
/// Updating an existing name always succeeds; introducing a new name once
/// the table is full is silently ignored.
#[derive(Debug, Default)]
pub struct SymbolTable {
    vars: HashMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.vars.get(name).copied()
    }

    pub fn set(&mut self, name: &str, value: u16) {
        if let Some(slot) = self.vars.get_mut(name) {
            *slot = value;
            return;
        }
        if self.vars.len() < SYMBOL_TABLE_CAP {
            self.vars.insert(name.to_string(), value);
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u16)> {
        self.vars.iter()
    }
}

/// A process control block.
///
/// Shared between the dispatcher, one worker, and reporters via `Arc`;
/// everything mutable is an atomic or sits behind its own small mutex, so a
/// PCB never needs an outer lock of its own.
pub struct Pcb {
    pub id: Pid,
    pub name: String,
    pub created_at: DateTime<Local>,
    pub instructions_total: usize,
    /// Bytes of virtual memory. Power of two in [64, 65536] for
    /// operator-registered processes.
    pub memory_requirement: usize,
    /// When present, the worker executes this list in order instead of
    /// synthesizing random instructions.
    pub custom_instructions: Option<Vec<String>>,

    state: AtomicU8,
    executed: AtomicUsize,
    /// Core index while running, -1 otherwise.
    core: AtomicI64,
    /// Round-robin slice remaining, in instructions.
    quantum_left: AtomicU32,

    pub symbols: Mutex<SymbolTable>,
    pub logs: Mutex<Vec<String>>,
}

impl Pcb {
    pub fn new(
        id: Pid,
        name: String,
        instructions_total: usize,
        memory_requirement: usize,
        custom_instructions: Option<Vec<String>>,
    ) -> Self {
        Pcb {
            id,
            name,
            created_at: Local::now(),
            instructions_total,
            memory_requirement,
            custom_instructions,
            state: AtomicU8::new(ProcessState::Ready.as_u8()),
            executed: AtomicUsize::new(0),
            core: AtomicI64::new(-1),
            quantum_left: AtomicU32::new(0),
            symbols: Mutex::new(SymbolTable::new()),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::Acquire)
    }

    pub fn bump_executed(&self) {
        self.executed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_executed(&self, count: usize) {
        self.executed.store(count, Ordering::Release);
    }

    pub fn is_done(&self) -> bool {
        self.executed() >= self.instructions_total
    }

    /// The core this process is bound to, if any.
    pub fn core_id(&self) -> Option<CoreId> {
        match self.core.load(Ordering::Acquire) {
            raw if raw >= 0 => Some(CoreId(raw as usize)),
            _ => None,
        }
    }

    pub fn set_core(&self, core: Option<CoreId>) {
        let raw = core.map(|core| core.0 as i64).unwrap_or(-1);
        self.core.store(raw, Ordering::Release);
    }

    pub fn quantum_left(&self) -> u32 {
        self.quantum_left.load(Ordering::Acquire)
    }

    pub fn set_quantum(&self, slices: u32) {
        self.quantum_left.store(slices, Ordering::Release);
    }

    /// Decrement the remaining quantum, saturating at zero. Returns the new
    /// value.
    pub fn dec_quantum(&self) -> u32 {
        let mut current = self.quantum_left.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(1);
            match self.quantum_left.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn append_log(&self, line: String) {
        self.logs.lock().unwrap().push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_table_caps_new_names() {
        let mut table = SymbolTable::new();
        for i in 0..40 {
            table.set(&format!("v{i}"), i as u16);
        }
        assert_eq!(table.len(), SYMBOL_TABLE_CAP);
        assert_eq!(table.get("v0"), Some(0));
        assert_eq!(table.get("v39"), None);
    }

    #[test]
    fn symbol_table_updates_existing_names_when_full() {
        let mut table = SymbolTable::new();
        for i in 0..SYMBOL_TABLE_CAP {
            table.set(&format!("v{i}"), 0);
        }
        table.set("v5", 777);
        assert_eq!(table.get("v5"), Some(777));
        assert_eq!(table.len(), SYMBOL_TABLE_CAP);
    }

    #[test]
    fn state_round_trips() {
        let pcb = Pcb::new(Pid(1), "p".into(), 10, 64, None);
        assert_eq!(pcb.state(), ProcessState::Ready);
        pcb.set_state(ProcessState::Cancelled);
        assert_eq!(pcb.state(), ProcessState::Cancelled);
    }

    #[test]
    fn quantum_saturates_at_zero() {
        let pcb = Pcb::new(Pid(1), "p".into(), 10, 64, None);
        pcb.set_quantum(1);
        assert_eq!(pcb.dec_quantum(), 0);
        assert_eq!(pcb.dec_quantum(), 0);
    }
}
