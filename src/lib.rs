//! tickos - A tick-driven multi-core operating-system emulator.
//!
//! Synthetic user processes, each a short program over an eight-op
//! instruction set, are scheduled onto simulated cores by either a
//! first-come-first-served or a round-robin policy. All execution is gated on
//! a global tick clock, so the emulator's notion of time is decoupled from
//! wall-clock speed. Memory is served by one of two mutually exclusive
//! managers: a first-fit contiguous allocator, or demand paging with LRU
//! frame replacement backed by an on-disk store.
//!
//! # Architecture
//!
//! - **Clock**: single producer incrementing a global tick, condvar-broadcast
//!   to waiters
//! - **Dispatcher**: binds ready processes to free core slots after memory
//!   allocation
//! - **Workers**: one thread per core, driving one instruction per
//!   `delay-per-exec` ticks through the interpreter
//! - **Memory**: first-fit contiguous blocks, or frames + page tables + LRU
//!   eviction + backing store
//! - **Shell**: interactive operator loop (`initialize`, `scheduler-start`,
//!   `screen`, reports)
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tickos::{Config, Pcb, Runtime, System};
//!
//! let system = System::new(Config::default());
//! let pcb = Arc::new(Pcb::new(
//!     system.table.alloc_id(),
//!     "worker".into(),
//!     4,
//!     256,
//!     Some(vec!["DECLARE a 1".into(), "ADD a a 1".into()]),
//! ));
//! system.table.register(pcb.clone());
//! system.table.enqueue(pcb);
//!
//! let runtime = Runtime::start(system.clone(), None).unwrap();
//! // ... observe reports, then:
//! runtime.stop();
//! ```

pub mod backing;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod generator;
pub mod interp;
pub mod memory;
pub mod paging;
pub mod process;
pub mod report;
pub mod sched;
pub mod shell;
pub mod stats;
pub mod system;
pub mod table;
pub mod trace;
pub mod types;
pub mod worker;

// Re-export the main public types for convenience.
pub use backing::BackingStore;
pub use clock::{TickClock, TICK_DURATION_MS};
pub use config::{Config, Paths, SchedPolicy};
pub use interp::{ExecError, ExecResult};
pub use memory::{ContiguousMemory, MemError, MemoryManager};
pub use paging::PagingMemory;
pub use process::{Pcb, ProcessState, SymbolTable};
pub use sched::Runtime;
pub use stats::Stats;
pub use system::System;
pub use table::{CancelRecord, ProcessTable};
pub use trace::{SchedEvent, SchedEventKind, SchedTrace};
pub use types::{CoreId, Pid, Tick, VirtAddr};
