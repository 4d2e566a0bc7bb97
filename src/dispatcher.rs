//! The dispatcher: binds ready processes to free core slots.
//!
//! A single thread pulls the ready-queue head, allocates memory, and
//! installs the process into the lowest-index free slot. Binding is only
//! attempted while a slot is free so a popped PCB never loses its FIFO
//! position waiting for one; an allocation refusal requeues at the tail.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::SchedPolicy;
use crate::process::ProcessState;
use crate::system::System;
use crate::trace::SchedEventKind;

/// Poll interval while the ready queue is empty.
const IDLE_POLL_MS: u64 = 10;
/// Back-off after a full core set or a refused allocation.
const RETRY_POLL_MS: u64 = 50;

pub fn run(system: &Arc<System>) {
    debug!("dispatcher started");
    while !system.stop_requested() {
        let Some(core) = system.table.free_core() else {
            thread::sleep(Duration::from_millis(RETRY_POLL_MS));
            continue;
        };
        let Some(pcb) = system.table.pop_ready() else {
            thread::sleep(Duration::from_millis(IDLE_POLL_MS));
            continue;
        };

        if !system.ensure_allocated(&pcb) {
            debug!(process = %pcb.name, "memory refused, requeueing at tail");
            system.table.enqueue(pcb);
            thread::sleep(Duration::from_millis(RETRY_POLL_MS));
            continue;
        }

        pcb.set_state(ProcessState::Running);
        pcb.set_core(Some(core));
        if system.config.scheduler == SchedPolicy::RoundRobin {
            pcb.set_quantum(system.config.quantum_cycles);
        }
        system.table.install(core, &pcb);
        system
            .trace
            .record(system.clock.now(), core, SchedEventKind::Dispatched { pid: pcb.id });
        debug!(process = %pcb.name, core = core.0, "dispatched");
    }
    debug!("dispatcher exiting");
}
