//! Per-core workers.
//!
//! Each core runs one of these loops: read the slot, wait out the
//! instruction delay in tick waits, pick the next instruction (scripted or
//! synthesized), and interpret it. The FCFS and round-robin policies share
//! the skeleton; RR adds the quantum epilogue that requeues an unfinished
//! process and, in contiguous mode, drops a memory snapshot.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SchedPolicy;
use crate::interp::{self, ExecError};
use crate::process::Pcb;
use crate::report;
use crate::system::System;
use crate::trace::SchedEventKind;
use crate::types::CoreId;

/// Poll interval over an empty slot.
const IDLE_POLL_MS: u64 = 10;

pub fn run(system: &Arc<System>, core: CoreId) {
    debug!(core = core.0, "worker started");
    let mut snapshot_seq: u64 = 0;

    while !system.stop_requested() {
        let Some(pcb) = system.table.slot(core) else {
            system.stats.record_idle_tick();
            thread::sleep(Duration::from_millis(IDLE_POLL_MS));
            continue;
        };
        system.stats.record_active_tick();

        // One instruction per delay-per-exec ticks, each a
        // strictly-greater wait that also wakes on stop.
        for _ in 0..system.config.delay_per_exec {
            if system.stop_requested() {
                break;
            }
            let last = system.clock.now();
            system.clock.wait_past(last, &system.stop);
        }
        if system.stop_requested() {
            break;
        }

        if !pcb.is_done() {
            let instruction = match &pcb.custom_instructions {
                Some(script) => script.get(pcb.executed()).cloned().unwrap_or_default(),
                None => interp::generate_instruction(
                    &pcb.name,
                    system.config.enable_sleep,
                    system.config.enable_for,
                ),
            };
            match interp::execute(system, &pcb, &instruction) {
                Ok(()) => {
                    pcb.bump_executed();
                    system.trace.record(
                        system.clock.now(),
                        core,
                        SchedEventKind::Executed { pid: pcb.id },
                    );
                }
                Err(ExecError::MemoryViolation { address }) => {
                    cancel(system, &pcb, core, &address);
                    continue;
                }
            }
        }

        if system.config.scheduler == SchedPolicy::RoundRobin {
            let remaining = pcb.dec_quantum();
            if pcb.is_done() {
                finish(system, &pcb, core);
            } else if remaining == 0 {
                requeue_expired(system, &pcb, core, &mut snapshot_seq);
            }
            continue;
        }

        if pcb.is_done() {
            finish(system, &pcb, core);
        }
    }
    debug!(core = core.0, "worker exiting");
}

/// Memory-violation path: the process ends, the scheduler continues.
fn cancel(system: &Arc<System>, pcb: &Arc<Pcb>, core: CoreId, address: &str) {
    warn!(process = %pcb.name, core = core.0, address, "memory access violation, cancelling");
    system.table.cancel(pcb, address);
    report::log_violation(&system.config.paths, &pcb.name, address);
    system.free_memory(pcb);
    system.table.clear_slot(core);
    pcb.set_core(None);
    system
        .trace
        .record(system.clock.now(), core, SchedEventKind::Cancelled { pid: pcb.id });
}

fn finish(system: &Arc<System>, pcb: &Arc<Pcb>, core: CoreId) {
    system.table.finish(core, pcb);
    system.free_memory(pcb);
    system
        .trace
        .record(system.clock.now(), core, SchedEventKind::Finished { pid: pcb.id });
    info!(process = %pcb.name, core = core.0, "finished");
}

/// Quantum ran out with work left: back to the tail of the ready queue.
fn requeue_expired(system: &Arc<System>, pcb: &Arc<Pcb>, core: CoreId, snapshot_seq: &mut u64) {
    system.table.clear_slot(core);
    pcb.set_core(None);
    system.table.enqueue(pcb.clone());
    system
        .trace
        .record(system.clock.now(), core, SchedEventKind::QuantumExpired { pid: pcb.id });
    debug!(process = %pcb.name, core = core.0, "quantum expired, requeued");

    let contiguous = !system.memory.lock().unwrap().is_paging();
    if contiguous {
        if let Err(err) = report::write_memory_snapshot(system, core, *snapshot_seq) {
            warn!(core = core.0, %err, "failed to write memory snapshot");
        }
        *snapshot_seq += 1;
    }
}
