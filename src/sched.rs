//! Scheduler runtime lifecycle: thread spawn, shutdown, and the
//! synchronous execution path used by `screen -c`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::dispatcher;
use crate::generator;
use crate::interp::{self, ExecError};
use crate::process::{Pcb, ProcessState};
use crate::report;
use crate::system::System;
use crate::types::CoreId;
use crate::worker;

/// Handles to a started scheduler: the tick producer, the dispatcher, one
/// worker per core, and (optionally) the batch generator.
///
/// Dropping a `Runtime` performs the same graceful shutdown as
/// [`Runtime::stop`], so a runtime can never leak threads.
pub struct Runtime {
    system: Arc<System>,
    clock: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    generator: Option<JoinHandle<()>>,
    stopped: bool,
}

impl Runtime {
    /// Spawn the scheduler threads. Returns `None` when a runtime is
    /// already active for this system.
    ///
    /// `generate_as` enables the batch generator with the given name
    /// prefix; it is ignored when `batch-process-freq` is zero.
    pub fn start(system: Arc<System>, generate_as: Option<String>) -> Option<Runtime> {
        if system.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        system.stop.store(false, Ordering::Release);
        system.trace.clear();

        let clock = {
            let system = system.clone();
            thread::Builder::new()
                .name("tick-clock".into())
                .spawn(move || {
                    let period = Duration::from_millis(system.config.tick_ms);
                    while !system.stop_requested() {
                        thread::sleep(period);
                        if system.stop_requested() {
                            break;
                        }
                        system.clock.advance();
                    }
                })
                .expect("spawn tick clock")
        };

        let dispatcher = {
            let system = system.clone();
            thread::Builder::new()
                .name("dispatcher".into())
                .spawn(move || dispatcher::run(&system))
                .expect("spawn dispatcher")
        };

        let workers = (0..system.config.num_cpu)
            .map(|core| {
                let system = system.clone();
                thread::Builder::new()
                    .name(format!("worker-{core}"))
                    .spawn(move || worker::run(&system, CoreId(core)))
                    .expect("spawn worker")
            })
            .collect();

        let generator = generate_as
            .filter(|_| system.config.batch_process_freq > 0)
            .map(|base_name| {
                system.generating.store(true, Ordering::Release);
                let system = system.clone();
                thread::Builder::new()
                    .name("generator".into())
                    .spawn(move || generator::run(&system, &base_name))
                    .expect("spawn generator")
            });

        info!(
            cores = system.config.num_cpu,
            scheduler = system.config.scheduler.label(),
            "scheduler started"
        );
        Some(Runtime {
            system,
            clock: Some(clock),
            dispatcher: Some(dispatcher),
            workers,
            generator,
            stopped: false,
        })
    }

    /// Graceful shutdown: raise the stop flag, wake all tick waiters, join
    /// clock, dispatcher, workers, and generator in that order, then clear
    /// the queues, free leftover memory, reset the stats, and re-arm the
    /// stop flag so a later start works.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let system = &self.system;
        system.generating.store(false, Ordering::Release);
        system.stop.store(true, Ordering::Release);
        system.clock.kick();

        if let Some(handle) = self.clock.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.generator.take() {
            let _ = handle.join();
        }

        let evicted = system.table.clear_for_stop();
        for pcb in &evicted {
            system.free_memory(pcb);
        }
        system.stats.reset();

        system.stop.store(false, Ordering::Release);
        system.started.store(false, Ordering::Release);
        info!("scheduler stopped and reset");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run a scripted process to completion on the calling thread.
///
/// This is the `screen -c` path: the process never enters the ready queue,
/// so it finishes (or cancels) before the call returns. Returns false when
/// the process has no script or memory was refused.
pub fn run_inline(system: &Arc<System>, pcb: &Arc<Pcb>) -> bool {
    let Some(script) = pcb.custom_instructions.clone() else {
        return false;
    };
    if !system.ensure_allocated(pcb) {
        warn!(process = %pcb.name, "memory refused for synchronous run");
        return false;
    }
    pcb.set_state(ProcessState::Running);

    for instruction in &script {
        match interp::execute(system, pcb, instruction) {
            Ok(()) => pcb.bump_executed(),
            Err(ExecError::MemoryViolation { address }) => {
                warn!(process = %pcb.name, address, "memory access violation, cancelling");
                system.table.cancel(pcb, &address);
                report::log_violation(&system.config.paths, &pcb.name, &address);
                system.free_memory(pcb);
                return true;
            }
        }
    }

    system.table.finish_detached(pcb);
    system.free_memory(pcb);
    true
}
