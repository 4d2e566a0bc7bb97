//! Batch process generator.
//!
//! While enabled, creates `batch-process-freq` synthetic processes roughly
//! once a second and enqueues them. The global stop flag always wins over
//! the enable gate, and the thread is owned and joined at shutdown rather
//! than detached.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::config::Config;
use crate::process::Pcb;
use crate::system::System;

const BATCH_PERIOD_MS: u64 = 1000;
const POLL_MS: u64 = 50;

pub fn run(system: &Arc<System>, base_name: &str) {
    debug!(base_name, "generator started");
    while system.generating.load(Ordering::Acquire) && !system.stop_requested() {
        spawn_batch(system, base_name);

        let mut slept = 0;
        while slept < BATCH_PERIOD_MS {
            if !system.generating.load(Ordering::Acquire) || system.stop_requested() {
                debug!("generator exiting");
                return;
            }
            thread::sleep(Duration::from_millis(POLL_MS));
            slept += POLL_MS;
        }
    }
    debug!("generator exiting");
}

/// Create one batch of synthetic processes and enqueue them.
pub fn spawn_batch(system: &System, base_name: &str) {
    let cfg = &system.config;
    let mut rng = rand::thread_rng();
    for _ in 0..cfg.batch_process_freq {
        let id = system.table.alloc_id();
        let name = format!("{base_name}{:02}", id.0);
        let instructions = rng.gen_range(cfg.min_ins..=cfg.max_ins) as usize;
        let memory = random_memory_requirement(cfg, &mut rng);
        let pcb = Arc::new(Pcb::new(id, name, instructions, memory, None));
        if system.table.register(pcb.clone()) {
            system.table.enqueue(pcb);
        }
    }
}

/// Random power of two within the configured per-process range, staying
/// inside the [64, 65536] bounds registered processes must satisfy.
fn random_memory_requirement(cfg: &Config, rng: &mut impl Rng) -> usize {
    let candidates: Vec<usize> = (6..=16)
        .map(|exp| 1usize << exp)
        .filter(|size| *size >= cfg.min_mem_per_proc && *size <= cfg.max_mem_per_proc)
        .collect();
    if candidates.is_empty() {
        cfg.min_mem_per_proc
    } else {
        candidates[rng.gen_range(0..candidates.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_batch_enqueues_the_configured_count() {
        let cfg = Config {
            batch_process_freq: 3,
            min_ins: 5,
            max_ins: 5,
            ..Config::default()
        };
        let system = System::new(cfg);
        spawn_batch(&system, "proc");
        assert_eq!(system.table.ready_len(), 3);
        for pcb in system.table.all_processes() {
            assert_eq!(pcb.instructions_total, 5);
            assert!(pcb.memory_requirement.is_power_of_two());
            assert!(pcb.memory_requirement >= 64);
        }
    }

    #[test]
    fn memory_requirements_respect_the_configured_range() {
        let cfg = Config {
            min_mem_per_proc: 128,
            max_mem_per_proc: 512,
            ..Config::default()
        };
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let mem = random_memory_requirement(&cfg, &mut rng);
            assert!((128..=512).contains(&mem));
            assert!(mem.is_power_of_two());
        }
    }
}
