#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tickos::{Config, Paths, SchedPolicy};

/// Initialize tracing from `RUST_LOG`. `try_init()` is idempotent: the
/// first call in the process succeeds, later ones are silently ignored.
pub fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A fresh scratch directory so runs never share persisted state.
pub fn scratch_dir(tag: &str) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let dir = std::env::temp_dir().join(format!(
        "tickos-test-{tag}-{}-{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Single-core FCFS paging config tuned for fast tests: 1 ms ticks and no
/// instruction delay.
pub fn fast_config(tag: &str) -> Config {
    Config {
        num_cpu: 1,
        scheduler: SchedPolicy::Fcfs,
        quantum_cycles: 3,
        batch_process_freq: 0,
        min_ins: 1,
        max_ins: 5,
        delay_per_exec: 0,
        max_overall_mem: 1024,
        mem_per_frame: 64,
        min_mem_per_proc: 64,
        max_mem_per_proc: 64,
        enable_sleep: false,
        enable_for: false,
        tick_ms: 1,
        paths: Paths::rooted(&scratch_dir(tag)),
    }
}

/// Poll until the condition holds or the timeout elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
