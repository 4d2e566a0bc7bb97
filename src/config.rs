//! Emulator configuration: `config.txt` parsing and output-file locations.
//!
//! The file format is whitespace-separated `key value` pairs in any order.
//! Unknown keys are skipped; an unparsable value keeps the field's default
//! and warns. These are operator errors, never fatal ones.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::warn;

/// Worker scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    Fcfs,
    RoundRobin,
}

impl SchedPolicy {
    /// Parse a config value: bare or double-quoted, case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw.trim().trim_matches('"');
        if name.eq_ignore_ascii_case("fcfs") {
            Some(SchedPolicy::Fcfs)
        } else if name.eq_ignore_ascii_case("rr") {
            Some(SchedPolicy::RoundRobin)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SchedPolicy::Fcfs => "First-Come-First-Served (FCFS)",
            SchedPolicy::RoundRobin => "Round Robin (RR)",
        }
    }
}

/// Locations of everything the emulator persists.
///
/// Defaults match the historical filenames consumers expect; tests reroot
/// them under a scratch directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Appended system reports (`report-util`).
    pub report_log: PathBuf,
    /// Demand-paging backing store.
    pub backing_store: PathBuf,
    /// One line per memory-violation cancellation.
    pub violation_log: PathBuf,
    /// Legacy violation log consumed by older tooling.
    pub compat_log: PathBuf,
    /// Directory for round-robin memory snapshots.
    pub snapshot_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            report_log: PathBuf::from("csopesy-log.txt"),
            backing_store: PathBuf::from("csopesy-backing-store.txt"),
            violation_log: PathBuf::from("memory-violation-log.txt"),
            compat_log: PathBuf::from("log.txt"),
            snapshot_dir: PathBuf::from("memory_snapshots"),
        }
    }
}

impl Paths {
    /// All files under one directory. Used by tests to keep runs isolated.
    pub fn rooted(dir: &Path) -> Self {
        Paths {
            report_log: dir.join("csopesy-log.txt"),
            backing_store: dir.join("csopesy-backing-store.txt"),
            violation_log: dir.join("memory-violation-log.txt"),
            compat_log: dir.join("log.txt"),
            snapshot_dir: dir.join("memory_snapshots"),
        }
    }
}

/// Full emulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads (cores).
    pub num_cpu: usize,
    pub scheduler: SchedPolicy,
    /// Round-robin time slice, in instructions.
    pub quantum_cycles: u32,
    /// Processes the generator creates per batch. 0 disables the generator.
    pub batch_process_freq: u32,
    /// Instruction-count range for generated processes.
    pub min_ins: u32,
    pub max_ins: u32,
    /// Ticks between instructions. 0 executes on every pass.
    pub delay_per_exec: u32,
    /// Total physical memory, bytes.
    pub max_overall_mem: usize,
    /// Paging frame size, bytes. Equal to `max_overall_mem` selects the
    /// contiguous first-fit manager instead of paging.
    pub mem_per_frame: usize,
    /// Memory-requirement range for generated processes.
    pub min_mem_per_proc: usize,
    pub max_mem_per_proc: usize,
    /// Opt-in opcodes for instruction synthesis.
    pub enable_sleep: bool,
    pub enable_for: bool,
    /// Wall-clock milliseconds per tick. Shortened by tests.
    pub tick_ms: u64,
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_cpu: 4,
            scheduler: SchedPolicy::Fcfs,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_ins: 1000,
            max_ins: 2000,
            delay_per_exec: 4,
            max_overall_mem: 16384,
            mem_per_frame: 64,
            min_mem_per_proc: 64,
            max_mem_per_proc: 4096,
            enable_sleep: false,
            enable_for: false,
            tick_ms: crate::clock::TICK_DURATION_MS,
            paths: Paths::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Parse config text, falling back to defaults field by field.
    pub fn parse(text: &str) -> Self {
        let mut cfg = Config::default();
        let mut tokens = text.split_whitespace();
        while let Some(key) = tokens.next() {
            let Some(value) = tokens.next() else {
                warn!(key, "config key has no value, ignoring");
                break;
            };
            cfg.apply(key, value);
        }
        cfg.validate();
        cfg
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "num-cpu" => self.num_cpu = field(key, value, self.num_cpu),
            "scheduler" => match SchedPolicy::parse(value) {
                Some(policy) => self.scheduler = policy,
                None => {
                    warn!(value, "unknown scheduler type, defaulting to FCFS");
                    self.scheduler = SchedPolicy::Fcfs;
                }
            },
            "quantum-cycles" => self.quantum_cycles = field(key, value, self.quantum_cycles),
            "batch-process-freq" => {
                self.batch_process_freq = field(key, value, self.batch_process_freq)
            }
            "min-ins" => self.min_ins = field(key, value, self.min_ins),
            "max-ins" => self.max_ins = field(key, value, self.max_ins),
            "delay-per-exec" => self.delay_per_exec = field(key, value, self.delay_per_exec),
            "max-overall-mem" => self.max_overall_mem = field(key, value, self.max_overall_mem),
            "mem-per-frame" => self.mem_per_frame = field(key, value, self.mem_per_frame),
            "min-mem-per-proc" => self.min_mem_per_proc = field(key, value, self.min_mem_per_proc),
            "max-mem-per-proc" => self.max_mem_per_proc = field(key, value, self.max_mem_per_proc),
            _ => {} // unknown keys are skipped
        }
    }

    /// Clamp inconsistent fields back into their documented ranges.
    fn validate(&mut self) {
        if self.num_cpu == 0 {
            warn!("num-cpu must be at least 1, using 1");
            self.num_cpu = 1;
        }
        if self.quantum_cycles == 0 {
            warn!("quantum-cycles must be positive, using 1");
            self.quantum_cycles = 1;
        }
        if self.min_ins > self.max_ins {
            warn!(
                min = self.min_ins,
                max = self.max_ins,
                "min-ins exceeds max-ins, swapping"
            );
            std::mem::swap(&mut self.min_ins, &mut self.max_ins);
        }
        if self.max_overall_mem == 0 {
            warn!("max-overall-mem must be positive, using default");
            self.max_overall_mem = Config::default().max_overall_mem;
        }
        if self.mem_per_frame == 0 || self.max_overall_mem % self.mem_per_frame != 0 {
            warn!(
                mem_per_frame = self.mem_per_frame,
                max_overall_mem = self.max_overall_mem,
                "mem-per-frame must divide max-overall-mem, using contiguous allocation"
            );
            self.mem_per_frame = self.max_overall_mem;
        }
        if self.min_mem_per_proc > self.max_mem_per_proc {
            warn!("min-mem-per-proc exceeds max-mem-per-proc, swapping");
            std::mem::swap(&mut self.min_mem_per_proc, &mut self.max_mem_per_proc);
        }
    }

    /// Demand paging is active when frames are smaller than physical memory.
    pub fn paging_enabled(&self) -> bool {
        self.mem_per_frame < self.max_overall_mem
    }

    pub fn total_frames(&self) -> usize {
        self.max_overall_mem / self.mem_per_frame
    }

    /// One-screen summary printed after `initialize`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("[CONFIG VALUES LOADED]\n");
        out.push_str(&format!("num-cpu: {}\n", self.num_cpu));
        out.push_str(&format!("scheduler: {}\n", self.scheduler.label()));
        out.push_str(&format!("quantum-cycles: {}\n", self.quantum_cycles));
        out.push_str(&format!(
            "batch-process-freq: {}\n",
            self.batch_process_freq
        ));
        out.push_str(&format!("min-ins: {}\n", self.min_ins));
        out.push_str(&format!("max-ins: {}\n", self.max_ins));
        out.push_str(&format!("delay-per-exec: {} ticks\n", self.delay_per_exec));
        out.push_str(&format!("max-overall-mem: {} bytes\n", self.max_overall_mem));
        out.push_str(&format!("mem-per-frame: {} bytes\n", self.mem_per_frame));
        out.push_str(&format!(
            "memory mode: {}\n",
            if self.paging_enabled() {
                "demand paging"
            } else {
                "contiguous first-fit"
            }
        ));
        out.push_str(&format!("[System Info] Tick Duration: {} ms\n", self.tick_ms));
        out
    }
}

fn field<T>(key: &str, value: &str, default: T) -> T
where
    T: FromStr + Copy,
    <T as FromStr>::Err: Display,
{
    match value.parse() {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(key, value, %err, "unparsable config value, keeping default");
            default
        }
    }
}
