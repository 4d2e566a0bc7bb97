//! Reporters: `screen -ls`, `process-smi`, `vmstat`, memory snapshots, and
//! the persisted log files.
//!
//! Every report is built as a string under short locks and written (or
//! printed) only after the locks are released.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::warn;

use crate::config::{Paths, SchedPolicy};
use crate::process::ProcessState;
use crate::system::System;
use crate::types::CoreId;

/// `(MM/DD/YYYY, HH:MM:SS AM/PM)` — the display form used everywhere.
pub fn format_created(created: &DateTime<Local>) -> String {
    created.format("(%m/%d/%Y, %I:%M:%S %p)").to_string()
}

/// High-resolution variant with milliseconds.
pub fn stamp_millis() -> String {
    Local::now().format("%m/%d/%Y %I:%M:%S%.3f%p").to_string()
}

/// The sentence `screen -r` prints for a cancelled process.
pub fn violation_sentence(name: &str, time_of_day: &str, address: &str) -> String {
    format!(
        "Process {name} shut down due to memory access violation error \
         that occurred at {time_of_day}. {address} invalid."
    )
}

/// The `screen -ls` / `report-util` system report.
pub fn system_report(system: &System) -> String {
    let cfg = &system.config;
    let running = system.table.running_snapshot();
    let finished = system.table.finished_snapshot();
    let cancelled = system.table.cancelled_snapshot();
    let ready_depth = system.table.ready_len();
    let used_cores = running.iter().flatten().count();
    let utilization = (used_cores as f64 / cfg.num_cpu as f64) * 100.0;
    let is_rr = cfg.scheduler == SchedPolicy::RoundRobin;

    let mut out = String::new();
    out.push_str("==== CPU UTILIZATION REPORT ====\n");
    let _ = writeln!(out, "CPU Utilization: {utilization:.1}%");
    let _ = writeln!(out, "Current CPU Tick: {}", system.clock.now());
    let _ = writeln!(out, "Cores Used: {used_cores}");
    let _ = writeln!(out, "Cores available: {}", cfg.num_cpu - used_cores);
    if is_rr {
        let _ = writeln!(
            out,
            "Scheduler: {} [Quantum: {} cycles]",
            cfg.scheduler.label(),
            cfg.quantum_cycles
        );
    } else {
        let _ = writeln!(out, "Scheduler: {}", cfg.scheduler.label());
    }
    let _ = writeln!(out, "Processes in Ready Queue: {ready_depth}");

    out.push_str("\n==== RUNNING PROCESSES ====\n");
    let mut any_running = false;
    for pcb in running.iter().flatten() {
        let _ = write!(
            out,
            "{}\t{}\tCore: {}\t{} / {}",
            pcb.name,
            format_created(&pcb.created_at),
            pcb.core_id().map(|core| core.0 as i64).unwrap_or(-1),
            pcb.executed(),
            pcb.instructions_total
        );
        if is_rr {
            let _ = write!(out, "\tQuantum Left: {}", pcb.quantum_left());
        }
        out.push('\n');
        any_running = true;
    }
    if !any_running {
        out.push_str("No running processes\n");
    }

    out.push_str("\n==== FINISHED PROCESSES ====\n");
    if finished.is_empty() {
        out.push_str("No finished processes\n");
    }
    for pcb in &finished {
        let _ = writeln!(
            out,
            "{}\t{}\tFinished\t{} / {}",
            pcb.name,
            format_created(&pcb.created_at),
            pcb.executed(),
            pcb.instructions_total
        );
    }

    if !cancelled.is_empty() {
        out.push_str("\n==== CANCELLED PROCESSES ====\n");
        for record in &cancelled {
            let _ = writeln!(
                out,
                "{}\t{}\tCancelled\t{} invalid",
                record.pcb.name,
                format_created(&record.cancelled_at),
                record.address
            );
        }
    }
    out
}

/// Per-process panels plus a CPU/memory summary.
pub fn process_smi(system: &System) -> String {
    let cfg = &system.config;
    let used_cores = system.table.used_cores();
    let utilization = (used_cores as f64 / cfg.num_cpu as f64) * 100.0;
    let (total_mem, used_mem) = {
        let memory = system.memory.lock().unwrap();
        (memory.total_bytes(), memory.used_bytes())
    };

    let mut out = String::new();
    out.push_str("==== PROCESS-SMI ====\n");
    let _ = writeln!(out, "CPU Utilization: {utilization:.1}%");
    let _ = writeln!(out, "Memory Usage: {used_mem} / {total_mem} bytes");
    let _ = writeln!(
        out,
        "Memory Utilization: {:.1}%",
        (used_mem as f64 / total_mem as f64) * 100.0
    );

    for pcb in system.table.all_processes() {
        out.push_str("\n-------------------------\n");
        let _ = writeln!(out, "Name: {}", pcb.name);
        let _ = writeln!(out, "ID: {}", pcb.id.0);
        let _ = writeln!(out, "State: {}", pcb.state().label());
        let _ = writeln!(out, "Created At: {}", format_created(&pcb.created_at));
        let _ = writeln!(
            out,
            "Instructions: {} / {}",
            pcb.executed(),
            pcb.instructions_total
        );
        let _ = writeln!(out, "Memory: {} bytes", pcb.memory_requirement);
        let logs = pcb.logs.lock().unwrap();
        if logs.is_empty() {
            out.push_str("No PRINT logs recorded yet.\n");
        } else {
            out.push_str("Logs:\n");
            for line in logs.iter() {
                let _ = writeln!(out, "  {line}");
            }
        }
    }
    out
}

/// Memory totals, tick accounting, and paging traffic.
pub fn vmstat(system: &System) -> String {
    let (total_mem, used_mem) = {
        let memory = system.memory.lock().unwrap();
        (memory.total_bytes(), memory.used_bytes())
    };
    let stats = &system.stats;

    let mut out = String::new();
    out.push_str("==== VMSTAT ====\n");
    let _ = writeln!(out, "Active processes: {}", system.table.used_cores());
    let _ = writeln!(
        out,
        "Inactive processes: {}",
        system.table.finished_snapshot().len()
    );
    let _ = writeln!(out, "Ready processes: {}\n", system.table.ready_len());
    let _ = writeln!(out, "Total memory: {} KB", total_mem / 1024);
    let _ = writeln!(out, "Used memory: {} KB", used_mem / 1024);
    let _ = writeln!(out, "Free memory: {} KB", (total_mem - used_mem) / 1024);
    let _ = writeln!(out, "Idle cpu ticks: {}", stats.idle_ticks());
    let _ = writeln!(out, "Active cpu ticks: {}", stats.active_ticks());
    let _ = writeln!(out, "Total cpu ticks: {}", stats.total_ticks());
    let _ = writeln!(out, "Num paged in: {}", stats.pages_in());
    let _ = writeln!(out, "Num paged out: {}", stats.pages_out());
    out
}

/// Timestamped memory map in whichever mode is active.
pub fn memory_snapshot(system: &System) -> String {
    let map = system.memory.lock().unwrap().snapshot();
    format!("Timestamp: ({})\n{map}", stamp_millis())
}

/// Append a report to the report log with a timestamp header.
pub fn write_report_log(system: &System, report: &str) -> Result<()> {
    let path = &system.config.paths.report_log;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "=== SYSTEM REPORT SAVED AT {} ===", stamp_millis())?;
    writeln!(file, "{report}")?;
    Ok(())
}

/// Write one round-robin quantum snapshot file.
pub fn write_memory_snapshot(system: &System, core: CoreId, seq: u64) -> Result<()> {
    let dir = &system.config.paths.snapshot_dir;
    let snapshot = memory_snapshot(system);
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("memory_stamp_{}_{seq}.txt", core.0));
    fs::write(&path, snapshot)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Record a memory-violation cancellation in both violation logs.
pub fn log_violation(paths: &Paths, process: &str, address: &str) {
    append_line(
        &paths.violation_log,
        &format!("{} process {process} memory access violation at {address}\n", stamp_millis()),
    );
    append_line(
        &paths.compat_log,
        &format!("process {process} violation error\n"),
    );
}

fn append_line(path: &Path, line: &str) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(err) = result {
        warn!(path = %path.display(), %err, "log append failed");
    }
}

/// Used by `process-smi` when a single process is inspected (`screen -r`).
pub fn process_panel(system: &System, name: &str) -> Option<String> {
    let pcb = system.table.lookup(name)?;
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", pcb.name);
    let _ = writeln!(out, "ID: {}", pcb.id.0);
    let _ = writeln!(out, "State: {}", pcb.state().label());
    let _ = writeln!(out, "Created At: {}", format_created(&pcb.created_at));
    let _ = writeln!(
        out,
        "Instructions: {} / {}",
        pcb.executed(),
        pcb.instructions_total
    );
    if pcb.state() == ProcessState::Finished {
        out.push_str("Status: Finished!\n");
    }
    let logs = pcb.logs.lock().unwrap();
    out.push_str("\n==== LOGS ====\n");
    if logs.is_empty() {
        out.push_str("No PRINT logs recorded yet.\n");
    } else {
        for line in logs.iter() {
            let _ = writeln!(out, "{line}");
        }
    }
    Some(out)
}
