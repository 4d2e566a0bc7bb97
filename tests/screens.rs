//! Synchronous screen runs (`screen -c` semantics) and the reports built
//! around them.

use std::sync::Arc;

use tickos::{report, sched, Pcb, ProcessState, System};

mod common;

fn custom_process(system: &System, name: &str, mem: usize, script: &[&str]) -> Arc<Pcb> {
    let pcb = Arc::new(Pcb::new(
        system.table.alloc_id(),
        name.into(),
        script.len(),
        mem,
        Some(script.iter().map(|s| s.to_string()).collect()),
    ));
    assert!(system.table.register(pcb.clone()));
    pcb
}

#[test]
fn inline_run_round_trips_memory_through_print() {
    common::setup();
    let system = System::new(common::fast_config("inline-rt"));
    let pcb = custom_process(
        &system,
        "rt",
        128,
        &["WRITE 0x0010 42", "READ x 0x0010", "PRINT \"x=x\""],
    );

    assert!(sched::run_inline(&system, &pcb));
    assert_eq!(pcb.state(), ProcessState::Finished);
    assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "x=42");
    assert_eq!(pcb.executed(), 3);

    // The finished list picked it up and its memory was released.
    let finished = system.table.finished_snapshot();
    assert!(finished.iter().any(|p| p.name == "rt"));
    assert_eq!(system.memory.lock().unwrap().proc_count(), 0);
}

#[test]
fn inline_violation_produces_the_resume_sentence() {
    common::setup();
    let system = System::new(common::fast_config("inline-violation"));
    let pcb = custom_process(&system, "cv", 64, &["WRITE 0x1000 7"]);

    assert!(sched::run_inline(&system, &pcb));
    assert_eq!(pcb.state(), ProcessState::Cancelled);

    let record = system.table.cancel_record("cv").expect("cancel record");
    let sentence = report::violation_sentence("cv", &record.time_of_day, &record.address);
    assert!(sentence.starts_with(
        "Process cv shut down due to memory access violation error that occurred at "
    ));
    assert!(sentence.ends_with(". 0x1000 invalid."));
}

#[test]
fn subtract_floor_shows_in_the_logs() {
    common::setup();
    let system = System::new(common::fast_config("floor"));
    let pcb = custom_process(
        &system,
        "floor",
        64,
        &["DECLARE b 5", "SUBTRACT b b 10", "PRINT \"b=b\""],
    );
    assert!(sched::run_inline(&system, &pcb));
    assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "b=0");
}

#[test]
fn system_report_shows_cancelled_processes() {
    common::setup();
    let system = System::new(common::fast_config("report-cancelled"));
    let pcb = custom_process(&system, "doomed", 64, &["READ x 0xFFFF"]);
    assert!(sched::run_inline(&system, &pcb));

    let report = report::system_report(&system);
    assert!(report.contains("==== CANCELLED PROCESSES ===="));
    assert!(report.contains("doomed"));
    assert!(report.contains("0xFFFF invalid"));
}

#[test]
fn process_smi_summarises_memory_and_logs() {
    common::setup();
    let system = System::new(common::fast_config("smi"));
    let pcb = custom_process(&system, "chatty", 64, &["PRINT \"\"", "PRINT \"\""]);
    assert!(sched::run_inline(&system, &pcb));

    let smi = report::process_smi(&system);
    assert!(smi.contains("Name: chatty"));
    assert!(smi.contains("State: FINISHED"));
    assert!(smi.contains("Hello world from chatty!"));
    assert!(smi.contains("Memory: 64 bytes"));
}

#[test]
fn vmstat_counts_paging_traffic_from_inline_runs() {
    common::setup();
    let system = System::new(common::fast_config("vmstat"));
    let pcb = custom_process(&system, "pager", 64, &["WRITE 0x0 9", "READ x 0x0"]);
    assert!(sched::run_inline(&system, &pcb));

    let stats = report::vmstat(&system);
    assert!(stats.contains("Total memory: 1 KB"));
    assert!(stats.contains("Num paged in: 1"));
}
