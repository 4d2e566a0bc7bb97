//! End-to-end scheduler behavior: FIFO completion, round-robin slicing,
//! violation cancellation, and shutdown semantics.

use std::sync::Arc;
use std::time::Duration;

use tickos::{Config, Pcb, ProcessState, Runtime, SchedPolicy, System};

mod common;

const WAIT: Duration = Duration::from_secs(10);

fn script_process(system: &System, name: &str, script: &[&str]) -> Arc<Pcb> {
    let pcb = Arc::new(Pcb::new(
        system.table.alloc_id(),
        name.into(),
        script.len(),
        64,
        Some(script.iter().map(|s| s.to_string()).collect()),
    ));
    assert!(system.table.register(pcb.clone()), "unique name expected");
    pcb
}

fn repeated(instr: &str, count: usize) -> Vec<&str> {
    std::iter::repeat(instr).take(count).collect()
}

#[test]
fn fcfs_single_core_finishes_in_fifo_order() {
    common::setup();
    let system = System::new(common::fast_config("fifo"));

    let a = script_process(&system, "a", &["DECLARE x 1", "ADD x x 1"]);
    let b = script_process(&system, "b", &["DECLARE x 2", "ADD x x 2"]);
    let c = script_process(&system, "c", &["DECLARE x 3", "ADD x x 3"]);
    for pcb in [&a, &b, &c] {
        system.table.enqueue(pcb.clone());
    }

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(
        common::wait_until(WAIT, || [&a, &b, &c]
            .iter()
            .all(|pcb| pcb.state() == ProcessState::Finished)),
        "all processes finish"
    );
    runtime.stop();

    assert_eq!(system.trace.finish_order(), vec![a.id, b.id, c.id]);
}

#[test]
fn round_robin_slices_in_quantum_bursts() {
    common::setup();
    let config = Config {
        scheduler: SchedPolicy::RoundRobin,
        quantum_cycles: 3,
        ..common::fast_config("rr")
    };
    let system = System::new(config);

    let p1 = script_process(&system, "p1", &repeated("DECLARE x 1", 7));
    let p2 = script_process(&system, "p2", &repeated("DECLARE y 2", 3));
    system.table.enqueue(p1.clone());
    system.table.enqueue(p2.clone());

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(
        common::wait_until(WAIT, || {
            p1.state() == ProcessState::Finished && p2.state() == ProcessState::Finished
        }),
        "both processes finish"
    );
    runtime.stop();

    // P1 runs a full slice, P2 finishes inside its first slice, then P1
    // drains: 3 + 3 + 3 + 1.
    let expected = vec![
        p1.id, p1.id, p1.id, p2.id, p2.id, p2.id, p1.id, p1.id, p1.id, p1.id,
    ];
    assert_eq!(system.trace.execution_order(), expected);
    assert!(system.trace.longest_burst(p1.id) <= 3);
    assert_eq!(system.trace.finish_order(), vec![p2.id, p1.id]);
    assert!(system.trace.dispatch_count(p1.id) >= 3);
}

#[test]
fn saturated_arithmetic_survives_the_full_pipeline() {
    common::setup();
    let system = System::new(common::fast_config("sat"));

    let pcb = script_process(
        &system,
        "sat",
        &["DECLARE a 65000", "ADD a a 1000", "PRINT \"a=a\""],
    );
    system.table.enqueue(pcb.clone());

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(common::wait_until(WAIT, || pcb.state() == ProcessState::Finished));
    runtime.stop();

    assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "a=65535");
}

#[test]
fn memory_violation_cancels_the_process_and_logs_it() {
    common::setup();
    let config = common::fast_config("violation");
    let violation_log = config.paths.violation_log.clone();
    let compat_log = config.paths.compat_log.clone();
    let system = System::new(config);

    let victim = script_process(&system, "victim", &["WRITE 0x1000 7", "PRINT \"never\""]);
    let survivor = script_process(&system, "survivor", &["PRINT \"alive\""]);
    system.table.enqueue(victim.clone());
    system.table.enqueue(survivor.clone());

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(
        common::wait_until(WAIT, || {
            victim.state() == ProcessState::Cancelled
                && survivor.state() == ProcessState::Finished
        }),
        "victim cancels, scheduler keeps going"
    );
    runtime.stop();

    assert!(victim.is_done(), "executed is forced to total on cancel");
    assert!(victim.logs.lock().unwrap().is_empty(), "PRINT never ran");

    let record = system.table.cancel_record("victim").expect("cancel record");
    assert_eq!(record.address, "0x1000");

    let log = std::fs::read_to_string(&violation_log).expect("violation log written");
    assert!(log.contains("victim"));
    assert!(log.contains("0x1000"));
    let compat = std::fs::read_to_string(&compat_log).expect("compat log written");
    assert!(compat.contains("process victim violation error"));
}

#[test]
fn double_start_is_rejected_and_stop_is_idempotent() {
    common::setup();
    let system = System::new(common::fast_config("lifecycle"));

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(
        Runtime::start(system.clone(), None).is_none(),
        "second start is rejected while running"
    );
    runtime.stop();

    // Stop left the system re-armed: stats zeroed, queues empty, and a new
    // start succeeds.
    assert_eq!(system.stats.total_ticks(), 0);
    assert_eq!(system.table.ready_len(), 0);
    let runtime = Runtime::start(system.clone(), None).expect("restart after stop");
    runtime.stop();
}

#[test]
fn stop_clears_queues_and_frees_leftover_memory() {
    common::setup();
    let config = Config {
        // One instruction per 5 ticks keeps processes mid-flight at stop.
        delay_per_exec: 5,
        ..common::fast_config("stop")
    };
    let system = System::new(config);

    let slow = script_process(&system, "slow", &repeated("DECLARE x 1", 500));
    system.table.enqueue(slow.clone());
    for i in 0..3 {
        let pcb = script_process(&system, &format!("queued{i}"), &["PRINT \"q\""]);
        system.table.enqueue(pcb);
    }

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(
        common::wait_until(WAIT, || slow.state() == ProcessState::Running),
        "slow process gets dispatched"
    );
    runtime.stop();

    assert_eq!(system.table.ready_len(), 0);
    assert_eq!(system.table.used_cores(), 0);
    let memory = system.memory.lock().unwrap();
    assert_eq!(memory.proc_count(), 0, "still-running memory was freed");
    assert_eq!(memory.used_bytes(), 0);
}

#[test]
fn multi_core_stress_accounts_for_every_instruction() {
    common::setup();
    let config = Config {
        num_cpu: 4,
        scheduler: SchedPolicy::RoundRobin,
        quantum_cycles: 2,
        max_overall_mem: 4096,
        mem_per_frame: 64,
        ..common::fast_config("stress")
    };
    let system = System::new(config);

    let script = repeated("ADD x x 1", 10);
    let processes: Vec<_> = (0..20)
        .map(|i| {
            let pcb = script_process(&system, &format!("job{i:02}"), &script);
            system.table.enqueue(pcb.clone());
            pcb
        })
        .collect();

    let runtime = Runtime::start(system.clone(), None).expect("fresh start");
    assert!(
        common::wait_until(WAIT, || processes
            .iter()
            .all(|pcb| pcb.state() == ProcessState::Finished)),
        "every process finishes"
    );

    assert_eq!(system.trace.execution_order().len(), 20 * 10);
    for pcb in &processes {
        assert!(
            system.trace.longest_burst(pcb.id) <= 2,
            "no process exceeds its quantum between requeues"
        );
        assert_eq!(pcb.executed(), 10);
    }
    {
        let memory = system.memory.lock().unwrap();
        assert_eq!(memory.proc_count(), 0, "finished processes freed memory");
        assert_eq!(memory.used_bytes(), 0);
    }
    runtime.stop();
}
