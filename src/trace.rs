//! Scheduling event trace.
//!
//! Every dispatch decision, executed instruction, quantum expiry, and
//! terminal transition is recorded with the tick it happened on. Tests
//! assert ordering properties (FIFO completion, round-robin slicing)
//! against the trace instead of scraping logs.

use std::sync::Mutex;

use crate::types::{CoreId, Pid, Tick};

/// Bounded so a long soak cannot grow the trace without limit.
const TRACE_CAP: usize = 65_536;

/// The type of scheduling event recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedEventKind {
    /// A process was bound to a core slot.
    Dispatched { pid: Pid },
    /// A process executed one instruction.
    Executed { pid: Pid },
    /// A round-robin slice ran out and the process was requeued.
    QuantumExpired { pid: Pid },
    /// A process completed all instructions.
    Finished { pid: Pid },
    /// A process was terminated by a memory access violation.
    Cancelled { pid: Pid },
}

/// A single trace event.
#[derive(Debug, Clone)]
pub struct SchedEvent {
    pub tick: Tick,
    pub core: CoreId,
    pub kind: SchedEventKind,
}

/// Append-only event log, shared by dispatcher and workers.
#[derive(Debug, Default)]
pub struct SchedTrace {
    events: Mutex<Vec<SchedEvent>>,
}

impl SchedTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tick: Tick, core: CoreId, kind: SchedEventKind) {
        let mut events = self.events.lock().unwrap();
        if events.len() < TRACE_CAP {
            events.push(SchedEvent { tick, core, kind });
        }
    }

    pub fn events(&self) -> Vec<SchedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Pids of executed instructions, in order. One entry per instruction.
    pub fn execution_order(&self) -> Vec<Pid> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event.kind {
                SchedEventKind::Executed { pid } => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// Pids in completion order.
    pub fn finish_order(&self) -> Vec<Pid> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event.kind {
                SchedEventKind::Finished { pid } => Some(pid),
                _ => None,
            })
            .collect()
    }

    /// How many times a process was bound to a core.
    pub fn dispatch_count(&self, pid: Pid) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event.kind, SchedEventKind::Dispatched { pid: p } if p == pid))
            .count()
    }

    /// Most instructions one process executed between requeues: the count
    /// of its `Executed` events not separated by one of its own
    /// `QuantumExpired`/`Finished`/`Cancelled` events. Interleaved events
    /// from other cores do not reset the count.
    pub fn longest_burst(&self, pid: Pid) -> usize {
        let mut longest = 0;
        let mut current = 0;
        for event in self.events.lock().unwrap().iter() {
            match event.kind {
                SchedEventKind::Executed { pid: p } if p == pid => {
                    current += 1;
                    longest = longest.max(current);
                }
                SchedEventKind::QuantumExpired { pid: p }
                | SchedEventKind::Finished { pid: p }
                | SchedEventKind::Cancelled { pid: p }
                    if p == pid =>
                {
                    current = 0;
                }
                _ => {}
            }
        }
        longest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_order_filters_executed_events() {
        let trace = SchedTrace::new();
        trace.record(1, CoreId(0), SchedEventKind::Dispatched { pid: Pid(1) });
        trace.record(2, CoreId(0), SchedEventKind::Executed { pid: Pid(1) });
        trace.record(3, CoreId(0), SchedEventKind::Executed { pid: Pid(2) });
        trace.record(4, CoreId(0), SchedEventKind::Finished { pid: Pid(1) });
        assert_eq!(trace.execution_order(), vec![Pid(1), Pid(2)]);
        assert_eq!(trace.finish_order(), vec![Pid(1)]);
        assert_eq!(trace.dispatch_count(Pid(1)), 1);
    }

    #[test]
    fn longest_burst_resets_on_the_processes_own_requeue() {
        let trace = SchedTrace::new();
        trace.record(0, CoreId(0), SchedEventKind::Executed { pid: Pid(1) });
        trace.record(0, CoreId(0), SchedEventKind::Executed { pid: Pid(1) });
        trace.record(0, CoreId(1), SchedEventKind::Executed { pid: Pid(2) });
        trace.record(0, CoreId(0), SchedEventKind::Executed { pid: Pid(1) });
        trace.record(0, CoreId(0), SchedEventKind::QuantumExpired { pid: Pid(1) });
        trace.record(0, CoreId(0), SchedEventKind::Executed { pid: Pid(1) });
        // Interleaved pid 2 does not reset pid 1's burst; the expiry does.
        assert_eq!(trace.longest_burst(Pid(1)), 3);
        assert_eq!(trace.longest_burst(Pid(2)), 1);
    }
}
