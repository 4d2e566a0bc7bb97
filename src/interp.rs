//! The instruction interpreter.
//!
//! Eight case-sensitive opcodes over 16-bit unsigned values: DECLARE, ADD,
//! SUBTRACT, READ, WRITE, PRINT, SLEEP, FOR. Arithmetic saturates (ADD at
//! 65535, SUBTRACT at 0) as a contract, not an error; the only fault an
//! instruction can raise is a memory access violation, which the worker
//! turns into a cancellation. Malformed operands read as zero and malformed
//! instructions are ignored, matching how the emulator treats operator
//! input everywhere else.

use std::fmt;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::memory::MemError;
use crate::process::{Pcb, SymbolTable};
use crate::system::System;

/// FOR loops deeper than this are skipped with a diagnostic.
pub const MAX_FOR_DEPTH: u32 = 3;
/// FOR repeat counts clamp into `[0, MAX_FOR_REPEATS]`.
pub const MAX_FOR_REPEATS: i64 = 100;

/// Why an instruction failed. The worker matches on this and takes the
/// cancellation path; nothing propagates further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// READ/WRITE hit an invalid virtual address (or paging declared the
    /// reference unresolvable). Carries the literal as written.
    MemoryViolation { address: String },
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::MemoryViolation { address } => {
                write!(f, "memory access violation at {address}")
            }
        }
    }
}

impl std::error::Error for ExecError {}

pub type ExecResult = Result<(), ExecError>;

/// Execute a single instruction against a process.
pub fn execute(system: &System, pcb: &Pcb, instruction: &str) -> ExecResult {
    run_one(system, pcb, instruction, 0)
}

fn run_list(system: &System, pcb: &Pcb, instructions: &[String], depth: u32) -> ExecResult {
    for instruction in instructions {
        if system.stop_requested() {
            break;
        }
        run_one(system, pcb, instruction, depth)?;
    }
    Ok(())
}

fn run_one(system: &System, pcb: &Pcb, instruction: &str, depth: u32) -> ExecResult {
    let trimmed = instruction.trim();
    let (op, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((op, rest)) => (op, rest.trim_start()),
        None => (trimmed, ""),
    };

    match op {
        "DECLARE" => {
            let mut args = rest.split_whitespace();
            if let (Some(var), Some(value)) = (args.next(), args.next()) {
                let value = value.parse::<u16>().unwrap_or(0);
                pcb.symbols.lock().unwrap().set(var, value);
            }
            Ok(())
        }
        "ADD" => {
            let mut args = rest.split_whitespace();
            if let (Some(dest), Some(a), Some(b)) = (args.next(), args.next(), args.next()) {
                let mut symbols = pcb.symbols.lock().unwrap();
                let sum = u32::from(value_of(&symbols, a)) + u32::from(value_of(&symbols, b));
                symbols.set(dest, sum.min(u32::from(u16::MAX)) as u16);
            }
            Ok(())
        }
        "SUBTRACT" => {
            let mut args = rest.split_whitespace();
            if let (Some(dest), Some(a), Some(b)) = (args.next(), args.next(), args.next()) {
                let mut symbols = pcb.symbols.lock().unwrap();
                let diff = value_of(&symbols, a).saturating_sub(value_of(&symbols, b));
                symbols.set(dest, diff);
            }
            Ok(())
        }
        "READ" => {
            let mut args = rest.split_whitespace();
            if let (Some(var), Some(literal)) = (args.next(), args.next()) {
                let addr = parse_hex(literal)
                    .ok_or_else(|| violation(literal))?;
                let value = touch_memory(system, pcb, literal, |memory, running| {
                    memory.read_word(pcb, addr, running, &system.stats)
                })?;
                pcb.symbols.lock().unwrap().set(var, value);
            }
            Ok(())
        }
        "WRITE" => {
            let mut args = rest.split_whitespace();
            if let (Some(literal), Some(operand)) = (args.next(), args.next()) {
                let addr = parse_hex(literal)
                    .ok_or_else(|| violation(literal))?;
                let value = {
                    let symbols = pcb.symbols.lock().unwrap();
                    value_of(&symbols, operand)
                };
                touch_memory(system, pcb, literal, |memory, running| {
                    memory.write_word(pcb, addr, value, running, &system.stats)
                })?;
            }
            Ok(())
        }
        "PRINT" => {
            let mut text = rest.trim();
            if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
                text = &text[1..text.len() - 1];
            }
            let line = if text.is_empty() {
                format!("Hello world from {}!", pcb.name)
            } else {
                let symbols = pcb.symbols.lock().unwrap();
                substitute_symbols(text, &symbols)
            };
            pcb.append_log(line);
            Ok(())
        }
        "SLEEP" => {
            if let Some(ticks) = rest.split_whitespace().next() {
                if let Ok(ticks) = ticks.parse::<u8>() {
                    if ticks > 0 {
                        // No scheduler lock is held here.
                        let ms = u64::from(system.config.delay_per_exec) * u64::from(ticks);
                        thread::sleep(Duration::from_millis(ms));
                    }
                }
            }
            Ok(())
        }
        "FOR" => {
            if depth >= MAX_FOR_DEPTH {
                warn!(process = %pcb.name, depth, "FOR nesting limit reached, skipping");
                return Ok(());
            }
            let (body, count) = match rest.rsplit_once(char::is_whitespace) {
                Some((body, count)) => (body, count),
                None => ("", rest),
            };
            let repeats = count
                .parse::<i64>()
                .unwrap_or(0)
                .clamp(0, MAX_FOR_REPEATS);
            let body: Vec<String> = body
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect();
            for _ in 0..repeats {
                if system.stop_requested() {
                    break;
                }
                run_list(system, pcb, &body, depth + 1)?;
            }
            Ok(())
        }
        _ => {
            debug!(process = %pcb.name, op, "ignoring unknown instruction");
            Ok(())
        }
    }
}

/// Symbol lookup, else decimal literal, else 0.
fn value_of(symbols: &SymbolTable, operand: &str) -> u16 {
    symbols
        .get(operand)
        .unwrap_or_else(|| operand.parse().unwrap_or(0))
}

/// `0x`/`0X`-prefixed hex byte address.
fn parse_hex(literal: &str) -> Option<usize> {
    let digits = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))?;
    usize::from_str_radix(digits, 16).ok()
}

fn violation(literal: &str) -> ExecError {
    ExecError::MemoryViolation {
        address: literal.to_string(),
    }
}

/// Run a memory access with the running-set snapshot the paging manager's
/// liveness guard needs. The run-lists lock is released before the memory
/// lock is taken, respecting the lock order.
fn touch_memory<T>(
    system: &System,
    pcb: &Pcb,
    literal: &str,
    access: impl FnOnce(&mut crate::memory::MemoryManager, &[String]) -> Result<T, MemError>,
) -> Result<T, ExecError> {
    let running = system.table.running_names();
    let result = {
        let mut memory = system.memory.lock().unwrap();
        access(&mut memory, &running)
    };
    result.map_err(|err| {
        if err == MemError::Deadlock {
            warn!(
                process = %pcb.name,
                address = literal,
                "page replacement deadlock, escalating to memory violation"
            );
        }
        violation(literal)
    })
}

/// Replace every whole-token occurrence of each known symbol with its
/// decimal value. A token boundary is any character that is not
/// alphanumeric or `_`.
pub fn substitute_symbols(text: &str, symbols: &SymbolTable) -> String {
    let mut output = text.to_string();
    for (name, value) in symbols.iter() {
        let value = value.to_string();
        let mut pos = 0;
        while let Some(found) = output[pos..].find(name.as_str()) {
            let at = pos + found;
            let end = at + name.len();
            let bytes = output.as_bytes();
            let before_ok = at == 0 || !is_word_byte(bytes[at - 1]);
            let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
            if before_ok && after_ok {
                output.replace_range(at..end, &value);
                pos = at + value.len();
            } else {
                pos = end;
            }
        }
    }
    output
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Whether a line starts with a recognized opcode. Used to vet
/// operator-supplied instruction scripts before accepting them.
pub fn is_known_opcode(instruction: &str) -> bool {
    let op = instruction.trim().split_whitespace().next().unwrap_or("");
    matches!(
        op,
        "DECLARE" | "ADD" | "SUBTRACT" | "READ" | "WRITE" | "PRINT" | "SLEEP" | "FOR"
    )
}

/// Synthesize one instruction from the enabled opcode set.
pub fn generate_instruction(process_name: &str, enable_sleep: bool, enable_for: bool) -> String {
    let mut rng = rand::thread_rng();
    let mut kinds = vec![0, 1, 2, 3, 4];
    if enable_sleep {
        kinds.push(5);
    }
    if enable_for {
        kinds.push(6);
    }
    match kinds[rng.gen_range(0..kinds.len())] {
        0 => format!(
            "DECLARE {} {}",
            random_var(&mut rng),
            rng.gen_range(0..=u16::MAX)
        ),
        1 => format!(
            "ADD {} {} {}",
            random_var(&mut rng),
            random_operand(&mut rng),
            random_operand(&mut rng)
        ),
        2 => format!(
            "SUBTRACT {} {} {}",
            random_var(&mut rng),
            random_operand(&mut rng),
            random_operand(&mut rng)
        ),
        3 => {
            let var = random_var(&mut rng);
            format!("PRINT \"Value of {var} is {var}\"")
        }
        4 => format!("PRINT \"Hello world from {process_name}!\""),
        5 => format!("SLEEP {}", rng.gen_range(0..=u8::MAX)),
        _ => format!("FOR {}", rng.gen_range(1..=5)),
    }
}

fn random_var(rng: &mut impl Rng) -> &'static str {
    ["var1", "var2", "var3"][rng.gen_range(0..3)]
}

fn random_operand(rng: &mut impl Rng) -> String {
    if rng.gen_bool(0.5) {
        random_var(rng).to_string()
    } else {
        rng.gen_range(0..=u16::MAX).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::system::System;
    use crate::types::Pid;
    use std::sync::Arc;

    fn contiguous_system() -> Arc<System> {
        let cfg = Config {
            num_cpu: 1,
            delay_per_exec: 0,
            max_overall_mem: 1024,
            mem_per_frame: 1024, // contiguous mode
            min_mem_per_proc: 64,
            max_mem_per_proc: 64,
            ..Config::default()
        };
        System::new(cfg)
    }

    fn process(system: &System, name: &str, mem: usize) -> Pcb {
        let pcb = Pcb::new(Pid(1), name.into(), 100, mem, None);
        assert!(system.ensure_allocated(&pcb));
        pcb
    }

    fn run(system: &System, pcb: &Pcb, script: &[&str]) -> ExecResult {
        for line in script {
            execute(system, pcb, line)?;
        }
        Ok(())
    }

    #[test]
    fn add_saturates_at_u16_max() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        run(
            &system,
            &pcb,
            &["DECLARE a 65000", "ADD a a 1000", "PRINT \"a=a\""],
        )
        .unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "a=65535");
    }

    #[test]
    fn subtract_floors_at_zero() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        run(
            &system,
            &pcb,
            &["DECLARE b 5", "SUBTRACT b b 10", "PRINT \"b=b\""],
        )
        .unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "b=0");
    }

    #[test]
    fn unparsable_declare_value_reads_as_zero() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        run(&system, &pcb, &["DECLARE a banana", "PRINT \"a=a\""]).unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "a=0");
    }

    #[test]
    fn write_then_read_round_trips() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 128);
        run(
            &system,
            &pcb,
            &["WRITE 0x0010 42", "READ x 0x0010", "PRINT \"x=x\""],
        )
        .unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "x=42");
    }

    #[test]
    fn out_of_span_write_raises_violation_with_literal() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        let err = execute(&system, &pcb, "WRITE 0x1000 7").unwrap_err();
        assert_eq!(
            err,
            ExecError::MemoryViolation {
                address: "0x1000".into()
            }
        );
    }

    #[test]
    fn non_hex_address_is_a_violation() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        let err = execute(&system, &pcb, "READ x 16").unwrap_err();
        assert_eq!(err, ExecError::MemoryViolation { address: "16".into() });
    }

    #[test]
    fn print_defaults_to_hello_world() {
        let system = contiguous_system();
        let pcb = process(&system, "greeter", 64);
        execute(&system, &pcb, "PRINT \"\"").unwrap();
        assert_eq!(
            pcb.logs.lock().unwrap().last().unwrap(),
            "Hello world from greeter!"
        );
    }

    #[test]
    fn print_substitutes_whole_tokens_only() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        run(
            &system,
            &pcb,
            &["DECLARE a 7", "PRINT \"a alpha a_b (a)\""],
        )
        .unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "7 alpha a_b (7)");
    }

    #[test]
    fn for_repeats_its_body() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        run(
            &system,
            &pcb,
            &["DECLARE a 0", "FOR ADD a a 1, ADD a a 1 3", "PRINT \"a=a\""],
        )
        .unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "a=6");
    }

    #[test]
    fn for_count_clamps_to_one_hundred() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        run(
            &system,
            &pcb,
            &["DECLARE a 0", "FOR ADD a a 1 5000", "PRINT \"a=a\""],
        )
        .unwrap();
        assert_eq!(pcb.logs.lock().unwrap().last().unwrap(), "a=100");
    }

    #[test]
    fn fourth_nested_for_is_skipped() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        // Three levels run the innermost body...
        execute(&system, &pcb, "FOR FOR FOR PRINT \"deep\" 1 1 1").unwrap();
        assert_eq!(pcb.logs.lock().unwrap().len(), 1);
        // ...a fourth level is skipped entirely.
        execute(&system, &pcb, "FOR FOR FOR FOR PRINT \"deeper\" 1 1 1 1").unwrap();
        assert_eq!(pcb.logs.lock().unwrap().len(), 1);
    }

    #[test]
    fn symbol_table_overflow_is_silent() {
        let system = contiguous_system();
        let pcb = process(&system, "p", 64);
        for i in 0..40 {
            execute(&system, &pcb, &format!("DECLARE v{i} {i}")).unwrap();
        }
        let symbols = pcb.symbols.lock().unwrap();
        assert_eq!(symbols.len(), crate::process::SYMBOL_TABLE_CAP);
        assert_eq!(symbols.get("v39"), None);
        assert_eq!(symbols.get("v0"), Some(0));
    }

    #[test]
    fn known_opcode_check_accepts_the_full_set() {
        assert!(is_known_opcode("DECLARE x 1"));
        assert!(is_known_opcode("  PRINT \"hi\""));
        assert!(!is_known_opcode("HALT"));
        assert!(!is_known_opcode(""));
    }
}
