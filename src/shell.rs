//! The interactive operator shell.
//!
//! A thin adapter over the core: it parses commands, hands data to the
//! scheduler and memory subsystems, and prints the reports they return. It
//! never holds a scheduler lock while waiting for input.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tracing::warn;

use crate::config::Config;
use crate::interp;
use crate::process::{Pcb, ProcessState};
use crate::report;
use crate::sched::{self, Runtime};
use crate::system::System;

const BANNER: &str = r#"
 _   _      _
| |_(_) ___| | _____  ___
| __| |/ __| |/ / _ \/ __|
| |_| | (__|   < (_) \__ \
 \__|_|\___|_|\_\___/|___/

     TICKOS CLI EMULATOR
"#;

/// Whether a command loop iteration should continue or exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Shell {
    config_path: PathBuf,
    system: Option<Arc<System>>,
    runtime: Option<Runtime>,
    enable_sleep: bool,
    enable_for: bool,
}

impl Shell {
    pub fn new(config_path: PathBuf) -> Self {
        Shell {
            config_path,
            system: None,
            runtime: None,
            enable_sleep: false,
            enable_for: false,
        }
    }

    /// Read-eval loop over stdin until `exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        println!("{BANNER}");
        print_initial_menu();

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("\n> ");
            io::stdout().flush()?;
            let Some(line) = lines.next() else { break };
            let line = line?;
            if self.dispatch(line.trim()) == Flow::Exit {
                break;
            }
        }
        self.stop_scheduler(false);
        Ok(())
    }

    /// Execute one operator command.
    pub fn dispatch(&mut self, command: &str) -> Flow {
        if command.is_empty() {
            return Flow::Continue;
        }
        if command == "exit" {
            self.stop_scheduler(false);
            println!("Exiting program...");
            return Flow::Exit;
        }

        if self.system.is_none() {
            match command {
                "initialize" => self.initialize(),
                "enable SLEEP" => {
                    self.enable_sleep = true;
                    println!("SLEEP enabled.");
                }
                "enable FOR" => {
                    self.enable_for = true;
                    println!("FOR enabled.");
                }
                _ => println!("Please type 'initialize' to start or 'exit' to quit."),
            }
            return Flow::Continue;
        }

        match command {
            "scheduler-start" => self.start_scheduler(),
            "scheduler-stop" => self.stop_scheduler(true),
            "screen -ls" => self.print_report(false),
            "report-util" => self.print_report(true),
            "process-smi" => {
                let system = self.system.as_ref().expect("initialized");
                print!("{}", report::process_smi(system));
            }
            "vmstat" => {
                let system = self.system.as_ref().expect("initialized");
                print!("{}", report::vmstat(system));
            }
            "clear" | "cls" => {
                print!("\x1b[2J\x1b[1;1H");
                println!("{BANNER}");
                print_menu();
            }
            _ => {
                if let Some(rest) = command.strip_prefix("screen -s ") {
                    self.screen_start(rest);
                } else if let Some(rest) = command.strip_prefix("screen -c ") {
                    self.screen_custom(rest);
                } else if let Some(rest) = command.strip_prefix("screen -r ") {
                    self.screen_resume(rest.trim());
                } else {
                    println!("Unrecognized command. Please try again.");
                }
            }
        }
        Flow::Continue
    }

    fn initialize(&mut self) {
        let mut config = match Config::load(&self.config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(%err, "could not load config, using defaults");
                Config::default()
            }
        };
        config.enable_sleep = self.enable_sleep;
        config.enable_for = self.enable_for;
        let summary = config.summary();
        self.system = Some(System::new(config));
        print_menu();
        print!("{summary}");
    }

    fn start_scheduler(&mut self) {
        if self.runtime.is_some() {
            println!("Scheduler already running.");
            return;
        }
        let system = self.system.as_ref().expect("initialized").clone();
        println!(
            "Starting {} scheduler with {} CPU cores...",
            system.config.scheduler.label(),
            system.config.num_cpu
        );
        self.runtime = Runtime::start(system, Some("process".to_string()));
        if self.runtime.is_none() {
            println!("Scheduler already running.");
        }
    }

    /// Stopping twice has the same effect as stopping once.
    fn stop_scheduler(&mut self, announce: bool) {
        match self.runtime.take() {
            Some(runtime) => {
                runtime.stop();
                if announce {
                    println!("Scheduler and process generation stopped successfully.");
                }
            }
            None => {
                if announce {
                    println!("Scheduler is not running.");
                }
            }
        }
    }

    /// `screen -s <name> <mem>`: register a process with synthesized
    /// instructions.
    fn screen_start(&mut self, rest: &str) {
        let mut parts = rest.split_whitespace();
        let (Some(name), Some(mem)) = (parts.next(), parts.next()) else {
            print_screen_usage();
            return;
        };
        let Ok(mem) = mem.parse::<usize>() else {
            print_screen_usage();
            return;
        };
        if !valid_screen_mem(mem) {
            println!(
                "Invalid memory allocation. Memory must be a power of 2 \
                 between 2^6 (64) and 2^16 (65536) bytes."
            );
            print_screen_usage();
            return;
        }

        let system = self.system.as_ref().expect("initialized");
        if system.table.lookup(name).is_some() {
            println!("Screen session already exists: {name}");
            return;
        }
        let count = {
            let mut rng = rand::thread_rng();
            rng.gen_range(system.config.min_ins..=system.config.max_ins) as usize
        };
        let pcb = Arc::new(Pcb::new(
            system.table.alloc_id(),
            name.to_string(),
            count,
            mem,
            None,
        ));
        system.table.register(pcb.clone());
        system.table.enqueue(pcb);
        println!("New screen session created: {name} with memory size: {mem}");
    }

    /// `screen -c <name> <mem> "i1; i2; …"`: register and run synchronously.
    fn screen_custom(&mut self, rest: &str) {
        let Some((name, mem, instructions)) = parse_custom_args(rest) else {
            println!("Usage: screen -c <process_name> <process_memory_size> \"<instructions>\"");
            return;
        };
        if !valid_screen_mem(mem) {
            println!(
                "Invalid memory allocation. Memory must be a power of 2 \
                 between 2^6 (64) and 2^16 (65536) bytes."
            );
            return;
        }
        if instructions.is_empty() || instructions.len() > 50 {
            println!("Invalid command: instruction count must be between 1 and 50.");
            return;
        }
        if let Some(bad) = instructions.iter().find(|i| !interp::is_known_opcode(i)) {
            println!("Invalid command: unrecognized instruction '{bad}'.");
            return;
        }

        let system = self.system.as_ref().expect("initialized");
        if system.table.lookup(&name).is_some() {
            println!("Screen session already exists: {name}");
            return;
        }
        let total = instructions.len();
        let pcb = Arc::new(Pcb::new(
            system.table.alloc_id(),
            name.clone(),
            total,
            mem,
            Some(instructions),
        ));
        system.table.register(pcb.clone());

        if !sched::run_inline(system, &pcb) {
            println!("Could not run {name}: memory allocation refused.");
            return;
        }
        match pcb.state() {
            ProcessState::Cancelled => {
                let record = system.table.cancel_record(&name);
                match record {
                    Some(record) => println!(
                        "{}",
                        report::violation_sentence(&name, &record.time_of_day, &record.address)
                    ),
                    None => println!("Process {name} was cancelled."),
                }
            }
            _ => println!("Process {name} finished {total} / {total} instructions."),
        }
    }

    /// `screen -r <name>`: inspect a process; cancelled processes report
    /// their violation.
    fn screen_resume(&self, name: &str) {
        if name.is_empty() {
            println!("Please provide a name to resume a screen session.");
            return;
        }
        let system = self.system.as_ref().expect("initialized");
        if system.table.lookup(name).is_none() {
            println!("Process {name} not found.");
            return;
        }
        if let Some(record) = system.table.cancel_record(name) {
            println!(
                "{}",
                report::violation_sentence(name, &record.time_of_day, &record.address)
            );
            return;
        }
        if let Some(panel) = report::process_panel(system, name) {
            print!("{panel}");
        }
    }

    fn print_report(&self, persist: bool) {
        let system = self.system.as_ref().expect("initialized");
        let report = report::system_report(system);
        print!("{report}");
        if persist {
            match report::write_report_log(system, &report) {
                Ok(()) => println!("Report saved to {}", system.config.paths.report_log.display()),
                Err(err) => {
                    warn!(%err, "report append failed");
                    println!("Failed to save report to file.");
                }
            }
        }
    }
}

/// Power of 2 in [64, 65536].
fn valid_screen_mem(mem: usize) -> bool {
    (64..=65536).contains(&mem) && mem.is_power_of_two()
}

/// Split `<name> <mem> "i1; i2"` into its parts.
fn parse_custom_args(rest: &str) -> Option<(String, usize, Vec<String>)> {
    let open = rest.find('"')?;
    let head = rest[..open].trim();
    let script = rest[open..].trim();
    let script = script.strip_prefix('"')?.strip_suffix('"')?;

    let mut parts = head.split_whitespace();
    let name = parts.next()?.to_string();
    let mem = parts.next()?.parse().ok()?;

    let instructions = script
        .split(';')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();
    Some((name, mem, instructions))
}

fn print_initial_menu() {
    println!("1. initialize");
    println!("2. exit");
    println!("3. enable SLEEP");
    println!("4. enable FOR");
}

fn print_menu() {
    println!("==== MAIN MENU ====");
    println!("Available Commands:");
    println!("1. scheduler-start / scheduler-stop");
    println!("2. screen -s <name> <process_memory_size>");
    println!("3. screen -c <name> <process_memory_size> \"<instructions>\"");
    println!("4. screen -r <name>");
    println!("5. screen -ls / report-util");
    println!("6. process-smi / vmstat");
    println!("7. clear / cls");
    println!("8. exit");
}

fn print_screen_usage() {
    println!("Usage: screen -s <process_name> <process_memory_size>");
}
