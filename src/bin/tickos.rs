//! tickos — interactive multi-core OS emulator shell.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use tickos::shell::Shell;

/// Tick-driven OS emulator: FCFS/RR scheduling over synthetic processes
/// with contiguous or demand-paged memory.
#[derive(Parser)]
#[command(name = "tickos")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.txt")]
    config: PathBuf,

    /// Append tracing output to this file instead of stderr.
    #[arg(short, long, value_name = "PATH")]
    log: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    if let Err(err) = Shell::new(cli.config).run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(log_file: Option<&Path>) {
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .try_init();
                return;
            }
            Err(err) => {
                eprintln!(
                    "warning: could not open log file {}: {err}, logging to stderr",
                    path.display()
                );
            }
        }
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
