//! # ropshadow daemon (ropshadowd)
//!
//! Command-line driver for the ropshadow control-flow integrity monitor.
//!
//! ## Usage
//!
//! ```bash
//! ropshadowd replay <trace.jsonl> [--config <file>] [--mode <mode>]
//!     [--short-threshold <n>] [--chain-threshold <n>] [--quiet] [--no-colour] [--stats]
//! ropshadowd check-config <file>
//! ```
//!
//! `replay` feeds a recorded trace (`-` for standard input) through the
//! monitor. Call and return lines go to standard output; the violation
//! banner goes to standard error. The exit status is 0 when the whole trace
//! was accepted, 1 on a violation and 2 on unreadable input.
//!
//! The diagnostic level comes from `--log-level`, then `ROPSHADOW_LOG`, then
//! the configuration file. The driver's own tracing output honours
//! `RUST_LOG` and `RUST_LOG_FORMAT` (`json`, `compact` or `pretty`).

#![warn(missing_docs)]

use std::{
    env,
    fs::File,
    io::{
        self,
        BufReader,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
    process::ExitCode,
};

use anyhow::{
    Context,
    Result,
};
use clap::{
    Args,
    Parser,
    Subcommand,
};
use ropshadow_core::{
    DetectionMode,
    MonitorConfig,
    ProcessReporter,
    Reporter,
};
use ropshadow_logging::{
    ConsoleSink,
    ConsoleTarget,
    LogLevel,
};
use ropshadowd::{
    EXIT_INPUT_ERROR,
    EXIT_VIOLATION,
    Overrides,
    ReplayOutcome,
    Replayer,
    settings,
};
use tracing::{
    debug,
    error,
    info,
};
use tracing_subscriber::EnvFilter;

/// ropshadow command-line arguments
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded event trace through the monitor
    Replay(ReplayArgs),
    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Configuration file (TOML, or JSON with a .json extension)
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Trace file, one JSON event per line; `-` reads standard input
    trace: PathBuf,

    /// Configuration file
    #[arg(short, long, env = "ROPSHADOW_CONFIG")]
    config: Option<PathBuf>,

    /// Detectors to run: shadow-stack, gadget-heuristic or combined
    #[arg(short, long)]
    mode: Option<DetectionMode>,

    /// Instructions bound for a short sequence
    #[arg(long, value_name = "N")]
    short_threshold: Option<u32>,

    /// Consecutive short sequences bound
    #[arg(long, value_name = "N")]
    chain_threshold: Option<u32>,

    /// Unwind contexts kept per thread
    #[arg(long, value_name = "N")]
    max_pending_unwinds: Option<usize>,

    /// Lowest diagnostic level printed
    #[arg(short, long, env = "ROPSHADOW_LOG")]
    log_level: Option<LogLevel>,

    /// Print warnings and violations only
    #[arg(short, long)]
    quiet: bool,

    /// Disable ANSI colour
    #[arg(long, alias = "no-color")]
    no_colour: bool,

    /// Print event statistics when the replay ends
    #[arg(short, long, help = "Show monitor statistics")]
    stats: bool,
}

impl ReplayArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            mode:            self.mode,
            short_threshold: self.short_threshold,
            chain_threshold: self.chain_threshold,
            log_level:       self.log_level,
            quiet:           self.quiet,
            no_colour:       self.no_colour,
            max_pending:     self.max_pending_unwinds,
        }
    }
}

fn main() -> ExitCode {
    initialize_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Replay(args) => replay(&args),
        Command::CheckConfig { config } => check_config(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_INPUT_ERROR)
        },
    }
}

/// Initialize the tracing system for the driver's own logging
fn initialize_tracing() {
    let format = env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(true);

    match format.as_str() {
        "json" => subscriber.json().init(),
        "pretty" => subscriber.pretty().init(),
        _ => subscriber.compact().init(),
    }
}

fn replay(args: &ReplayArgs) -> Result<ExitCode> {
    let config = settings::resolve(args.config.as_deref(), &args.overrides())?;
    info!(mode = %config.mode, level = %config.log_level, "starting replay");

    let colour = config.colour;
    let replayer = Replayer::new(config, ConsoleSink::new(ConsoleTarget::Stdout, colour));
    let outcome = if args.trace.as_os_str() == "-" {
        replayer.run(io::stdin().lock())?
    } else {
        let file = File::open(&args.trace)
            .with_context(|| format!("failed to open trace {}", args.trace.display()))?;
        replayer.run(BufReader::new(file))?
    };

    if args.stats {
        print_statistics(&replayer);
    }

    match outcome {
        ReplayOutcome::Completed { events } => {
            info!(events, "trace accepted");
            Ok(ExitCode::SUCCESS)
        },
        ReplayOutcome::Violation { line, violation, .. } => {
            debug!(line, "{violation}");
            ProcessReporter::new(colour)
                .with_exit_code(i32::from(EXIT_VIOLATION))
                .report_and_terminate(&violation)
        },
    }
}

fn print_statistics(replayer: &Replayer) {
    let stats = replayer.statistics();
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "\n=== ropshadow statistics ===");
    let _ = writeln!(stdout, "{stats}");
    let _ = stdout.flush();
}

fn check_config(path: &Path) -> Result<ExitCode> {
    let config: MonitorConfig = settings::resolve(Some(path), &Overrides::default())?;
    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    print!("{rendered}");
    Ok(ExitCode::SUCCESS)
}
