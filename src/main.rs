/*
 * schedsim CLI
 *
 * `run` simulates a canned workload and emits a binary event log to
 * stdout or a file; `replay` reads such a log back and renders it as
 * text, or re-emits it as binary for round-trip checks. Exit code is
 * non-zero on malformed input.
 */

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

use schedsim::events::binary::{BinaryLog, replay};
use schedsim::events::text::TextLog;
use schedsim::events::{EventSink, Multiplexer};
use schedsim::sched::TimerMode;
use schedsim::time::Time;
use schedsim::workloads;

#[derive(Parser)]
#[command(name = "schedsim", about = "Hierarchical scheduling simulator", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a workload and emit a binary event log.
    Run {
        /// Workload to simulate.
        #[arg(long, value_enum, default_value = "single")]
        workload: WorkloadArg,

        /// Hierarchical timer strategy.
        #[arg(long, value_enum, default_value = "local")]
        timers: TimerArg,

        /// Context-switch cost across module boundaries, in time units.
        #[arg(long, default_value_t = 0)]
        switch_cost: u64,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also render the stream as text on stderr.
        #[arg(long)]
        text: bool,
    },
    /// Replay a binary event log.
    Replay {
        /// Binary log to read.
        input: PathBuf,

        /// Re-emit binary on stdout instead of text.
        #[arg(long)]
        binary: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WorkloadArg {
    Single,
    RoundRobin,
    TwoLevel,
    Delayed,
    Sjf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TimerArg {
    Local,
    KernelOnly,
}

impl From<TimerArg> for TimerMode {
    fn from(arg: TimerArg) -> TimerMode {
        match arg {
            TimerArg::Local => TimerMode::Local,
            TimerArg::KernelOnly => TimerMode::KernelOnly,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            workload,
            timers,
            switch_cost,
            output,
            text,
        } => run(workload, timers.into(), Time::from_units(switch_cost), output, text),
        Command::Replay { input, binary } => replay_log(&input, binary),
    }
}

fn run(
    workload: WorkloadArg,
    mode: TimerMode,
    switch_cost: Time,
    output: Option<PathBuf>,
    text: bool,
) -> anyhow::Result<()> {
    let mut world = match workload {
        WorkloadArg::Single => workloads::single(mode, switch_cost),
        WorkloadArg::RoundRobin => workloads::round_robin_pair(mode, switch_cost),
        WorkloadArg::TwoLevel => workloads::two_level(mode, switch_cost),
        WorkloadArg::Delayed => workloads::delayed_start(mode, switch_cost),
        WorkloadArg::Sjf => workloads::shortest_job_first(mode, switch_cost),
    }?;

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut sink = Multiplexer::new();
    sink.push(Box::new(BinaryLog::new(writer)));
    if text {
        sink.push(Box::new(TextLog::new(io::stderr())));
    }

    world.run(&mut sink)?;
    sink.flush()?;
    Ok(())
}

fn replay_log(input: &PathBuf, binary: bool) -> anyhow::Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let reader = BufReader::new(file);
    if binary {
        let mut sink = BinaryLog::new(BufWriter::new(io::stdout().lock()));
        replay(reader, &mut sink)?;
    } else {
        let mut sink = TextLog::new(BufWriter::new(io::stdout().lock()));
        replay(reader, &mut sink)?;
    }
    Ok(())
}
