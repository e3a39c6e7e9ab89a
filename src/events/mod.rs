/*
 * Event Stream
 *
 * Every observable transition of a core is reported to an EventSink as a
 * typed event. Backends (text, binary, fan-out) implement a single
 * handler; the stream is append-only and causally ordered, and carries
 * enough context for a replay to reconstruct chains and statistics
 * without any external state.
 */

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::sched::context::ContextChain;
use crate::sched::core::CoreStats;
use crate::sched::thread::ThreadStats;
use crate::sched::types::{CoreUid, ModuleId, Relationship, ThreadRef};
use crate::sched::world::Tables;
use crate::time::Time;

pub mod binary;
pub mod text;

/// Direction of a context switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchDirection {
    Down,
    Up,
}

impl fmt::Display for SwitchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchDirection::Down => write!(f, "down"),
            SwitchDirection::Up => write!(f, "up"),
        }
    }
}

/// One entry of a chain summary, bottom to top. The relationship compares
/// against the previous entry; the bottom is child of the synthetic root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub thread: ThreadRef,
    pub relationship: Relationship,
}

/// Structural simulation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Schedule {
        core: CoreUid,
        time: Time,
        chain: Vec<ChainLink>,
    },
    ContextSwitch {
        core: CoreUid,
        time: Time,
        direction: SwitchDirection,
        cost: Time,
    },
    ThreadExecute {
        core: CoreUid,
        time: Time,
        thread: ThreadRef,
        run_time: Time,
    },
    ThreadYield {
        core: CoreUid,
        time: Time,
        thread: ThreadRef,
    },
    ThreadFinish {
        core: CoreUid,
        time: Time,
        thread: ThreadRef,
    },
    TimerSet {
        core: CoreUid,
        time: Time,
        index: usize,
        timeout: Option<Time>,
    },
    TimerElapsed {
        core: CoreUid,
        time: Time,
        index: usize,
    },
    CoreIdle {
        core: CoreUid,
        from: Time,
        to: Time,
    },
    ThreadStatistics {
        thread: ThreadRef,
        stats: ThreadStats,
    },
    CoreStatistics {
        core: CoreUid,
        stats: CoreStats,
    },
    CoreFailure {
        core: CoreUid,
        reason: String,
    },
}

impl Event {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Schedule { .. } => "schedule",
            Event::ContextSwitch { .. } => "context_switch",
            Event::ThreadExecute { .. } => "thread_execute",
            Event::ThreadYield { .. } => "thread_yield",
            Event::ThreadFinish { .. } => "thread_finish",
            Event::TimerSet { .. } => "timer_set",
            Event::TimerElapsed { .. } => "timer_elapsed",
            Event::CoreIdle { .. } => "core_idle",
            Event::ThreadStatistics { .. } => "thread_statistics",
            Event::CoreStatistics { .. } => "core_statistics",
            Event::CoreFailure { .. } => "core_failure",
        }
    }
}

/// Structural log emitter, invoked at each observable transition.
pub trait EventSink {
    fn emit(&mut self, event: &Event) -> SimResult<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> SimResult<()> {
        Ok(())
    }
}

/// Synchronous fan-out to several sinks.
#[derive(Default)]
pub struct Multiplexer {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Multiplexer {
    pub fn new() -> Multiplexer {
        Multiplexer::default()
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for Multiplexer {
    fn emit(&mut self, event: &Event) -> SimResult<()> {
        for sink in &mut self.sinks {
            sink.emit(event)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> SimResult<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }
}

impl EventSink for Recorder {
    fn emit(&mut self, event: &Event) -> SimResult<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Summarise a chain bottom to top for a `schedule` event.
pub fn chain_summary(chain: &ContextChain, tables: &Tables) -> Vec<ChainLink> {
    let mut prev: Option<ModuleId> = None;
    chain
        .iter()
        .map(|ctx| {
            let thread = tables.threads.get(ctx.thread());
            let relationship = match prev {
                Some(module) if module == thread.module() => Relationship::Sibling,
                _ => Relationship::Child,
            };
            prev = Some(thread.module());
            ChainLink {
                thread: thread.thread_ref(),
                relationship,
            }
        })
        .collect()
}
