/*
 * Text Emitter
 *
 * Human-readable rendering of the event stream, one line per event.
 */

use std::io::Write;

use crate::error::SimResult;
use crate::events::{ChainLink, Event, EventSink};

pub struct TextLog<W: Write> {
    out: W,
}

impl<W: Write> TextLog<W> {
    pub fn new(out: W) -> TextLog<W> {
        TextLog { out }
    }
}

fn format_chain(chain: &[ChainLink]) -> String {
    let links: Vec<String> = chain
        .iter()
        .map(|link| format!("{} ({})", link.thread, link.relationship))
        .collect();
    format!("[{}]", links.join(", "))
}

impl<W: Write> EventSink for TextLog<W> {
    fn emit(&mut self, event: &Event) -> SimResult<()> {
        match event {
            Event::Schedule { core, time, chain } => {
                writeln!(self.out, "{time}: {core} schedule {}", format_chain(chain))?;
            }
            Event::ContextSwitch {
                core,
                time,
                direction,
                cost,
            } => {
                writeln!(
                    self.out,
                    "{time}: {core} context switch {direction} (cost {cost})"
                )?;
            }
            Event::ThreadExecute {
                core,
                time,
                thread,
                run_time,
            } => {
                writeln!(self.out, "{time}: {core} {thread} ran for {run_time}")?;
            }
            Event::ThreadYield { core, time, thread } => {
                writeln!(self.out, "{time}: {core} {thread} yielded")?;
            }
            Event::ThreadFinish { core, time, thread } => {
                writeln!(self.out, "{time}: {core} {thread} finished")?;
            }
            Event::TimerSet {
                core,
                time,
                index,
                timeout,
            } => match timeout {
                Some(t) => writeln!(self.out, "{time}: {core} timer[{index}] = {t}")?,
                None => writeln!(self.out, "{time}: {core} timer[{index}] cleared")?,
            },
            Event::TimerElapsed { core, time, index } => {
                writeln!(self.out, "{time}: {core} timer[{index}] elapsed")?;
            }
            Event::CoreIdle { core, from, to } => {
                writeln!(self.out, "{from}: {core} idle until {to}")?;
            }
            Event::ThreadStatistics { thread, stats } => {
                writeln!(
                    self.out,
                    "stats {thread}: ran {} over {} run(s), waited {}, switches in/out {}/{}",
                    stats.execution_time,
                    stats.runs.len(),
                    stats
                        .waits
                        .iter()
                        .map(|s| s.duration)
                        .sum::<crate::time::Time>(),
                    stats.ctx_switch_in,
                    stats.ctx_switch_out,
                )?;
            }
            Event::CoreStatistics { core, stats } => {
                writeln!(
                    self.out,
                    "stats {core}: total {}, idle {}, switching {}",
                    stats.total_time, stats.idle_time, stats.switch_time
                )?;
            }
            Event::CoreFailure { core, reason } => {
                writeln!(self.out, "{core} FAILED: {reason}")?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> SimResult<()> {
        self.out.flush()?;
        Ok(())
    }
}
