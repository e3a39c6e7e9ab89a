/*
 * Core - Driver Layer
 *
 * The core advances one scheduling step at a time: it pulls the next
 * request out of the top context's computation, carries it out, accounts
 * the time that passed and records the observable transition. The chain is
 * always rooted at the kernel scheduler; control moves down via Resume and
 * back up via idle pops, workload completion and elapsed timers.
 *
 * Timer handling runs at the start of a step: while the chain's cached
 * next_timeout is zero, the chain is split above the lowest elapsed
 * context before any computation is stepped. An undelivered reply that
 * carries a suspended sub-chain is folded onto the freshly split tail so
 * no activation is ever dropped.
 */

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::events::{self, Event, EventSink, SwitchDirection};
use crate::sched::context::ContextChain;
use crate::sched::request::{ExecuteSpan, Reply, Request};
use crate::sched::types::{CoreUid, ModuleId, ThreadKey, ThreadRef};
use crate::sched::world::Tables;
use crate::time::Time;

/// Hierarchical timer strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Every context may own an independent timer; a preempted subtree is
    /// suspended in place and resumed where it left off.
    Local,
    /// Only the kernel scheduler may set timers. A preempted or idle
    /// subtree is torn down (`Thread::finish`) and re-entered from
    /// scratch next time, as on hardware without per-scheduler timers.
    KernelOnly,
}

/// Per-core statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreStats {
    /// Final simulated time.
    pub total_time: Time,
    pub idle_time: Time,
    /// Time spent in context switches, not chargeable to any thread.
    pub switch_time: Time,
    /// Execution time per module.
    pub module_time: BTreeMap<ModuleId, Time>,
}

/// Mutable per-core state, exclusively owned and mutated by the driver.
struct Status {
    chain: ContextChain,
    current_time: Time,
    /// Reply owed to whichever context is on top at the next step.
    pending: Option<Reply>,
    finished: bool,
}

/// Invariant core identity plus its live status.
pub struct Core {
    uid: CoreUid,
    /// Cost of a context switch that crosses a module boundary;
    /// intra-module transitions are free.
    switch_cost: Time,
    mode: TimerMode,
    status: Status,
    stats: CoreStats,
}

impl Core {
    pub fn new(
        uid: CoreUid,
        switch_cost: Time,
        mode: TimerMode,
        kernel_scheduler: ThreadKey,
        tables: &mut Tables,
    ) -> SimResult<Core> {
        let chain = ContextChain::from_thread(kernel_scheduler, tables)?;
        log::info!("[{}] ready ({:?} timers, switch cost {})", uid, mode, switch_cost);
        Ok(Core {
            uid,
            switch_cost,
            mode,
            status: Status {
                chain,
                current_time: Time::ZERO,
                pending: None,
                finished: false,
            },
            stats: CoreStats::default(),
        })
    }

    pub fn uid(&self) -> CoreUid {
        self.uid
    }

    pub fn current_time(&self) -> Time {
        self.status.current_time
    }

    pub fn is_finished(&self) -> bool {
        self.status.finished
    }

    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    pub(crate) fn halt(&mut self) {
        self.status.finished = true;
    }

    /// Perform one atomic operation. Returns whether the core is still
    /// running.
    pub fn execute(&mut self, tables: &mut Tables, sink: &mut dyn EventSink) -> SimResult<bool> {
        if self.status.finished {
            return Ok(false);
        }
        if self.status.chain.is_empty() {
            self.status.finished = true;
            return Ok(false);
        }
        if self.status.chain.next_timeout() == Some(Time::ZERO) {
            self.handle_elapsed_timer(tables, sink)?;
            return Ok(true);
        }

        let reply = self.status.pending.take().unwrap_or(Reply::Resumed);
        let request = match self.status.chain.top_mut() {
            Some(top) => top.step(tables, reply)?,
            None => unreachable!("chain emptiness checked above"),
        };
        log::trace!(
            "[{}] t={} request {}",
            self.uid,
            self.status.current_time,
            request.name()
        );
        match request {
            Request::CurrentTime => {
                self.status.pending = Some(Reply::Time(self.status.current_time));
            }
            Request::Timer(delta) => self.handle_timer_request(delta, tables, sink)?,
            Request::Idle => self.handle_idle(tables, sink)?,
            Request::Resume(sub) => self.handle_resume(sub, tables, sink)?,
            Request::Execute(span) => self.handle_execute(span, tables, sink)?,
            Request::Finish => self.handle_finish(tables, sink)?,
        }
        Ok(!self.status.finished)
    }

    fn top_key(&self) -> ThreadKey {
        match self.status.chain.top() {
            Some(ctx) => ctx.thread(),
            None => unreachable!("chain is non-empty while running"),
        }
    }

    fn top_ref(&self, tables: &Tables) -> ThreadRef {
        tables.thread_ref(self.top_key())
    }

    fn handle_timer_request(
        &mut self,
        delta: Option<Time>,
        tables: &Tables,
        sink: &mut dyn EventSink,
    ) -> SimResult<()> {
        let index = self.status.chain.len() - 1;
        if self.mode == TimerMode::KernelOnly && index != 0 {
            return Err(SimError::TimerForbidden { index });
        }
        if delta == Some(Time::ZERO) {
            return Err(SimError::MalformedRequest {
                thread: self.top_ref(tables),
                detail: "timer armed with zero delay".into(),
            });
        }
        self.status.chain.set_timer(delta, index)?;
        sink.emit(&Event::TimerSet {
            core: self.uid,
            time: self.status.current_time,
            index,
            timeout: delta,
        })?;
        self.status.pending = Some(Reply::Resumed);
        Ok(())
    }

    fn handle_execute(
        &mut self,
        span: ExecuteSpan,
        tables: &mut Tables,
        sink: &mut dyn EventSink,
    ) -> SimResult<()> {
        let now = self.status.current_time;
        let top_key = self.top_key();
        let thread_ref = tables.thread_ref(top_key);

        let span_limit = match span {
            ExecuteSpan::For(t) if t.is_zero() => {
                return Err(SimError::MalformedRequest {
                    thread: thread_ref,
                    detail: "execute over a zero span".into(),
                });
            }
            ExecuteSpan::For(t) => Some(t),
            ExecuteSpan::UntilTimer => None,
        };
        let remaining = tables.threads.get(top_key).remaining();
        if remaining == Some(Time::ZERO) {
            return self.handle_finish(tables, sink);
        }
        let budget = self.status.chain.next_timeout();
        debug_assert_ne!(budget, Some(Time::ZERO), "expired timer survived the pre-step check");

        let delta = [budget, span_limit, remaining]
            .into_iter()
            .flatten()
            .min()
            .ok_or_else(|| SimError::MalformedRequest {
                thread: thread_ref,
                detail: "unbounded execute: no span, timer or workload limit".into(),
            })?;

        tables.threads.get_mut(top_key).run(now, delta);
        self.status.chain.run_background(now, delta, tables);
        self.status.current_time = now + delta;
        self.status.chain.elapse(delta);
        let module = tables.threads.get(top_key).module();
        *self.stats.module_time.entry(module).or_default() += delta;

        sink.emit(&Event::ThreadExecute {
            core: self.uid,
            time: now,
            thread: thread_ref,
            run_time: delta,
        })?;
        self.status.pending = Some(Reply::Resumed);

        if tables.threads.get(top_key).is_finished() {
            self.handle_finish(tables, sink)?;
        }
        Ok(())
    }

    fn handle_finish(&mut self, tables: &mut Tables, sink: &mut dyn EventSink) -> SimResult<()> {
        let now = self.status.current_time;
        let top_key = self.top_key();
        sink.emit(&Event::ThreadFinish {
            core: self.uid,
            time: now,
            thread: tables.thread_ref(top_key),
        })?;
        let len = self.status.chain.len();
        if len == 1 {
            self.status.chain.split(0)?.finish(now, tables);
            self.finish_core(now);
            return Ok(());
        }
        let tail = self.status.chain.split(len - 1)?;
        tail.finish(now, tables);
        let new_top = self.top_key();
        self.note_top_change(top_key, new_top, tables);
        self.status.pending = Some(Reply::Finished);
        Ok(())
    }

    fn handle_idle(&mut self, tables: &mut Tables, sink: &mut dyn EventSink) -> SimResult<()> {
        let now = self.status.current_time;
        if self.status.chain.len() == 1 {
            return self.handle_root_idle(tables, sink);
        }
        let top_key = self.top_key();
        sink.emit(&Event::ThreadYield {
            core: self.uid,
            time: now,
            thread: tables.thread_ref(top_key),
        })?;
        match self.mode {
            TimerMode::Local => {
                let len = self.status.chain.len();
                let tail = self.status.chain.split(len - 1)?;
                let new_top = self.top_key();
                self.charge_up_switch(top_key, new_top, tables, sink)?;
                self.note_top_change(top_key, new_top, tables);
                self.status.pending = Some(Reply::Idled(Some(tail)));
            }
            TimerMode::KernelOnly => {
                let tail = self.status.chain.split(1)?;
                let new_top = self.top_key();
                self.charge_up_switch(top_key, new_top, tables, sink)?;
                self.note_top_change(top_key, new_top, tables);
                tail.finish(self.status.current_time, tables);
                self.status.pending = Some(Reply::Idled(None));
            }
        }
        Ok(())
    }

    fn handle_root_idle(&mut self, tables: &mut Tables, sink: &mut dyn EventSink) -> SimResult<()> {
        let now = self.status.current_time;
        match tables.threads.next_pending_start(now) {
            Some(start) => {
                // Jump to the next workload start, or to the kernel timer
                // if that fires first.
                let target = match self.status.chain.next_timeout() {
                    Some(next) => start.min(now + next),
                    None => start,
                };
                sink.emit(&Event::CoreIdle {
                    core: self.uid,
                    from: now,
                    to: target,
                })?;
                let advance = target - now;
                self.stats.idle_time += advance;
                self.status.current_time = target;
                self.status.chain.elapse(advance);
                self.status.pending = Some(Reply::Resumed);
            }
            None => {
                if tables.threads.any_unfinished() {
                    log::warn!(
                        "[{}] kernel scheduler idle with unfinished work and no pending start",
                        self.uid
                    );
                }
                self.finish_core(now);
            }
        }
        Ok(())
    }

    fn handle_resume(
        &mut self,
        sub: ContextChain,
        tables: &mut Tables,
        sink: &mut dyn EventSink,
    ) -> SimResult<()> {
        let Some(to) = sub.top().map(|c| c.thread()) else {
            return Err(SimError::MalformedRequest {
                thread: self.top_ref(tables),
                detail: "resume of an empty chain".into(),
            });
        };
        let from = self.top_key();
        let cost = self.switch_cost_between(from, to, tables);
        if !cost.is_zero() {
            self.apply_switch_cost(cost);
        }
        self.status.chain.append_chain(sub, tables)?;
        self.note_top_change(from, to, tables);

        let summary = events::chain_summary(&self.status.chain, tables);
        sink.emit(&Event::Schedule {
            core: self.uid,
            time: self.status.current_time,
            chain: summary,
        })?;
        sink.emit(&Event::ContextSwitch {
            core: self.uid,
            time: self.status.current_time,
            direction: SwitchDirection::Down,
            cost,
        })?;
        self.status.pending = Some(Reply::Resumed);
        Ok(())
    }

    /// Split the chain above the lowest elapsed timer and hand the tail to
    /// the surviving context. The elapsed timeout is consumed; its owner
    /// arms a fresh one on its next dispatch.
    fn handle_elapsed_timer(
        &mut self,
        tables: &mut Tables,
        sink: &mut dyn EventSink,
    ) -> SimResult<()> {
        let index = self.status.chain.find_elapsed_timer()?;
        let mut tail = self.status.chain.split(index + 1)?;
        self.status.chain.set_timer(None, index)?;

        // A reply that still carries a suspended sub-chain belongs to a
        // context now inside the tail; fold it back on so the stack shape
        // survives the suspension.
        match self.status.pending.take() {
            Some(Reply::Preempted(Some(chain))) | Some(Reply::Idled(Some(chain))) => {
                if tail.is_empty() {
                    tail = chain;
                } else {
                    tail.append_chain(chain, tables)?;
                }
            }
            _ => {}
        }

        sink.emit(&Event::TimerElapsed {
            core: self.uid,
            time: self.status.current_time,
            index,
        })?;

        if tail.is_empty() {
            self.status.pending = Some(Reply::Preempted(None));
            return Ok(());
        }
        let departing = match tail.top() {
            Some(ctx) => ctx.thread(),
            None => unreachable!("tail emptiness checked above"),
        };
        let new_top = self.top_key();
        self.charge_up_switch(departing, new_top, tables, sink)?;
        self.note_top_change(departing, new_top, tables);
        match self.mode {
            TimerMode::Local => {
                self.status.pending = Some(Reply::Preempted(Some(tail)));
            }
            TimerMode::KernelOnly => {
                debug_assert_eq!(index, 0, "non-kernel timer under kernel-only mode");
                tail.finish(self.status.current_time, tables);
                self.status.pending = Some(Reply::Preempted(None));
            }
        }
        Ok(())
    }

    fn switch_cost_between(&self, from: ThreadKey, to: ThreadKey, tables: &Tables) -> Time {
        if tables.threads.get(from).module() == tables.threads.get(to).module() {
            Time::ZERO
        } else {
            self.switch_cost
        }
    }

    /// Charge a context-switch cost: simulated time passes and chain
    /// timers elapse (capped at the next timeout; an expiry is handled on
    /// the next step) before the switch becomes observable. The cost is
    /// not chargeable work for any thread.
    fn apply_switch_cost(&mut self, cost: Time) {
        self.status.current_time += cost;
        self.stats.switch_time += cost;
        let capped = match self.status.chain.next_timeout() {
            Some(next) => cost.min(next),
            None => cost,
        };
        self.status.chain.elapse(capped);
    }

    fn charge_up_switch(
        &mut self,
        from: ThreadKey,
        to: ThreadKey,
        tables: &Tables,
        sink: &mut dyn EventSink,
    ) -> SimResult<()> {
        let cost = self.switch_cost_between(from, to, tables);
        if cost.is_zero() {
            return Ok(());
        }
        self.apply_switch_cost(cost);
        sink.emit(&Event::ContextSwitch {
            core: self.uid,
            time: self.status.current_time,
            direction: SwitchDirection::Up,
            cost,
        })?;
        Ok(())
    }

    fn note_top_change(&self, old: ThreadKey, new: ThreadKey, tables: &mut Tables) {
        if old != new {
            tables.threads.get_mut(old).note_switch_out();
            tables.threads.get_mut(new).note_switch_in();
        }
    }

    fn finish_core(&mut self, now: Time) {
        log::info!("[{}] simulation finished at t={}", self.uid, now);
        self.stats.total_time = now;
        self.status.finished = true;
    }
}
