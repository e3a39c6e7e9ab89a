/*
 * Thread Management
 *
 * Threads are the schedulable entities. A workload thread carries a finite
 * amount of remaining work; scheduler and VCPU threads are unbounded and
 * only forward control. All threads live in the World's thread table and
 * are referred to by key; a thread is mutated only while it is the current
 * thread of the running context on its core's chain.
 */

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::sched::request::Computation;
use crate::sched::scheduler::{PolicyKind, SchedulerStep, VcpuStep};
use crate::sched::types::{ModuleId, ThreadId, ThreadKey, ThreadRef};
use crate::sched::world::Tables;
use crate::time::Time;

/// One timed sample in a thread's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSample {
    pub start: Time,
    pub duration: Time,
}

/// Per-thread statistics, quantified in exact time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadStats {
    /// Total time the thread itself was executing.
    pub execution_time: Time,
    /// One sample per `run` call.
    pub runs: Vec<TimeSample>,
    /// Time spent ready-but-not-running before each run.
    pub waits: Vec<TimeSample>,
    /// Time spent as a non-top ancestor of an executing context.
    pub background_time: Time,
    pub ctx_switch_in: u64,
    pub ctx_switch_out: u64,
}

/// What a thread does when executed.
#[derive(Debug)]
pub enum ThreadKind {
    /// Consumes its `remaining` workload.
    Work,
    /// Drives child-thread selection for its module.
    Scheduler {
        policy: PolicyKind,
        /// Whether this scheduler may issue timer requests. Under
        /// kernel-only timers this is true for the kernel scheduler alone.
        emit_timers: bool,
    },
    /// Trampolines into a child module's scheduler.
    Vcpu { child: ModuleId },
}

/// A schedulable entity.
pub struct Thread {
    tid: ThreadId,
    module: ModuleId,
    kind: ThreadKind,
    start_time: Time,
    /// Remaining workload; `None` for unbounded (scheduler/VCPU) threads,
    /// `Some(0)` once finished. Monotonically non-increasing.
    remaining: Option<Time>,
    initial: Option<Time>,
    /// Set while a live context (on a chain or suspended in one) refers to
    /// this thread. A thread may appear only once at a time.
    active: bool,
    last_ready: Time,
    stats: ThreadStats,
}

impl Thread {
    pub fn new_work(tid: ThreadId, module: ModuleId, remaining: Time, start_time: Time) -> Thread {
        Thread {
            tid,
            module,
            kind: ThreadKind::Work,
            start_time,
            remaining: Some(remaining),
            initial: Some(remaining),
            active: false,
            last_ready: start_time,
            stats: ThreadStats::default(),
        }
    }

    pub fn new_scheduler(tid: ThreadId, module: ModuleId, policy: PolicyKind) -> Thread {
        Thread {
            tid,
            module,
            kind: ThreadKind::Scheduler {
                policy,
                emit_timers: true,
            },
            start_time: Time::ZERO,
            remaining: None,
            initial: None,
            active: false,
            last_ready: Time::ZERO,
            stats: ThreadStats::default(),
        }
    }

    pub fn new_vcpu(tid: ThreadId, module: ModuleId, child: ModuleId) -> Thread {
        Thread {
            tid,
            module,
            kind: ThreadKind::Vcpu { child },
            start_time: Time::ZERO,
            remaining: None,
            initial: None,
            active: false,
            last_ready: Time::ZERO,
            stats: ThreadStats::default(),
        }
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn thread_ref(&self) -> ThreadRef {
        ThreadRef {
            module: self.module,
            thread: self.tid,
        }
    }

    pub fn kind(&self) -> &ThreadKind {
        &self.kind
    }

    pub fn is_work(&self) -> bool {
        matches!(self.kind, ThreadKind::Work)
    }

    pub fn start_time(&self) -> Time {
        self.start_time
    }

    /// Remaining workload; `None` means unbounded.
    pub fn remaining(&self) -> Option<Time> {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == Some(Time::ZERO)
    }

    /// Whether the thread could be dispatched fresh at `now`: it has work
    /// left, has started, and is not already activated elsewhere.
    pub fn ready(&self, now: Time) -> bool {
        !self.active && !self.is_finished() && self.start_time <= now
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mark the thread as referenced by a live context.
    pub fn activate(&mut self) -> SimResult<()> {
        if self.active {
            return Err(SimError::DuplicateThread {
                thread: self.thread_ref(),
            });
        }
        self.active = true;
        Ok(())
    }

    /// Account `delta` of execution starting at `now`.
    pub fn run(&mut self, now: Time, delta: Time) {
        let wait = now.saturating_sub(self.last_ready);
        if !wait.is_zero() {
            self.stats.waits.push(TimeSample {
                start: self.last_ready,
                duration: wait,
            });
        }
        self.stats.runs.push(TimeSample {
            start: now,
            duration: delta,
        });
        self.stats.execution_time += delta;
        if let Some(remaining) = self.remaining {
            debug_assert!(delta <= remaining, "run past remaining workload");
            self.remaining = Some(remaining.saturating_sub(delta));
        }
        self.last_ready = now + delta;
    }

    /// Account `delta` spent as a non-top ancestor of the executing
    /// context.
    pub fn run_background(&mut self, _now: Time, delta: Time) {
        self.stats.background_time += delta;
    }

    /// Terminate the thread's current activation. Restartable: a partially
    /// run workload thread keeps its `remaining` and may be dispatched
    /// again from scratch.
    pub fn finish(&mut self, now: Time) {
        self.active = false;
        self.last_ready = now;
    }

    pub fn note_switch_in(&mut self) {
        self.stats.ctx_switch_in += 1;
    }

    pub fn note_switch_out(&mut self) {
        self.stats.ctx_switch_out += 1;
    }

    pub fn stats(&self) -> &ThreadStats {
        &self.stats
    }

    pub fn initial_remaining(&self) -> Option<Time> {
        self.initial
    }

    /// Build a fresh computation for this thread.
    pub fn spawn_computation(&self, key: ThreadKey) -> Box<dyn Computation> {
        match &self.kind {
            ThreadKind::Work => Box::new(WorkStep { key }),
            ThreadKind::Scheduler {
                policy,
                emit_timers,
            } => Box::new(SchedulerStep::new(self.module, policy.build(), *emit_timers)),
            ThreadKind::Vcpu { child } => Box::new(VcpuStep::new(*child)),
        }
    }

    pub(crate) fn set_emit_timers(&mut self, allowed: bool) {
        if let ThreadKind::Scheduler { emit_timers, .. } = &mut self.kind {
            *emit_timers = allowed;
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("module", &self.module)
            .field("remaining", &self.remaining)
            .field("start_time", &self.start_time)
            .field("active", &self.active)
            .finish()
    }
}

/// Arena of threads, indexed by [`ThreadKey`].
#[derive(Debug, Default)]
pub struct ThreadTable {
    threads: Vec<Thread>,
}

impl ThreadTable {
    pub fn new() -> ThreadTable {
        ThreadTable::default()
    }

    pub fn insert(&mut self, thread: Thread) -> ThreadKey {
        let key = ThreadKey(self.threads.len() as u32);
        self.threads.push(thread);
        key
    }

    pub fn get(&self, key: ThreadKey) -> &Thread {
        &self.threads[key.as_usize()]
    }

    pub fn get_mut(&mut self, key: ThreadKey) -> &mut Thread {
        &mut self.threads[key.as_usize()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ThreadKey, &Thread)> {
        self.threads
            .iter()
            .enumerate()
            .map(|(i, t)| (ThreadKey(i as u32), t))
    }

    /// Earliest future start among unfinished workload threads, if any.
    pub fn next_pending_start(&self, now: Time) -> Option<Time> {
        self.threads
            .iter()
            .filter(|t| t.is_work() && !t.is_finished() && t.start_time() > now)
            .map(|t| t.start_time())
            .min()
    }

    /// Whether any workload thread still has work left.
    pub fn any_unfinished(&self) -> bool {
        self.threads
            .iter()
            .any(|t| t.is_work() && !t.is_finished())
    }
}

/// Computation of a workload thread: request execution for the whole
/// remaining workload (the core caps it at the next timer), then finish.
struct WorkStep {
    key: ThreadKey,
}

impl Computation for WorkStep {
    fn step(
        &mut self,
        tables: &mut Tables,
        _reply: crate::sched::request::Reply,
    ) -> SimResult<crate::sched::request::Request> {
        use crate::sched::request::{ExecuteSpan, Request};
        match tables.threads.get(self.key).remaining() {
            Some(remaining) if !remaining.is_zero() => {
                Ok(Request::Execute(ExecuteSpan::For(remaining)))
            }
            Some(_) => Ok(Request::Finish),
            None => unreachable!("workload threads always carry a remaining amount"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accounts_work_and_waits() {
        let mut t = Thread::new_work(ThreadId(0), ModuleId(0), Time::from_units(10), Time::ZERO);
        t.run(Time::from_units(2), Time::from_units(3));
        assert_eq!(t.remaining(), Some(Time::from_units(7)));
        assert_eq!(t.stats().execution_time, Time::from_units(3));
        assert_eq!(t.stats().waits.len(), 1);
        assert_eq!(t.stats().waits[0].duration, Time::from_units(2));

        // Immediately rescheduled: no wait sample.
        t.run(Time::from_units(5), Time::from_units(7));
        assert_eq!(t.stats().waits.len(), 1);
        assert!(t.is_finished());
        assert_eq!(
            t.stats().runs.iter().map(|s| s.duration).sum::<Time>(),
            t.initial_remaining().unwrap()
        );
    }

    #[test]
    fn ready_respects_start_time_and_activation() {
        let mut t = Thread::new_work(ThreadId(0), ModuleId(0), Time::from_units(5), Time::from_units(10));
        assert!(!t.ready(Time::ZERO));
        assert!(t.ready(Time::from_units(10)));
        t.activate().unwrap();
        assert!(!t.ready(Time::from_units(10)));
        assert!(t.activate().is_err());
        t.finish(Time::from_units(12));
        assert!(t.ready(Time::from_units(12)));
        assert_eq!(t.remaining(), Some(Time::from_units(5)));
    }

    #[test]
    fn pending_start_scan() {
        let mut table = ThreadTable::new();
        table.insert(Thread::new_work(
            ThreadId(0),
            ModuleId(0),
            Time::from_units(5),
            Time::from_units(10),
        ));
        table.insert(Thread::new_work(
            ThreadId(1),
            ModuleId(0),
            Time::from_units(5),
            Time::from_units(4),
        ));
        assert_eq!(table.next_pending_start(Time::ZERO), Some(Time::from_units(4)));
        assert_eq!(
            table.next_pending_start(Time::from_units(4)),
            Some(Time::from_units(10))
        );
        assert_eq!(table.next_pending_start(Time::from_units(10)), None);
        assert!(table.any_unfinished());
    }
}
