/*
 * Scheduler Mechanism
 *
 * Separates scheduling policy from mechanism:
 *
 * - Policy: the algorithm interface (round-robin, FCFS, SJF) deciding
 *   which child thread runs next and for how long.
 * - SchedulerStep: the mechanism that drives a policy through the request
 *   protocol (query the clock, arm the timer, resume the child, react to
 *   how control came back) and keeps suspended child chains for later
 *   resumption.
 * - VcpuStep: the trampoline that makes a child module's scheduler appear
 *   as an ordinary thread of its parent.
 *
 * Policies interact with the simulation only through the SchedView
 * capability; they never touch thread or chain state directly.
 */

use std::collections::BTreeMap;

use crate::error::SimResult;
use crate::sched::context::ContextChain;
use crate::sched::policies::{FcfsPolicy, RoundRobinPolicy, SjfPolicy};
use crate::sched::request::{Computation, Reply, Request};
use crate::sched::types::{ModuleId, ThreadKey};
use crate::sched::world::Tables;
use crate::time::Time;

/// Dispatch decision made by a scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Child to run next (`None` = nothing runnable, go idle).
    pub next: Option<ThreadKey>,
    /// Time slice to arm before handing control down; `None` = no timer.
    pub timeslice: Option<Time>,
}

impl Decision {
    pub fn run_thread(key: ThreadKey, timeslice: Option<Time>) -> Decision {
        Decision {
            next: Some(key),
            timeslice,
        }
    }

    pub fn idle() -> Decision {
        Decision {
            next: None,
            timeslice: None,
        }
    }
}

/// Read-only view policies use to inspect candidate children.
pub trait SchedView {
    fn now(&self) -> Time;

    /// Whether `key` can be dispatched right now: it has work left, has
    /// started, is not parked after idling at the current instant, and is
    /// either inactive or suspended under this scheduler.
    fn is_eligible(&self, key: ThreadKey) -> bool;

    /// Remaining workload; `None` for unbounded (VCPU) children.
    fn remaining(&self, key: ThreadKey) -> Option<Time>;

    fn start_time(&self, key: ThreadKey) -> Time;
}

/// Scheduling policy interface.
///
/// The mechanism calls `init` once with the module's children, then
/// alternates `pick_next` with exactly one outcome hook per dispatch.
pub trait Policy {
    fn name(&self) -> &'static str;

    fn init(&mut self, children: &[ThreadKey]);

    fn pick_next(&mut self, view: &dyn SchedView) -> Decision;

    /// The dispatched child was preempted by a timer and still has work.
    fn on_preempt(&mut self, _child: ThreadKey) {}

    /// The dispatched child went idle.
    fn on_idle(&mut self, _child: ThreadKey) {}

    /// The dispatched child ran its workload to completion.
    fn on_finish(&mut self, _child: ThreadKey) {}
}

/// Selectable policy, used to build fresh policy instances whenever a
/// scheduler activation starts from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    RoundRobin { slice: Time },
    Fcfs,
    Sjf,
}

impl PolicyKind {
    pub fn build(&self) -> Box<dyn Policy> {
        match self {
            PolicyKind::RoundRobin { slice } => Box::new(RoundRobinPolicy::new(*slice)),
            PolicyKind::Fcfs => Box::new(FcfsPolicy::new()),
            PolicyKind::Sjf => Box::new(SjfPolicy::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::RoundRobin { .. } => "round-robin",
            PolicyKind::Fcfs => "fcfs",
            PolicyKind::Sjf => "sjf",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SchedState {
    /// About to ask for the clock.
    QueryTime,
    /// Clock answer pending; run the policy on it.
    Decide,
    /// Timer armed; resume the chosen child next.
    Dispatch { child: ThreadKey },
    /// Child dispatched; waiting for control to come back.
    AwaitChild { child: ThreadKey },
}

/// The scheduler computation: drives one module's policy.
pub struct SchedulerStep {
    module: ModuleId,
    policy: Box<dyn Policy>,
    /// Whether this scheduler may arm timers. Under kernel-only timers
    /// this is true for the kernel scheduler alone.
    emit_timers: bool,
    /// Suspended sub-chains of preempted or idled children, keyed by the
    /// child that owns each chain's bottom context.
    stashed: BTreeMap<ThreadKey, ContextChain>,
    /// Children that idled at the stamped instant; skipped until the
    /// clock moves on.
    parked: BTreeMap<ThreadKey, Option<Time>>,
    state: SchedState,
    initialised: bool,
}

impl SchedulerStep {
    pub fn new(module: ModuleId, policy: Box<dyn Policy>, emit_timers: bool) -> SchedulerStep {
        SchedulerStep {
            module,
            policy,
            emit_timers,
            stashed: BTreeMap::new(),
            parked: BTreeMap::new(),
            state: SchedState::QueryTime,
            initialised: false,
        }
    }

    /// Stored chain for `child` if it was suspended, or a fresh singleton.
    fn chain_for(&mut self, child: ThreadKey, tables: &mut Tables) -> SimResult<ContextChain> {
        match self.stashed.remove(&child) {
            Some(chain) => Ok(chain),
            None => ContextChain::from_thread(child, tables),
        }
    }
}

impl Computation for SchedulerStep {
    fn step(&mut self, tables: &mut Tables, reply: Reply) -> SimResult<Request> {
        let mut reply = Some(reply);
        loop {
            match self.state {
                SchedState::QueryTime => {
                    self.state = SchedState::Decide;
                    return Ok(Request::CurrentTime);
                }
                SchedState::Decide => {
                    let now = match reply.take() {
                        Some(Reply::Time(t)) => t,
                        _ => panic!("scheduler resumed without a time answer"),
                    };
                    if !self.initialised {
                        self.policy.init(tables.modules.get(self.module).threads());
                        self.initialised = true;
                    }
                    // Stamp fresh parks, drop stale ones.
                    for value in self.parked.values_mut() {
                        if value.is_none() {
                            *value = Some(now);
                        }
                    }
                    self.parked.retain(|_, v| *v == Some(now));

                    let view = SchedViewImpl {
                        tables: &*tables,
                        now,
                        stashed: &self.stashed,
                        parked: &self.parked,
                    };
                    let decision = self.policy.pick_next(&view);
                    match decision.next {
                        None => {
                            log::debug!(
                                "[{} scheduler] no eligible child at {}",
                                self.policy.name(),
                                now
                            );
                            self.state = SchedState::QueryTime;
                            return Ok(Request::Idle);
                        }
                        Some(child) => {
                            if self.emit_timers {
                                if let Some(slice) = decision.timeslice {
                                    self.state = SchedState::Dispatch { child };
                                    return Ok(Request::Timer(Some(slice)));
                                }
                            }
                            self.state = SchedState::AwaitChild { child };
                            return Ok(Request::Resume(self.chain_for(child, tables)?));
                        }
                    }
                }
                SchedState::Dispatch { child } => {
                    reply.take();
                    self.state = SchedState::AwaitChild { child };
                    return Ok(Request::Resume(self.chain_for(child, tables)?));
                }
                SchedState::AwaitChild { child } => {
                    let r = reply.take().unwrap_or(Reply::Resumed);
                    let idled = matches!(&r, Reply::Idled(_));
                    match r {
                        Reply::Preempted(Some(tail)) | Reply::Idled(Some(tail)) => {
                            self.stashed.insert(child, tail);
                        }
                        _ => {}
                    }
                    if tables.threads.get(child).is_finished() {
                        debug_assert!(!self.stashed.contains_key(&child));
                        self.policy.on_finish(child);
                    } else if idled {
                        self.parked.insert(child, None);
                        self.policy.on_idle(child);
                    } else {
                        self.policy.on_preempt(child);
                    }
                    self.state = SchedState::QueryTime;
                }
            }
        }
    }

    fn release(&mut self, now: Time, tables: &mut Tables) {
        for (_, chain) in core::mem::take(&mut self.stashed) {
            chain.finish(now, tables);
        }
        self.parked.clear();
    }
}

struct SchedViewImpl<'a> {
    tables: &'a Tables,
    now: Time,
    stashed: &'a BTreeMap<ThreadKey, ContextChain>,
    parked: &'a BTreeMap<ThreadKey, Option<Time>>,
}

impl SchedView for SchedViewImpl<'_> {
    fn now(&self) -> Time {
        self.now
    }

    fn is_eligible(&self, key: ThreadKey) -> bool {
        let thread = self.tables.threads.get(key);
        if thread.is_finished() || thread.start_time() > self.now {
            return false;
        }
        if self.parked.contains_key(&key) {
            return false;
        }
        !thread.is_active() || self.stashed.contains_key(&key)
    }

    fn remaining(&self, key: ThreadKey) -> Option<Time> {
        self.tables.threads.get(key).remaining()
    }

    fn start_time(&self, key: ThreadKey) -> Time {
        self.tables.threads.get(key).start_time()
    }
}

/// VCPU trampoline: resumes the child module's scheduler chain when
/// executed, stashes it across preemptions, and idles upward when the
/// child module has nothing to run.
pub struct VcpuStep {
    child: ModuleId,
    stash: Option<ContextChain>,
    waiting: bool,
}

impl VcpuStep {
    pub fn new(child: ModuleId) -> VcpuStep {
        VcpuStep {
            child,
            stash: None,
            waiting: false,
        }
    }
}

impl Computation for VcpuStep {
    fn step(&mut self, tables: &mut Tables, reply: Reply) -> SimResult<Request> {
        if self.waiting {
            self.waiting = false;
            match reply {
                Reply::Preempted(Some(tail)) | Reply::Idled(Some(tail)) => {
                    self.stash = Some(tail);
                }
                _ => {}
            }
            return Ok(Request::Idle);
        }
        let chain = match self.stash.take() {
            Some(chain) => chain,
            None => {
                let scheduler = tables
                    .modules
                    .get(self.child)
                    .scheduler()
                    .expect("child module has a scheduler");
                ContextChain::from_thread(scheduler, tables)?
            }
        };
        self.waiting = true;
        Ok(Request::Resume(chain))
    }

    fn release(&mut self, now: Time, tables: &mut Tables) {
        if let Some(chain) = self.stash.take() {
            chain.finish(now, tables);
        }
        self.waiting = false;
    }
}
