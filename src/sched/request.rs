/*
 * Request Protocol
 *
 * Requests are what suspendable computations (threads, schedulers, VCPUs)
 * hand to the core; replies are what the core passes back in on the next
 * step. Producing a request is the only suspension point a computation has:
 * the core performs exactly one request per step, and a computation that
 * ends without `Finish` is a fatal error.
 */

use crate::error::SimResult;
use crate::sched::context::ContextChain;
use crate::sched::world::Tables;
use crate::time::Time;

/// How much processor time an `Execute` request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteSpan {
    /// Run for exactly this long (must be positive), or less if a timer or
    /// the thread's remaining work cuts it short.
    For(Time),
    /// Run until the next timer elapses or the workload runs out.
    UntilTimer,
}

/// A single request pulled out of a computation.
#[derive(Debug)]
pub enum Request {
    /// Consume processor time at the requesting (top) context.
    Execute(ExecuteSpan),
    /// Set the requesting context's timeout; `None` clears it.
    Timer(Option<Time>),
    /// No runnable child; surrender the remaining budget upward.
    Idle,
    /// Append a sub-chain on top of the core's chain; control follows into
    /// its top context.
    Resume(ContextChain),
    /// Ask for the core's clock; answered with [`Reply::Time`].
    CurrentTime,
    /// Terminal: the requesting thread is done.
    Finish,
}

impl Request {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Execute(_) => "Execute",
            Request::Timer(_) => "Timer",
            Request::Idle => "Idle",
            Request::Resume(_) => "Resume",
            Request::CurrentTime => "CurrentTime",
            Request::Finish => "Finish",
        }
    }
}

/// The core's answer to the previous request, delivered on the next step
/// of whichever context is then on top.
#[derive(Debug)]
pub enum Reply {
    /// The previous request was carried out; nothing else to report.
    Resumed,
    /// Answer to [`Request::CurrentTime`].
    Time(Time),
    /// The dispatched child was preempted by an elapsed timer. The payload
    /// is the split-off tail to resume later; `None` when the tail was
    /// finished and discarded (kernel-only timers).
    Preempted(Option<ContextChain>),
    /// The dispatched child went idle and its activation was popped. Same
    /// payload convention as `Preempted`.
    Idled(Option<ContextChain>),
    /// The dispatched child ran its workload to completion.
    Finished,
}

/// A suspendable computation, modeled as an explicit state machine.
///
/// `step` consumes the reply to the previous request and produces the next
/// one. Moving the owning context between chains never restarts the
/// computation; only `release` (driven by `Thread::finish`) discards
/// in-progress state.
pub trait Computation {
    fn step(&mut self, tables: &mut Tables, reply: Reply) -> SimResult<Request>;

    /// Drop state held across suspensions (stashed sub-chains), finishing
    /// any threads still activated through it.
    fn release(&mut self, _now: Time, _tables: &mut Tables) {}
}
