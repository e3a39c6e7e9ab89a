/*
 * Context Chain
 *
 * A context is one live activation: a thread, its in-progress computation
 * and a per-context timeout. The chain is the stack of nested activations
 * driving one core, bottom (kernel scheduler) to top (currently executing).
 *
 * Invariants maintained by every operation:
 * - TIMER-CACHE: `next_timeout` equals the minimum of all set timeouts.
 * - All contexts are distinct instances; a split leaves no aliasing.
 * - `len <= MAX_CHAIN_DEPTH`.
 */

use core::fmt;
use core::ops::Range;

use heapless::Vec as BoundedVec;

use crate::error::{SimError, SimResult};
use crate::sched::request::{Computation, Reply, Request};
use crate::sched::types::ThreadKey;
use crate::sched::world::Tables;
use crate::time::Time;

/// Maximum chain depth. Exceeding it is fatal and indicates an over-deep
/// module hierarchy.
pub const MAX_CHAIN_DEPTH: usize = 32;

/// One activation record on a chain.
pub struct Context {
    thread: ThreadKey,
    computation: Box<dyn Computation>,
    timeout: Option<Time>,
}

impl Context {
    pub fn new(thread: ThreadKey, computation: Box<dyn Computation>) -> Context {
        Context {
            thread,
            computation,
            timeout: None,
        }
    }

    pub fn thread(&self) -> ThreadKey {
        self.thread
    }

    pub fn timeout(&self) -> Option<Time> {
        self.timeout
    }

    /// Advance the computation by one request.
    pub fn step(&mut self, tables: &mut Tables, reply: Reply) -> SimResult<Request> {
        self.computation.step(tables, reply)
    }

    pub(crate) fn release(&mut self, now: Time, tables: &mut Tables) {
        self.computation.release(now, tables);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("thread", &self.thread)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Ordered stack of contexts with a cached aggregate timeout.
pub struct ContextChain {
    contexts: BoundedVec<Context, MAX_CHAIN_DEPTH>,
    next_timeout: Option<Time>,
}

impl ContextChain {
    fn empty() -> ContextChain {
        ContextChain {
            contexts: BoundedVec::new(),
            next_timeout: None,
        }
    }

    /// Singleton chain around an existing context.
    pub fn from_context(ctx: Context) -> ContextChain {
        let mut chain = ContextChain::empty();
        chain.next_timeout = ctx.timeout;
        if chain.contexts.push(ctx).is_err() {
            unreachable!("singleton chain fits");
        }
        chain
    }

    /// Singleton chain with a fresh context for `thread`. Activates the
    /// thread; fails if it is already activated elsewhere.
    pub fn from_thread(thread: ThreadKey, tables: &mut Tables) -> SimResult<ContextChain> {
        tables.threads.get_mut(thread).activate()?;
        let computation = tables.threads.get(thread).spawn_computation(thread);
        Ok(ContextChain::from_context(Context::new(thread, computation)))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// The currently executing activation.
    pub fn top(&self) -> Option<&Context> {
        self.contexts.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Context> {
        self.contexts.last_mut()
    }

    pub fn bottom(&self) -> Option<&Context> {
        self.contexts.first()
    }

    /// Context below the top, or `None` if the chain is shorter than two.
    pub fn parent(&self) -> Option<&Context> {
        let len = self.contexts.len();
        if len < 2 {
            None
        } else {
            self.contexts.get(len - 2)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.contexts.iter()
    }

    /// Thread at `index`; negative indices count from the back.
    pub fn thread_at(&self, index: isize) -> SimResult<ThreadKey> {
        let len = self.contexts.len();
        let resolved = if index < 0 {
            len as isize + index
        } else {
            index
        };
        if resolved < 0 || resolved >= len as isize {
            return Err(SimError::IndexError { index, len });
        }
        Ok(self.contexts[resolved as usize].thread)
    }

    pub fn contains_thread(&self, thread: ThreadKey) -> bool {
        self.contexts.iter().any(|c| c.thread == thread)
    }

    /// Cached minimum over all set timeouts, or `None` when no context has
    /// a timer.
    pub fn next_timeout(&self) -> Option<Time> {
        self.next_timeout
    }

    /// Assign the timeout of the context at `index`, updating the cache
    /// incrementally; the cache is recomputed only when the overwritten
    /// value may have been the minimum.
    pub fn set_timer(&mut self, delta: Option<Time>, index: usize) -> SimResult<()> {
        let len = self.contexts.len();
        let ctx = self
            .contexts
            .get_mut(index)
            .ok_or(SimError::IndexError {
                index: index as isize,
                len,
            })?;
        let previous = core::mem::replace(&mut ctx.timeout, delta);
        match (self.next_timeout, delta) {
            (None, _) => self.next_timeout = delta,
            (Some(cache), Some(d)) if d < cache => self.next_timeout = Some(d),
            (Some(cache), _) if previous == Some(cache) => self.recompute_next_timeout(),
            _ => {}
        }
        Ok(())
    }

    /// Splice `tail` on top of `self`, consuming it. Returns the index
    /// range of the newly appended contexts for logging.
    pub fn append_chain(&mut self, tail: ContextChain, tables: &Tables) -> SimResult<Range<usize>> {
        let start = self.contexts.len();
        if start + tail.contexts.len() > MAX_CHAIN_DEPTH {
            let thread = tail.contexts[0].thread;
            return Err(SimError::ChainOverflow {
                thread: tables.thread_ref(thread),
            });
        }
        for ctx in tail.contexts.iter() {
            if self.contains_thread(ctx.thread) {
                return Err(SimError::DuplicateThread {
                    thread: tables.thread_ref(ctx.thread),
                });
            }
        }
        self.next_timeout = match (self.next_timeout, tail.next_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for ctx in tail.contexts {
            if self.contexts.push(ctx).is_err() {
                unreachable!("chain capacity checked before append");
            }
        }
        Ok(start..self.contexts.len())
    }

    /// Subtract `delta` from every set timeout, scanning bottom to top and
    /// stopping as soon as a timeout reaches zero; later contexts keep
    /// their values and are handled on a subsequent tick.
    ///
    /// # Panics
    /// Panics if a timer has already elapsed or `delta` exceeds
    /// `next_timeout` (programming errors).
    pub fn elapse(&mut self, delta: Time) {
        if delta.is_zero() {
            return;
        }
        let Some(next) = self.next_timeout else {
            return;
        };
        assert!(!next.is_zero(), "elapsing a chain with an expired timer");
        assert!(delta <= next, "elapse beyond the chain's next timeout");
        for ctx in self.contexts.iter_mut() {
            if let Some(t) = ctx.timeout {
                let rest = t - delta;
                ctx.timeout = Some(rest);
                if rest.is_zero() {
                    break;
                }
            }
        }
        self.next_timeout = Some(next - delta);
    }

    /// Lowest index whose timer has elapsed.
    pub fn find_elapsed_timer(&self) -> SimResult<usize> {
        self.contexts
            .iter()
            .position(|c| c.timeout == Some(Time::ZERO))
            .ok_or(SimError::NoElapsedTimer)
    }

    /// Partition into `self = [0, index)` and a returned tail
    /// `[index, len)`. Both caches are recomputed from scratch.
    pub fn split(&mut self, index: usize) -> SimResult<ContextChain> {
        let len = self.contexts.len();
        if index > len {
            return Err(SimError::IndexError {
                index: index as isize,
                len,
            });
        }
        let mut reversed: BoundedVec<Context, MAX_CHAIN_DEPTH> = BoundedVec::new();
        while self.contexts.len() > index {
            if let Some(ctx) = self.contexts.pop() {
                if reversed.push(ctx).is_err() {
                    unreachable!("tail fits in its own chain");
                }
            }
        }
        let mut tail = ContextChain::empty();
        while let Some(ctx) = reversed.pop() {
            if tail.contexts.push(ctx).is_err() {
                unreachable!("tail fits in its own chain");
            }
        }
        self.recompute_next_timeout();
        tail.recompute_next_timeout();
        Ok(tail)
    }

    /// Terminate every activation in the chain, bottom to top, releasing
    /// suspended sub-chains along the way.
    pub fn finish(mut self, now: Time, tables: &mut Tables) {
        for ctx in self.contexts.iter_mut() {
            ctx.release(now, tables);
            tables.threads.get_mut(ctx.thread).finish(now);
        }
    }

    /// Account background time on every thread except the top's.
    pub fn run_background(&self, now: Time, delta: Time, tables: &mut Tables) {
        let len = self.contexts.len();
        for ctx in self.contexts.iter().take(len.saturating_sub(1)) {
            tables.threads.get_mut(ctx.thread).run_background(now, delta);
        }
    }

    fn recompute_next_timeout(&mut self) {
        self.next_timeout = self.contexts.iter().filter_map(|c| c.timeout).min();
    }
}

impl fmt::Debug for ContextChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextChain")
            .field("contexts", &self.contexts)
            .field("next_timeout", &self.next_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::scheduler::PolicyKind;
    use crate::sched::thread::Thread;
    use crate::sched::types::ThreadId;
    use proptest::prelude::*;

    /// Inert computation for chain-only tests.
    struct Stub;

    impl Computation for Stub {
        fn step(&mut self, _tables: &mut Tables, _reply: Reply) -> SimResult<Request> {
            Ok(Request::Idle)
        }
    }

    fn tables_with_threads(count: u32) -> Tables {
        let mut tables = Tables::new();
        let module = tables.modules.add(None);
        let scheduler = Thread::new_scheduler(
            ThreadId(0),
            module,
            PolicyKind::RoundRobin {
                slice: Time::from_units(1),
            },
        );
        let key = tables.threads.insert(scheduler);
        tables.modules.get_mut(module).set_scheduler(key);
        for i in 0..count {
            let tid = ThreadId(i + 1);
            let t = Thread::new_work(tid, module, Time::from_units(10), Time::ZERO);
            let key = tables.threads.insert(t);
            tables.modules.get_mut(module).register_thread(key);
        }
        tables
    }

    fn stub_chain(threads: &[u32]) -> ContextChain {
        let mut it = threads.iter();
        let first = *it.next().expect("at least one context");
        let mut chain = ContextChain::from_context(Context::new(ThreadKey(first), Box::new(Stub)));
        for &t in it {
            let tail = ContextChain::from_context(Context::new(ThreadKey(t), Box::new(Stub)));
            chain
                .append_chain(tail, &tables_with_threads(8))
                .expect("append");
        }
        chain
    }

    fn shape(chain: &ContextChain) -> Vec<(ThreadKey, Option<Time>)> {
        chain.iter().map(|c| (c.thread(), c.timeout())).collect()
    }

    fn recomputed_min(chain: &ContextChain) -> Option<Time> {
        chain.iter().filter_map(|c| c.timeout()).min()
    }

    #[test]
    fn set_timer_maintains_cache() {
        let mut chain = stub_chain(&[0, 1, 2]);
        assert_eq!(chain.next_timeout(), None);

        chain.set_timer(Some(Time::from_units(5)), 0).unwrap();
        assert_eq!(chain.next_timeout(), Some(Time::from_units(5)));

        // Lower value wins without a recompute.
        chain.set_timer(Some(Time::from_units(3)), 2).unwrap();
        assert_eq!(chain.next_timeout(), Some(Time::from_units(3)));

        // Overwriting the minimum forces a recompute.
        chain.set_timer(Some(Time::from_units(9)), 2).unwrap();
        assert_eq!(chain.next_timeout(), Some(Time::from_units(5)));

        // Clearing a non-minimum leaves the cache alone.
        chain.set_timer(None, 2).unwrap();
        assert_eq!(chain.next_timeout(), Some(Time::from_units(5)));

        chain.set_timer(None, 0).unwrap();
        assert_eq!(chain.next_timeout(), None);

        assert!(chain.set_timer(None, 7).is_err());
    }

    #[test]
    fn set_timer_is_idempotent() {
        let mut chain = stub_chain(&[0, 1]);
        chain.set_timer(Some(Time::from_units(4)), 1).unwrap();
        let before = (shape(&chain), chain.next_timeout());
        chain.set_timer(Some(Time::from_units(4)), 1).unwrap();
        assert_eq!((shape(&chain), chain.next_timeout()), before);
    }

    #[test]
    fn elapse_stops_at_first_expired_timer() {
        let mut chain = stub_chain(&[0, 1, 2]);
        chain.set_timer(Some(Time::from_units(2)), 0).unwrap();
        chain.set_timer(Some(Time::from_units(2)), 1).unwrap();
        chain.set_timer(Some(Time::from_units(5)), 2).unwrap();

        chain.elapse(Time::from_units(2));
        // The scan stops at index 0; indices 1 and 2 keep their values.
        assert_eq!(
            shape(&chain).iter().map(|(_, t)| *t).collect::<Vec<_>>(),
            vec![
                Some(Time::ZERO),
                Some(Time::from_units(2)),
                Some(Time::from_units(5))
            ]
        );
        assert_eq!(chain.next_timeout(), Some(Time::ZERO));
        assert_eq!(chain.find_elapsed_timer().unwrap(), 0);
    }

    #[test]
    fn elapse_zero_is_a_no_op() {
        let mut chain = stub_chain(&[0, 1]);
        chain.set_timer(Some(Time::from_units(3)), 1).unwrap();
        let before = (shape(&chain), chain.next_timeout());
        chain.elapse(Time::ZERO);
        assert_eq!((shape(&chain), chain.next_timeout()), before);
    }

    #[test]
    #[should_panic(expected = "expired")]
    fn elapse_with_expired_timer_is_fatal() {
        let mut chain = stub_chain(&[0]);
        chain.set_timer(Some(Time::from_units(1)), 0).unwrap();
        chain.elapse(Time::from_units(1));
        chain.elapse(Time::from_units(1));
    }

    #[test]
    #[should_panic(expected = "beyond")]
    fn elapse_past_next_timeout_is_fatal() {
        let mut chain = stub_chain(&[0]);
        chain.set_timer(Some(Time::from_units(1)), 0).unwrap();
        chain.elapse(Time::from_units(2));
    }

    #[test]
    fn split_then_append_restores_the_chain() {
        let tables = tables_with_threads(8);
        let mut chain = stub_chain(&[0, 1, 2, 3]);
        chain.set_timer(Some(Time::from_units(7)), 0).unwrap();
        chain.set_timer(Some(Time::from_units(4)), 2).unwrap();
        let before = (shape(&chain), chain.next_timeout());

        let tail = chain.split(2).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(chain.next_timeout(), Some(Time::from_units(7)));
        assert_eq!(tail.next_timeout(), Some(Time::from_units(4)));

        chain.append_chain(tail, &tables).unwrap();
        assert_eq!((shape(&chain), chain.next_timeout()), before);
    }

    #[test]
    fn split_at_len_yields_empty_tail() {
        let mut chain = stub_chain(&[0, 1]);
        let tail = chain.split(2).unwrap();
        assert!(tail.is_empty());
        assert_eq!(chain.len(), 2);
        assert!(chain.split(5).is_err());
    }

    #[test]
    fn append_past_capacity_is_fatal() {
        let tables = tables_with_threads(8);
        let keys: Vec<u32> = (0..MAX_CHAIN_DEPTH as u32).collect();
        let mut chain = stub_chain(&keys);
        let one = ContextChain::from_context(Context::new(ThreadKey(1), Box::new(Stub)));
        assert!(matches!(
            chain.append_chain(one, &tables),
            Err(SimError::ChainOverflow { .. })
        ));
    }

    #[test]
    fn append_rejects_duplicate_thread() {
        let tables = tables_with_threads(8);
        let mut chain = stub_chain(&[0, 1]);
        let dup = ContextChain::from_context(Context::new(ThreadKey(1), Box::new(Stub)));
        assert!(matches!(
            chain.append_chain(dup, &tables),
            Err(SimError::DuplicateThread { .. })
        ));
    }

    #[test]
    fn thread_at_supports_negative_indices() {
        let chain = stub_chain(&[0, 1, 2]);
        assert_eq!(chain.thread_at(0).unwrap(), ThreadKey(0));
        assert_eq!(chain.thread_at(-1).unwrap(), ThreadKey(2));
        assert_eq!(chain.thread_at(-3).unwrap(), ThreadKey(0));
        assert!(chain.thread_at(3).is_err());
        assert!(chain.thread_at(-4).is_err());
    }

    #[test]
    fn from_thread_activates_and_rejects_duplicates() {
        let mut tables = tables_with_threads(2);
        let key = ThreadKey(1);
        let chain = ContextChain::from_thread(key, &mut tables).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(tables.threads.get(key).is_active());
        assert!(matches!(
            ContextChain::from_thread(key, &mut tables),
            Err(SimError::DuplicateThread { .. })
        ));
    }

    proptest! {
        /// TIMER-CACHE holds under arbitrary set_timer/elapse/split/append
        /// sequences.
        #[test]
        fn cache_invariant_under_random_ops(ops in proptest::collection::vec((0usize..4, 0usize..6, 1u64..10), 1..40)) {
            let tables = tables_with_threads(8);
            let mut chain = stub_chain(&[0, 1, 2, 3, 4, 5]);
            for (op, index, value) in ops {
                match op {
                    0 => {
                        let _ = chain.set_timer(Some(Time::from_units(value)), index % chain.len());
                    }
                    1 => {
                        let _ = chain.set_timer(None, index % chain.len());
                    }
                    2 => {
                        if let Some(next) = chain.next_timeout() {
                            if !next.is_zero() {
                                let delta = Time::new(1, 2).min(next);
                                chain.elapse(delta);
                            }
                        }
                    }
                    _ => {
                        let at = 1 + index % chain.len();
                        if let Ok(tail) = chain.split(at) {
                            prop_assert_eq!(tail.next_timeout(), tail.iter().filter_map(|c| c.timeout()).min());
                            chain.append_chain(tail, &tables).unwrap();
                        }
                    }
                }
                prop_assert_eq!(chain.next_timeout(), recomputed_min(&chain));
            }
        }
    }
}
