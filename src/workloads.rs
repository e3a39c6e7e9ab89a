/*
 * Canned Workloads
 *
 * Example worlds the CLI and the end-to-end tests drive. Each returns a
 * freshly built World; identical parameters always produce identical
 * event streams.
 */

use crate::error::SimResult;
use crate::sched::{PolicyKind, TimerMode, World};
use crate::time::Time;

/// One FCFS kernel scheduler with a single 10-unit thread.
pub fn single(mode: TimerMode, switch_cost: Time) -> SimResult<World> {
    let mut builder = World::builder().timer_mode(mode).switch_cost(switch_cost);
    let root = builder.add_module(None);
    builder.add_scheduler(root, PolicyKind::Fcfs);
    builder.add_thread(root, Time::from_units(10), Time::ZERO);
    builder.build()
}

/// Round-robin over two threads (5 and 4 units of work) with slice 3.
pub fn round_robin_pair(mode: TimerMode, switch_cost: Time) -> SimResult<World> {
    let mut builder = World::builder().timer_mode(mode).switch_cost(switch_cost);
    let root = builder.add_module(None);
    builder.add_scheduler(
        root,
        PolicyKind::RoundRobin {
            slice: Time::from_units(3),
        },
    );
    builder.add_thread(root, Time::from_units(5), Time::ZERO);
    builder.add_thread(root, Time::from_units(4), Time::ZERO);
    builder.build()
}

/// Two-level hierarchy: the kernel runs a VCPU into a child module whose
/// round-robin scheduler (slice 1) drives two 2-unit threads. The kernel
/// slice is 5, so under kernel-only timers the whole child subtree is
/// torn down when it elapses.
pub fn two_level(mode: TimerMode, switch_cost: Time) -> SimResult<World> {
    let mut builder = World::builder().timer_mode(mode).switch_cost(switch_cost);
    let root = builder.add_module(None);
    builder.add_scheduler(
        root,
        PolicyKind::RoundRobin {
            slice: Time::from_units(5),
        },
    );
    let child = builder.add_module(Some(root));
    builder.add_scheduler(
        child,
        PolicyKind::RoundRobin {
            slice: Time::from_units(1),
        },
    );
    builder.add_vcpu(root, child);
    builder.add_thread(child, Time::from_units(2), Time::ZERO);
    builder.add_thread(child, Time::from_units(2), Time::ZERO);
    builder.build()
}

/// A single 5-unit thread that only becomes ready at t=10; the core idles
/// forward to it.
pub fn delayed_start(mode: TimerMode, switch_cost: Time) -> SimResult<World> {
    let mut builder = World::builder().timer_mode(mode).switch_cost(switch_cost);
    let root = builder.add_module(None);
    builder.add_scheduler(root, PolicyKind::Fcfs);
    builder.add_thread(root, Time::from_units(5), Time::from_units(10));
    builder.build()
}

/// Shortest-job-first over three threads of unequal length.
pub fn shortest_job_first(mode: TimerMode, switch_cost: Time) -> SimResult<World> {
    let mut builder = World::builder().timer_mode(mode).switch_cost(switch_cost);
    let root = builder.add_module(None);
    builder.add_scheduler(root, PolicyKind::Sjf);
    builder.add_thread(root, Time::from_units(7), Time::ZERO);
    builder.add_thread(root, Time::from_units(2), Time::ZERO);
    builder.add_thread(root, Time::from_units(4), Time::ZERO);
    builder.build()
}
