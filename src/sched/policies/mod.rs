/*
 * Scheduling Policies
 *
 * Concrete policy implementations, each pluggable into the scheduler
 * mechanism through the Policy trait:
 * - RoundRobin: FIFO rotation with a fixed time slice (preemptive)
 * - Fcfs: first-come-first-served by start time, run to completion
 * - Sjf: shortest remaining workload first, non-preemptive
 */

pub mod fcfs;
pub mod round_robin;
pub mod sjf;

pub use fcfs::FcfsPolicy;
pub use round_robin::RoundRobinPolicy;
pub use sjf::SjfPolicy;
