/*
 * Error Taxonomy
 *
 * Fatal simulation errors surface through this enum; the World reacts by
 * emitting a core_failure event and stopping all cores. True programming
 * errors (elapsing a chain past an expired timer, double-activating a
 * thread) abort via assertions instead, matching the recovery policy:
 * the simulator's value is deterministic reproduction, not resilience.
 */

use thiserror::Error;

use crate::sched::types::ThreadRef;

#[derive(Debug, Error)]
pub enum SimError {
    /// Appending would push the chain past its maximum depth. Indicates an
    /// over-deep module hierarchy.
    #[error("context chain overflow appending {thread}")]
    ChainOverflow { thread: ThreadRef },

    #[error("context index {index} out of range for chain of length {len}")]
    IndexError { index: isize, len: usize },

    /// A scheduler or thread computation produced a request with an illegal
    /// payload (for example `Execute` over an empty span).
    #[error("malformed request from {thread}: {detail}")]
    MalformedRequest { thread: ThreadRef, detail: String },

    /// Under kernel-only timers, a non-kernel context asked for a timer.
    #[error("timer request from context {index}, but only the kernel context may set timers")]
    TimerForbidden { index: usize },

    /// A thread would appear twice on a chain.
    #[error("{thread} is already active on a chain")]
    DuplicateThread { thread: ThreadRef },

    #[error("no elapsed timer in chain")]
    NoElapsedTimer,

    #[error("event log I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("event log codec: {0}")]
    Codec(#[from] bincode::Error),
}

pub type SimResult<T> = Result<T, SimError>;
