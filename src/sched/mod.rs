/*
 * Hierarchical Scheduling Engine
 *
 * The simulation subsystem: exact-time context chains, the request
 * protocol between computations and the core, the scheduler mechanism
 * with pluggable policies, and the world driver.
 *
 * Dependency order, leaves first: types -> request/context ->
 * thread/module -> scheduler/policies -> core -> world.
 */

pub mod context;
pub mod core;
pub mod module;
pub mod policies;
pub mod request;
pub mod scheduler;
pub mod thread;
pub mod types;
pub mod world;

pub use self::context::{Context, ContextChain, MAX_CHAIN_DEPTH};
pub use self::core::{Core, CoreStats, TimerMode};
pub use self::module::{Module, ModuleTable};
pub use self::request::{Computation, ExecuteSpan, Reply, Request};
pub use self::scheduler::{Decision, Policy, PolicyKind, SchedView};
pub use self::thread::{Thread, ThreadKind, ThreadStats, ThreadTable, TimeSample};
pub use self::types::{CoreUid, ModuleId, Relationship, ThreadId, ThreadKey, ThreadRef};
pub use self::world::{Tables, World, WorldBuilder};
