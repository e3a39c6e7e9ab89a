/*
 * Scheduler Type Definitions
 *
 * Lightweight, Copy-able identifier types used throughout the simulator.
 * Modules and threads live in id-indexed arenas owned by the World; these
 * ids are the only way components refer to each other.
 */

use core::fmt;

use serde::{Deserialize, Serialize};

/// Module identifier: index into the World's module table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({})", self.0)
    }
}

/// Thread identifier, unique within its owning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Global arena index of a thread in the World's thread table.
///
/// Distinct from [`ThreadId`]: keys are world-wide and are what contexts,
/// chains and policies carry around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadKey(pub u32);

impl ThreadKey {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Core identifier. Single-core in scope, so this is always `CoreUid(0)`,
/// but every event carries it so multi-core streams stay mergeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreUid(pub u32);

impl fmt::Display for CoreUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Core({})", self.0)
    }
}

/// Identity of a thread as it appears in the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub module: ModuleId,
    pub thread: ThreadId,
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}.t{}", self.module.0, self.thread.0)
    }
}

/// Relationship of a chain entry to the entry below it.
///
/// `Sibling` when both threads belong to the same module, `Child` when the
/// upper thread is the VCPU entry of a child module. The bottom entry of a
/// chain is always `Child` (of the synthetic root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    Child,
    Sibling,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relationship::Child => write!(f, "child"),
            Relationship::Sibling => write!(f, "sibling"),
        }
    }
}
