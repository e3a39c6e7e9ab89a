/*
 * Module Hierarchy
 *
 * A module is a node in the scheduling hierarchy: it owns a set of threads
 * and exactly one scheduler thread. Modules live in an id-indexed arena
 * owned by the World; parent/child links are ids, never references.
 */

use crate::sched::types::{ModuleId, ThreadId, ThreadKey};

/// One node of the hierarchy.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    parent: Option<ModuleId>,
    threads: Vec<ThreadKey>,
    scheduler: Option<ThreadKey>,
    next_tid: u32,
}

impl Module {
    fn new(id: ModuleId, parent: Option<ModuleId>) -> Module {
        Module {
            id,
            parent,
            threads: Vec::new(),
            scheduler: None,
            next_tid: 0,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn parent(&self) -> Option<ModuleId> {
        self.parent
    }

    /// Threads the module's scheduler selects between, in registration
    /// order. Does not include the scheduler thread itself.
    pub fn threads(&self) -> &[ThreadKey] {
        &self.threads
    }

    pub fn scheduler(&self) -> Option<ThreadKey> {
        self.scheduler
    }

    pub fn alloc_tid(&mut self) -> ThreadId {
        let tid = ThreadId(self.next_tid);
        self.next_tid += 1;
        tid
    }

    pub fn register_thread(&mut self, key: ThreadKey) {
        self.threads.push(key);
    }

    pub fn set_scheduler(&mut self, key: ThreadKey) {
        self.scheduler = Some(key);
    }
}

/// Arena of modules, indexed by [`ModuleId`].
#[derive(Debug, Default)]
pub struct ModuleTable {
    modules: Vec<Module>,
}

impl ModuleTable {
    pub fn new() -> ModuleTable {
        ModuleTable::default()
    }

    pub fn add(&mut self, parent: Option<ModuleId>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module::new(id, parent));
        id
    }

    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }
}
