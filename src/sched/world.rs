/*
 * World - Outer Driver
 *
 * The World owns the module/thread arenas and the cores, and advances the
 * simulation one atomic core operation at a time until every core is
 * done. On a fatal error it reports a core failure and stops all cores;
 * there is no recovery.
 */

use crate::error::{SimError, SimResult};
use crate::events::{Event, EventSink};
use crate::sched::core::{Core, TimerMode};
use crate::sched::module::ModuleTable;
use crate::sched::scheduler::PolicyKind;
use crate::sched::thread::{Thread, ThreadTable};
use crate::sched::types::{CoreUid, ModuleId, ThreadKey, ThreadRef};
use crate::time::Time;

/// The id-indexed arenas every component looks things up through.
#[derive(Debug, Default)]
pub struct Tables {
    pub modules: ModuleTable,
    pub threads: ThreadTable,
}

impl Tables {
    pub fn new() -> Tables {
        Tables::default()
    }

    pub fn thread_ref(&self, key: ThreadKey) -> ThreadRef {
        self.threads.get(key).thread_ref()
    }
}

/// The complete simulation: hierarchy, threads and cores.
pub struct World {
    tables: Tables,
    cores: Vec<Core>,
}

impl World {
    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// Advance every unfinished core by one atomic operation. Returns
    /// whether any core is still running.
    pub fn step(&mut self, sink: &mut dyn EventSink) -> SimResult<bool> {
        let mut any_running = false;
        let mut failure: Option<SimError> = None;
        for core in &mut self.cores {
            if core.is_finished() {
                continue;
            }
            match core.execute(&mut self.tables, sink) {
                Ok(running) => any_running |= running,
                Err(err) => {
                    let _ = sink.emit(&Event::CoreFailure {
                        core: core.uid(),
                        reason: err.to_string(),
                    });
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            for core in &mut self.cores {
                core.halt();
            }
            return Err(err);
        }
        Ok(any_running)
    }

    /// Drive the simulation to completion and emit final statistics.
    pub fn run(&mut self, sink: &mut dyn EventSink) -> SimResult<()> {
        log::info!("starting simulation with {} core(s)", self.cores.len());
        while self.step(sink)? {}
        self.emit_statistics(sink)?;
        sink.flush()
    }

    fn emit_statistics(&self, sink: &mut dyn EventSink) -> SimResult<()> {
        for (_, thread) in self.tables.threads.iter() {
            sink.emit(&Event::ThreadStatistics {
                thread: thread.thread_ref(),
                stats: thread.stats().clone(),
            })?;
        }
        for core in &self.cores {
            sink.emit(&Event::CoreStatistics {
                core: core.uid(),
                stats: core.stats().clone(),
            })?;
        }
        Ok(())
    }
}

/// Assembles a world: modules first, then their schedulers and threads.
///
/// Module 0 is the kernel module; its scheduler roots the core's chain.
pub struct WorldBuilder {
    tables: Tables,
    mode: TimerMode,
    switch_cost: Time,
    schedulers: Vec<(ModuleId, ThreadKey)>,
}

impl WorldBuilder {
    pub fn new() -> WorldBuilder {
        WorldBuilder {
            tables: Tables::new(),
            mode: TimerMode::Local,
            switch_cost: Time::ZERO,
            schedulers: Vec::new(),
        }
    }

    pub fn timer_mode(mut self, mode: TimerMode) -> WorldBuilder {
        self.mode = mode;
        self
    }

    /// Cost of context switches that cross a module boundary.
    pub fn switch_cost(mut self, cost: Time) -> WorldBuilder {
        self.switch_cost = cost;
        self
    }

    pub fn add_module(&mut self, parent: Option<ModuleId>) -> ModuleId {
        self.tables.modules.add(parent)
    }

    pub fn add_scheduler(&mut self, module: ModuleId, policy: PolicyKind) -> ThreadKey {
        let tid = self.tables.modules.get_mut(module).alloc_tid();
        let key = self
            .tables
            .threads
            .insert(Thread::new_scheduler(tid, module, policy));
        self.tables.modules.get_mut(module).set_scheduler(key);
        self.schedulers.push((module, key));
        key
    }

    pub fn add_thread(&mut self, module: ModuleId, remaining: Time, start_time: Time) -> ThreadKey {
        let tid = self.tables.modules.get_mut(module).alloc_tid();
        let key = self
            .tables
            .threads
            .insert(Thread::new_work(tid, module, remaining, start_time));
        self.tables.modules.get_mut(module).register_thread(key);
        key
    }

    /// Register a VCPU thread in `module` that trampolines into `child`'s
    /// scheduler.
    pub fn add_vcpu(&mut self, module: ModuleId, child: ModuleId) -> ThreadKey {
        let tid = self.tables.modules.get_mut(module).alloc_tid();
        let key = self
            .tables
            .threads
            .insert(Thread::new_vcpu(tid, module, child));
        self.tables.modules.get_mut(module).register_thread(key);
        key
    }

    /// # Panics
    /// Panics if no module was added or a module lacks a scheduler
    /// (configuration errors).
    pub fn build(mut self) -> SimResult<World> {
        assert!(
            !self.tables.modules.is_empty(),
            "world needs at least the kernel module"
        );
        for module in self.tables.modules.iter() {
            assert!(
                module.scheduler().is_some(),
                "{} has no scheduler",
                module.id()
            );
        }
        let root = ModuleId(0);
        for (module, key) in &self.schedulers {
            let allowed = self.mode == TimerMode::Local || *module == root;
            self.tables.threads.get_mut(*key).set_emit_timers(allowed);
        }
        let kernel = match self.tables.modules.get(root).scheduler() {
            Some(key) => key,
            None => unreachable!("checked above"),
        };
        let core = Core::new(
            CoreUid(0),
            self.switch_cost,
            self.mode,
            kernel,
            &mut self.tables,
        )?;
        Ok(World {
            tables: self.tables,
            cores: vec![core],
        })
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        WorldBuilder::new()
    }
}
