/*
 * First-Come-First-Served Policy
 *
 * Runs children to completion in start-time order (ties by key). Arms no
 * timer, so a dispatched child keeps the processor until it finishes,
 * idles, or an ancestor's timer preempts the whole subtree.
 */

use crate::sched::scheduler::{Decision, Policy, SchedView};
use crate::sched::types::ThreadKey;

pub struct FcfsPolicy {
    children: Vec<ThreadKey>,
}

impl FcfsPolicy {
    pub fn new() -> FcfsPolicy {
        FcfsPolicy {
            children: Vec::new(),
        }
    }
}

impl Default for FcfsPolicy {
    fn default() -> Self {
        FcfsPolicy::new()
    }
}

impl Policy for FcfsPolicy {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn init(&mut self, children: &[ThreadKey]) {
        self.children = children.to_vec();
    }

    fn pick_next(&mut self, view: &dyn SchedView) -> Decision {
        self.children
            .iter()
            .copied()
            .filter(|&k| view.is_eligible(k))
            .min_by_key(|&k| (view.start_time(k), k))
            .map(|k| Decision::run_thread(k, None))
            .unwrap_or_else(Decision::idle)
    }
}
