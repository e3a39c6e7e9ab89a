/*
 * Shortest-Job-First Policy
 *
 * Picks the eligible child with the least remaining workload,
 * non-preemptively. Unbounded children (VCPUs) sort after all finite
 * workloads; ties break by start time, then key.
 */

use crate::sched::scheduler::{Decision, Policy, SchedView};
use crate::sched::types::ThreadKey;

pub struct SjfPolicy {
    children: Vec<ThreadKey>,
}

impl SjfPolicy {
    pub fn new() -> SjfPolicy {
        SjfPolicy {
            children: Vec::new(),
        }
    }
}

impl Default for SjfPolicy {
    fn default() -> Self {
        SjfPolicy::new()
    }
}

impl Policy for SjfPolicy {
    fn name(&self) -> &'static str {
        "sjf"
    }

    fn init(&mut self, children: &[ThreadKey]) {
        self.children = children.to_vec();
    }

    fn pick_next(&mut self, view: &dyn SchedView) -> Decision {
        self.children
            .iter()
            .copied()
            .filter(|&k| view.is_eligible(k))
            .min_by_key(|&k| {
                let remaining = view.remaining(k);
                (remaining.is_none(), remaining, view.start_time(k), k)
            })
            .map(|k| Decision::run_thread(k, None))
            .unwrap_or_else(Decision::idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Time;
    use std::collections::BTreeMap;

    struct FakeView {
        remaining: BTreeMap<ThreadKey, Option<Time>>,
    }

    impl SchedView for FakeView {
        fn now(&self) -> Time {
            Time::ZERO
        }

        fn is_eligible(&self, key: ThreadKey) -> bool {
            self.remaining.contains_key(&key)
        }

        fn remaining(&self, key: ThreadKey) -> Option<Time> {
            self.remaining[&key]
        }

        fn start_time(&self, _key: ThreadKey) -> Time {
            Time::ZERO
        }
    }

    #[test]
    fn picks_shortest_job_and_sorts_unbounded_last() {
        let mut policy = SjfPolicy::new();
        policy.init(&[ThreadKey(0), ThreadKey(1), ThreadKey(2)]);
        let view = FakeView {
            remaining: [
                (ThreadKey(0), Some(Time::from_units(5))),
                (ThreadKey(1), Some(Time::from_units(2))),
                (ThreadKey(2), None),
            ]
            .into(),
        };
        assert_eq!(policy.pick_next(&view).next, Some(ThreadKey(1)));

        let view = FakeView {
            remaining: [(ThreadKey(2), None)].into(),
        };
        assert_eq!(policy.pick_next(&view).next, Some(ThreadKey(2)));
    }
}
