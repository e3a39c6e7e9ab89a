/*
 * Round-Robin Scheduling Policy
 *
 * Maintains a FIFO queue of the module's children and rotates through it,
 * giving each an equal time slice. A child that is not eligible (not yet
 * started, parked after idling, finished) keeps its queue position and is
 * skipped for the round.
 */

use std::collections::VecDeque;

use crate::sched::scheduler::{Decision, Policy, SchedView};
use crate::sched::types::ThreadKey;
use crate::time::Time;

pub struct RoundRobinPolicy {
    slice: Time,
    queue: VecDeque<ThreadKey>,
}

impl RoundRobinPolicy {
    pub fn new(slice: Time) -> RoundRobinPolicy {
        RoundRobinPolicy {
            slice,
            queue: VecDeque::new(),
        }
    }
}

impl Policy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn init(&mut self, children: &[ThreadKey]) {
        self.queue.extend(children.iter().copied());
    }

    fn pick_next(&mut self, view: &dyn SchedView) -> Decision {
        for _ in 0..self.queue.len() {
            let Some(key) = self.queue.pop_front() else {
                break;
            };
            self.queue.push_back(key);
            if view.is_eligible(key) {
                return Decision::run_thread(key, Some(self.slice));
            }
        }
        Decision::idle()
    }

    fn on_finish(&mut self, child: ThreadKey) {
        self.queue.retain(|&k| k != child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    struct FakeView {
        eligible: BTreeSet<ThreadKey>,
    }

    impl SchedView for FakeView {
        fn now(&self) -> Time {
            Time::ZERO
        }

        fn is_eligible(&self, key: ThreadKey) -> bool {
            self.eligible.contains(&key)
        }

        fn remaining(&self, _key: ThreadKey) -> Option<Time> {
            None
        }

        fn start_time(&self, _key: ThreadKey) -> Time {
            Time::ZERO
        }
    }

    #[test]
    fn rotates_through_eligible_children() {
        let mut policy = RoundRobinPolicy::new(Time::from_units(3));
        policy.init(&[ThreadKey(0), ThreadKey(1), ThreadKey(2)]);
        let view = FakeView {
            eligible: [ThreadKey(0), ThreadKey(1), ThreadKey(2)].into(),
        };
        let picks: Vec<_> = (0..4).map(|_| policy.pick_next(&view).next.unwrap()).collect();
        assert_eq!(
            picks,
            vec![ThreadKey(0), ThreadKey(1), ThreadKey(2), ThreadKey(0)]
        );
    }

    #[test]
    fn skips_ineligible_and_idles_when_none() {
        let mut policy = RoundRobinPolicy::new(Time::from_units(3));
        policy.init(&[ThreadKey(0), ThreadKey(1)]);
        let view = FakeView {
            eligible: [ThreadKey(1)].into(),
        };
        assert_eq!(policy.pick_next(&view).next, Some(ThreadKey(1)));

        policy.on_finish(ThreadKey(1));
        let view = FakeView {
            eligible: BTreeSet::new(),
        };
        assert_eq!(policy.pick_next(&view), Decision::idle());
    }
}
