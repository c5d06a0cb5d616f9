//! FIFO 调度器
//!
//! 严格按接纳顺序派发。

use std::collections::VecDeque;
use std::sync::Arc;

use super::Scheduler;
use crate::config::{PriorityClass, SchedPolicy};
use crate::process::{Pid, Process, SchedExt};

/// 先进先出调度器
#[derive(Default)]
pub struct FifoScheduler {
    queue: VecDeque<Arc<Process>>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl Scheduler for FifoScheduler {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Fifo
    }

    fn make_ext(&self, _class: PriorityClass) -> SchedExt {
        SchedExt::None
    }

    fn add(&mut self, p: Arc<Process>) -> bool {
        if self.contains(p.pid()) {
            return false;
        }
        self.queue.push_back(p);
        true
    }

    fn remove(&mut self, p: &Process) -> bool {
        match self.queue.iter().position(|q| q.pid() == p.pid()) {
            Some(idx) => {
                self.queue.remove(idx);
                true
            }
            None => false,
        }
    }

    fn next(&mut self) -> Option<Arc<Process>> {
        self.queue.pop_front()
    }

    fn contains(&self, pid: Pid) -> bool {
        self.queue.iter().any(|q| q.pid() == pid)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::testutil::pcb;

    #[test]
    fn test_admission_order() {
        let mut s = FifoScheduler::new();
        let a = pcb(2, &s, PriorityClass::Medium);
        let b = pcb(3, &s, PriorityClass::Medium);
        let c = pcb(4, &s, PriorityClass::Medium);
        assert!(!s.has_runnable());
        assert!(s.add(a));
        assert!(s.add(b));
        assert!(s.add(c));
        assert_eq!(s.next().map(|p| p.pid()), Some(2));
        assert_eq!(s.next().map(|p| p.pid()), Some(3));
        assert_eq!(s.next().map(|p| p.pid()), Some(4));
        assert!(s.next().is_none());
        assert!(!s.has_runnable());
    }

    #[test]
    fn test_remove_and_duplicates() {
        let mut s = FifoScheduler::new();
        let a = pcb(2, &s, PriorityClass::Medium);
        let b = pcb(3, &s, PriorityClass::Medium);
        assert!(s.add(a.clone()));
        assert!(!s.add(a.clone()));
        assert!(s.add(b.clone()));
        assert!(s.remove(&a));
        assert!(!s.remove(&a));
        assert!(s.has_runnable());
        assert!(s.remove(&b));
        assert!(!s.has_runnable());
        assert!(!s.set_priority(&a, PriorityClass::High));
    }
}
