//! 优先级轮转调度器
//!
//! 进程按当前级别放入各自的桶，`next()` 总是服务最高的非空桶。每次被
//! 派发，进程的级别减一（最低为 0），高优先级进程因此逐渐"冷却"，低优先级
//! 进程不会被永久饿死。

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use super::Scheduler;
use crate::config::{PriorityClass, PriorityLevels, SchedPolicy};
use crate::process::{HasPriority, Pid, Process, SchedExt};

pub struct PriorityScheduler {
    levels: PriorityLevels,
    /// 级别 -> 该级别的 FIFO 队列
    buckets: BTreeMap<u32, VecDeque<Arc<Process>>>,
    count: usize,
}

impl PriorityScheduler {
    pub fn new(levels: PriorityLevels) -> Self {
        Self {
            levels,
            buckets: BTreeMap::new(),
            count: 0,
        }
    }

    fn level_of(p: &Process) -> u32 {
        p.priority_level().unwrap_or(0)
    }
}

impl Scheduler for PriorityScheduler {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Priority
    }

    fn make_ext(&self, class: PriorityClass) -> SchedExt {
        SchedExt::Priority {
            class,
            level: self.levels.for_class(class),
        }
    }

    fn add(&mut self, p: Arc<Process>) -> bool {
        if self.contains(p.pid()) {
            return false;
        }
        let level = Self::level_of(&p);
        self.buckets.entry(level).or_default().push_back(p);
        self.count += 1;
        true
    }

    fn remove(&mut self, p: &Process) -> bool {
        let level = Self::level_of(p);
        let bucket = match self.buckets.get_mut(&level) {
            Some(b) => b,
            None => return false,
        };
        let idx = match bucket.iter().position(|q| q.pid() == p.pid()) {
            Some(idx) => idx,
            None => return false,
        };
        bucket.remove(idx);
        if bucket.is_empty() {
            self.buckets.remove(&level);
        }
        self.count -= 1;
        true
    }

    fn next(&mut self) -> Option<Arc<Process>> {
        let mut entry = self.buckets.last_entry()?;
        let p = entry.get_mut().pop_front()?;
        if entry.get().is_empty() {
            entry.remove();
        }
        self.count -= 1;

        // 派发一次衰减一级
        let level = Self::level_of(&p);
        p.set_priority_level(level.saturating_sub(1));
        Some(p)
    }

    fn contains(&self, pid: Pid) -> bool {
        self.buckets
            .values()
            .any(|b| b.iter().any(|q| q.pid() == pid))
    }

    fn len(&self) -> usize {
        self.count
    }

    fn set_priority(&mut self, p: &Arc<Process>, class: PriorityClass) -> bool {
        let queued = self.remove(p);
        let changed = p.set_priority_class(class, self.levels.for_class(class));
        if queued {
            self.add(p.clone());
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::testutil::pcb;

    fn levels() -> PriorityLevels {
        PriorityLevels {
            low: 1,
            medium: 2,
            high: 4,
        }
    }

    #[test]
    fn test_highest_bucket_served_first() {
        let mut s = PriorityScheduler::new(levels());
        let low = pcb(2, &s, PriorityClass::Low);
        let high = pcb(3, &s, PriorityClass::High);
        let mid = pcb(4, &s, PriorityClass::Medium);
        s.add(low);
        s.add(high);
        s.add(mid);
        assert_eq!(s.len(), 3);
        let order: Vec<Pid> = std::iter::from_fn(|| s.next()).map(|p| p.pid()).collect();
        assert_eq!(order, vec![3, 4, 2]);
        assert!(!s.has_runnable());
    }

    #[test]
    fn test_decay_floors_at_zero() {
        let mut s = PriorityScheduler::new(levels());
        let p = pcb(2, &s, PriorityClass::Medium);
        for _ in 0..5 {
            s.add(p.clone());
            s.next();
        }
        assert_eq!(p.priority_level(), Some(0));
    }

    #[test]
    fn test_low_priority_eligible_after_decay() {
        let mut s = PriorityScheduler::new(levels());
        let high = pcb(2, &s, PriorityClass::High);
        let low = pcb(3, &s, PriorityClass::Low);
        s.add(low.clone());

        // high 从 4 衰减：4 -> 3 -> 2 -> 1，之后与 low 同级
        let mut winners = Vec::new();
        for _ in 0..4 {
            s.add(high.clone());
            let p = s.next().map(|p| p.pid());
            winners.push(p);
        }
        assert_eq!(winners, vec![Some(2); 3].into_iter().chain([Some(3)]).collect::<Vec<_>>());
        assert_eq!(low.priority_level(), Some(0));
    }

    #[test]
    fn test_set_priority_moves_bucket() {
        let mut s = PriorityScheduler::new(levels());
        let a = pcb(2, &s, PriorityClass::Low);
        let b = pcb(3, &s, PriorityClass::Medium);
        s.add(a.clone());
        s.add(b);
        assert!(s.set_priority(&a, PriorityClass::High));
        assert_eq!(a.priority_level(), Some(4));
        assert_eq!(s.len(), 2);
        assert_eq!(s.next().map(|p| p.pid()), Some(2));
    }
}
