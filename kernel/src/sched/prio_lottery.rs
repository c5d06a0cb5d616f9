//! 分级彩票调度器
//!
//! 每个优先级类别对应一个可配置的彩票数（默认 1/2/3）。进程按类别抽取
//! 相应数量的唯一彩票，`next()` 从全部在用彩票中均匀抽一张。高优先级只是
//! 中签概率更高，从不保证被选中。

use std::sync::Arc;

use super::lottery::TicketPool;
use super::Scheduler;
use crate::config::{PriorityClass, SchedPolicy, TicketCounts};
use crate::process::{HasPriority, Pid, Process, SchedExt};

pub struct PrioritizedLotteryScheduler {
    counts: TicketCounts,
    pool: TicketPool,
}

impl PrioritizedLotteryScheduler {
    pub fn new(counts: TicketCounts, seed: u64) -> Self {
        Self {
            counts,
            pool: TicketPool::new(seed),
        }
    }

    /// 修改某个类别的彩票数，只影响之后入队的进程
    pub fn set_tickets_to_assign(&mut self, class: PriorityClass, count: u32) {
        self.counts.set_for_class(class, count.max(1));
    }

    pub fn tickets_to_assign(&self, class: PriorityClass) -> u32 {
        self.counts.for_class(class)
    }
}

impl Scheduler for PrioritizedLotteryScheduler {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::PrioritizedLottery
    }

    fn make_ext(&self, class: PriorityClass) -> SchedExt {
        SchedExt::PrioritizedLottery {
            class,
            tickets: Vec::new(),
        }
    }

    fn add(&mut self, p: Arc<Process>) -> bool {
        let count = self.counts.for_class(p.priority_class());
        self.pool.admit(p, count)
    }

    fn remove(&mut self, p: &Process) -> bool {
        self.pool.evict(p.pid()).is_some()
    }

    fn next(&mut self) -> Option<Arc<Process>> {
        self.pool.draw()
    }

    fn contains(&self, pid: Pid) -> bool {
        self.pool.contains(pid)
    }

    fn len(&self) -> usize {
        self.pool.len()
    }

    fn set_priority(&mut self, p: &Arc<Process>, class: PriorityClass) -> bool {
        // 在队列中的进程要按新类别重新抽票
        let queued = self.remove(p);
        let changed = p.set_priority_class(class, 0);
        if queued {
            self.add(p.clone());
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::HasTicket;
    use crate::sched::testutil::pcb;

    fn counts() -> TicketCounts {
        TicketCounts {
            low: 1,
            medium: 2,
            high: 3,
        }
    }

    #[test]
    fn test_ticket_count_follows_class() {
        let mut s = PrioritizedLotteryScheduler::new(counts(), 11);
        let low = pcb(2, &s, PriorityClass::Low);
        let high = pcb(3, &s, PriorityClass::High);
        s.add(low.clone());
        s.add(high.clone());
        assert_eq!(low.tickets().len(), 1);
        assert_eq!(high.tickets().len(), 3);
        assert_eq!(s.pool.ticket_count(), 4);
    }

    #[test]
    fn test_high_class_wins_more_often() {
        let mut s = PrioritizedLotteryScheduler::new(counts(), 0xBEEF);
        let low = pcb(2, &s, PriorityClass::Low);
        let high = pcb(3, &s, PriorityClass::High);
        let mut high_wins = 0;
        for _ in 0..8_000 {
            s.add(low.clone());
            s.add(high.clone());
            if s.next().map(|p| p.pid()) == Some(3) {
                high_wins += 1;
            }
            while s.next().is_some() {}
        }
        // 期望 3/4
        assert!((5_600..=6_400).contains(&high_wins), "high won {}", high_wins);
    }

    #[test]
    fn test_set_priority_redraws_tickets() {
        let mut s = PrioritizedLotteryScheduler::new(counts(), 2);
        let p = pcb(2, &s, PriorityClass::Low);
        s.add(p.clone());
        assert_eq!(p.tickets().len(), 1);
        assert!(s.set_priority(&p, PriorityClass::High));
        assert_eq!(p.priority_class(), PriorityClass::High);
        assert_eq!(p.tickets().len(), 3);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_set_tickets_to_assign() {
        let mut s = PrioritizedLotteryScheduler::new(counts(), 2);
        s.set_tickets_to_assign(PriorityClass::Medium, 5);
        assert_eq!(s.tickets_to_assign(PriorityClass::Medium), 5);
        let p = pcb(2, &s, PriorityClass::Medium);
        s.add(p.clone());
        assert_eq!(p.tickets().len(), 5);
    }
}
