//! 彩票调度器
//!
//! 每个被接纳的进程从很大的彩票空间里抽取唯一的彩票号（与在用彩票做碰撞
//! 检查），`next()` 从在用彩票中均匀抽一张，持有者出队。期望上无饥饿，
//! 但不保证。
//!
//! `TicketPool` 也被分级彩票调度器复用，区别只在每个进程拿几张票。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Scheduler;
use crate::config::{PriorityClass, SchedPolicy, TICKET_SPACE};
use crate::process::{HasTicket, Pid, Process, SchedExt};

/// 在用彩票池
pub struct TicketPool {
    /// 全部在用彩票，抽签时按下标均匀选取
    tickets: Vec<u32>,
    in_use: HashSet<u32>,
    /// 彩票号 -> 持有者
    owner: BTreeMap<u32, Pid>,
    procs: BTreeMap<Pid, Arc<Process>>,
    /// 同一个种子得到同一串抽签结果
    rng: StdRng,
}

impl TicketPool {
    pub fn new(seed: u64) -> Self {
        Self {
            tickets: Vec::new(),
            in_use: HashSet::new(),
            owner: BTreeMap::new(),
            procs: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 抽一张未被占用的彩票
    fn draw_unique(&mut self) -> u32 {
        loop {
            let t = self.rng.gen_range(0..TICKET_SPACE);
            if self.in_use.insert(t) {
                return t;
            }
        }
    }

    /// 给进程发 `count` 张彩票并入池
    pub fn admit(&mut self, p: Arc<Process>, count: u32) -> bool {
        let pid = p.pid();
        if self.procs.contains_key(&pid) {
            return false;
        }
        let mut held = Vec::with_capacity(count as usize);
        for _ in 0..count.max(1) {
            let t = self.draw_unique();
            self.tickets.push(t);
            self.owner.insert(t, pid);
            held.push(t);
        }
        p.set_tickets(held);
        self.procs.insert(pid, p);
        true
    }

    /// 收回进程的全部彩票
    pub fn evict(&mut self, pid: Pid) -> Option<Arc<Process>> {
        let p = self.procs.remove(&pid)?;
        let held = p.tickets();
        for t in &held {
            self.in_use.remove(t);
            self.owner.remove(t);
        }
        self.tickets.retain(|t| !held.contains(t));
        p.set_tickets(Vec::new());
        Some(p)
    }

    /// 均匀抽一张在用彩票，持有者出池
    pub fn draw(&mut self) -> Option<Arc<Process>> {
        if self.tickets.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.tickets.len());
        let winner = *self.owner.get(&self.tickets[idx])?;
        self.evict(winner)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.procs.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// 在用彩票总数
    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }
}

/// 彩票调度器，每个进程一张票
pub struct LotteryScheduler {
    pool: TicketPool,
}

impl LotteryScheduler {
    pub fn new(seed: u64) -> Self {
        Self {
            pool: TicketPool::new(seed),
        }
    }
}

impl Scheduler for LotteryScheduler {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Lottery
    }

    fn make_ext(&self, _class: PriorityClass) -> SchedExt {
        SchedExt::Lottery { tickets: Vec::new() }
    }

    fn add(&mut self, p: Arc<Process>) -> bool {
        self.pool.admit(p, 1)
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
}
