//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器模块
//!
//! 内核对调度策略是泛型的：所有策略实现同一个 [`Scheduler`] 接口，
//! 通过 PCB 的能力接口（`HasTicket` / `HasPriority`）读写各自需要的数据，
//! 从不向下转型到具体的进程类型。策略在内核初始化时从配置读取一次。
//!
//! - `fifo`: 先进先出
//! - `lottery`: 彩票调度
//! - `priority`: 优先级轮转
//! - `prio_lottery`: 分级彩票调度
//! - `sched`: schedule() / add_to_run_queue() 等派发逻辑

pub mod fifo;
pub mod lottery;
pub mod prio_lottery;
pub mod priority;
pub mod sched;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{KernelConfig, PriorityClass, SchedPolicy};
use crate::process::{Pid, Process, SchedExt};

pub use fifo::FifoScheduler;
pub use lottery::LotteryScheduler;
pub use prio_lottery::PrioritizedLotteryScheduler;
pub use priority::PriorityScheduler;

/// 调度策略接口
///
/// 所有调用都在 CREW 写锁下进行，实现本身不需要加锁。
pub trait Scheduler: Send + Sync {
    /// 策略名
    fn policy(&self) -> SchedPolicy;

    /// 为新进程构造调度扩展数据
    fn make_ext(&self, class: PriorityClass) -> SchedExt;

    /// 接纳一个可运行进程，已在队列中时返回 false
    fn add(&mut self, p: Arc<Process>) -> bool;

    /// 在被选中之前移除指定进程，不在队列中时返回 false
    fn remove(&mut self, p: &Process) -> bool;

    /// 取出下一个要运行的进程
    fn next(&mut self) -> Option<Arc<Process>>;

    /// 是否有可运行进程
    fn has_runnable(&self) -> bool {
        self.len() > 0
    }

    /// 进程是否在队列中
    fn contains(&self, pid: Pid) -> bool;

    /// 队列中的进程数
    fn len(&self) -> usize;

    /// 修改进程优先级类别，需要时移出再放回。不支持优先级的策略返回 false
    fn set_priority(&mut self, _p: &Arc<Process>, _class: PriorityClass) -> bool {
        false
    }
}

/// 按配置创建调度器
pub fn new_scheduler(config: &KernelConfig) -> Box<dyn Scheduler> {
    let seed = config.lottery_seed.unwrap_or_else(time_seed);
    match config.scheduler {
        SchedPolicy::Fifo => Box::new(FifoScheduler::new()),
        SchedPolicy::Lottery => Box::new(LotteryScheduler::new(seed)),
        SchedPolicy::Priority => Box::new(PriorityScheduler::new(config.priority_levels)),
        SchedPolicy::PrioritizedLottery => {
            Box::new(PrioritizedLotteryScheduler::new(config.lottery_tickets, seed))
        }
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5eed)
}
