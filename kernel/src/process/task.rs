//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程控制块 (Process Control Block)
//!
//! 参考 Linux 的 `struct task_struct` (include/linux/sched.h)，两级锁：
//! - 全局表（CPU 表、任务表、调度队列）由 CREW 锁保护
//! - PCB 自己的 `inner` 自旋锁保护 state / signalled / 待处理信号
//!
//! 加锁顺序固定为 CREW → PCB。持有 PCB 锁时不得去申请 CREW 锁，也不得阻塞。

use std::collections::VecDeque;

use serde::Serialize;
use spin::{Mutex, MutexGuard};

use crate::config::{PriorityClass, NSIGS};
use crate::fs::FdTable;
use crate::signal::{PendingSignal, SigAction, SigInfo, Signal};
use crate::sync::Semaphore;

/// 进程 ID
pub type Pid = u32;

/// 进程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ProcessState {
    /// 已分配但尚未启动
    Invalid = 0,
    /// 被 SIGSTOP 等信号停止
    Stopped = 1,
    /// 在运行队列中等待 CPU
    Runnable = 2,
    /// 占有一个虚拟 CPU
    Running = 3,
    /// 在某个等待队列上睡眠
    Sleeping = 4,
    /// 已退出并离开任务表
    Finished = 5,
    /// 已退出，正在回收
    Zombie = 6,
}

impl ProcessState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcessState::Invalid => "INVALID",
            ProcessState::Stopped => "STOPPED",
            ProcessState::Runnable => "RUNNABLE",
            ProcessState::Running => "RUNNING",
            ProcessState::Sleeping => "SLEEPING",
            ProcessState::Finished => "FINISHED",
            ProcessState::Zombie => "ZOMBIE",
        }
    }

    /// 是否已经退出
    pub const fn is_dead(self) -> bool {
        matches!(self, ProcessState::Finished | ProcessState::Zombie)
    }
}

/// 调度器扩展数据
///
/// 不同调度策略只需要各自的那一份数据，由调度器的构造函数决定变体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedExt {
    /// FIFO 不需要额外数据
    None,
    /// 彩票调度：持有的彩票
    Lottery { tickets: Vec<u32> },
    /// 优先级轮转：类别与当前（会衰减的）级别
    Priority { class: PriorityClass, level: u32 },
    /// 分级彩票调度：类别与持有的彩票
    PrioritizedLottery { class: PriorityClass, tickets: Vec<u32> },
}

/// 彩票能力
pub trait HasTicket {
    /// 当前持有的彩票
    fn tickets(&self) -> Vec<u32>;
    /// 替换持有的彩票，进程不携带彩票数据时返回 false
    fn set_tickets(&self, tickets: Vec<u32>) -> bool;
}

/// 优先级能力
pub trait HasPriority {
    /// 优先级类别，不区分优先级的策略返回 Medium
    fn priority_class(&self) -> PriorityClass;
    /// 修改优先级类别，不携带优先级数据时返回 false
    fn set_priority_class(&self, class: PriorityClass, level: u32) -> bool;
    /// 优先级轮转的当前级别
    fn priority_level(&self) -> Option<u32>;
    /// 设置当前级别
    fn set_priority_level(&self, level: u32) -> bool;
}

/// PCB 中受自旋锁保护的可变部分
pub(crate) struct ProcessInner {
    pub state: ProcessState,
    pub ppid: Option<Pid>,
    /// 占用的虚拟 CPU，None 表示不在任何 CPU 上
    pub cpu: Option<usize>,
    /// 有待处理信号
    pub signalled: bool,
    pub pending: VecDeque<PendingSignal>,
    /// 尚未被 wait() 收走的子进程退出记录
    pub child_exits: Vec<SigInfo>,
    /// 每个信号编号一项
    pub actions: Vec<SigAction>,
    /// 正在执行的系统调用
    pub syscall: Option<&'static str>,
}

/// 进程控制块
pub struct Process {
    pid: Pid,
    name: String,
    cmdline: Vec<String>,
    /// 内核进程不接收信号
    ktask: bool,
    inner: Mutex<ProcessInner>,
    sched: Mutex<SchedExt>,
    files: FdTable,
    /// 停放令牌：被派发到 CPU 时 up，让出 CPU 后 down
    pub(crate) park: Semaphore,
    /// 启动握手：进程进入运行队列后 up，创建者 down
    pub(crate) start: Semaphore,
}

impl Process {
    /// 创建 PCB，状态为 INVALID
    pub fn new(
        pid: Pid,
        ppid: Option<Pid>,
        name: &str,
        cmdline: Vec<String>,
        ktask: bool,
        ext: SchedExt,
        max_files: usize,
    ) -> Self {
        Self {
            pid,
            name: name.to_string(),
            cmdline,
            ktask,
            inner: Mutex::new(ProcessInner {
                state: ProcessState::Invalid,
                ppid,
                cpu: None,
                signalled: false,
                pending: VecDeque::new(),
                child_exits: Vec::new(),
                actions: vec![SigAction::Default; NSIGS],
                syscall: None,
            }),
            sched: Mutex::new(ext),
            files: FdTable::new(max_files),
            park: Semaphore::new(0),
            start: Semaphore::new(0),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cmdline(&self) -> &[String] {
        &self.cmdline
    }

    pub fn is_ktask(&self) -> bool {
        self.ktask
    }

    pub fn files(&self) -> &FdTable {
        &self.files
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: ProcessState) {
        self.inner.lock().state = state;
    }

    pub fn ppid(&self) -> Option<Pid> {
        self.inner.lock().ppid
    }

    pub(crate) fn set_ppid(&self, ppid: Option<Pid>) {
        self.inner.lock().ppid = ppid;
    }

    /// 占用的虚拟 CPU
    pub fn cpu(&self) -> Option<usize> {
        self.inner.lock().cpu
    }

    pub fn is_signalled(&self) -> bool {
        self.inner.lock().signalled
    }

    pub fn syscall(&self) -> Option<&'static str> {
        self.inner.lock().syscall
    }

    pub fn set_syscall(&self, name: Option<&'static str>) {
        self.inner.lock().syscall = name;
    }

    /// 准备在某个等待条件上睡眠
    ///
    /// 必须在唤醒方能看到本进程之前调用（通常在原语的监视锁内）。有待处理
    /// 信号时不睡眠，返回 false。
    pub(crate) fn prepare_sleep(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.signalled {
            return false;
        }
        inner.state = ProcessState::Sleeping;
        true
    }

    /// 某个信号当前的处理方式
    pub fn action(&self, sig: Signal) -> SigAction {
        self.inner.lock().actions[sig.index()].clone()
    }

    /// 调度器扩展数据的副本
    pub fn sched_ext(&self) -> SchedExt {
        self.sched.lock().clone()
    }

    /// 生成快照
    pub fn info(&self) -> ProcessInfo {
        let inner = self.inner.lock();
        ProcessInfo {
            pid: self.pid,
            ppid: inner.ppid,
            name: self.name.clone(),
            state: inner.state,
            signalled: inner.signalled,
            syscall: inner.syscall.map(str::to_string),
            cmdline: self.cmdline.clone(),
            cpu: inner.cpu,
            ktask: self.ktask,
        }
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl HasTicket for Process {
    fn tickets(&self) -> Vec<u32> {
        match &*self.sched.lock() {
            SchedExt::Lottery { tickets } | SchedExt::PrioritizedLottery { tickets, .. } => {
                tickets.clone()
            }
            _ => Vec::new(),
        }
    }

    fn set_tickets(&self, new: Vec<u32>) -> bool {
        match &mut *self.sched.lock() {
            SchedExt::Lottery { tickets } | SchedExt::PrioritizedLottery { tickets, .. } => {
                *tickets = new;
                true
            }
            _ => false,
        }
    }
}

impl HasPriority for Process {
    fn priority_class(&self) -> PriorityClass {
        match &*self.sched.lock() {
            SchedExt::Priority { class, .. } | SchedExt::PrioritizedLottery { class, .. } => *class,
            _ => PriorityClass::Medium,
        }
    }

    fn set_priority_class(&self, new: PriorityClass, new_level: u32) -> bool {
        match &mut *self.sched.lock() {
            SchedExt::Priority { class, level } => {
                *class = new;
                *level = new_level;
                true
            }
            SchedExt::PrioritizedLottery { class, .. } => {
                *class = new;
                true
            }
            _ => false,
        }
    }

    fn priority_level(&self) -> Option<u32> {
        match &*self.sched.lock() {
            SchedExt::Priority { level, .. } => Some(*level),
            _ => None,
        }
    }

    fn set_priority_level(&self, new: u32) -> bool {
        match &mut *self.sched.lock() {
            SchedExt::Priority { level, .. } => {
                *level = new;
                true
            }
            _ => false,
        }
    }
}

/// 进程快照，供进程列表使用，不持有任何引用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub name: String,
    pub state: ProcessState,
    pub signalled: bool,
    pub syscall: Option<String>,
    pub cmdline: Vec<String>,
    pub cpu: Option<usize>,
    pub ktask: bool,
}
