//! IPC 信号量
//!
//! 按整数键命名的计数信号量，供用户程序通过 `semop` 使用：
//! - 加：增加计数并唤醒全部等待者，等待者醒来后自己重新尝试
//! - 减：尽量扣减，不够时带着已扣的部分睡眠，被信号打断时归还已扣部分
//! - 删除：唤醒全部等待者，它们返回 ENOENT

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use spin::Mutex;

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::process::{Pid, Process, WaitQueue};

/// semop 的操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemOp {
    Create = 0,
    Set = 1,
    Remove = 2,
}

impl SemOp {
    pub fn from_i32(op: i32) -> KResult<SemOp> {
        match op {
            0 => Ok(SemOp::Create),
            1 => Ok(SemOp::Set),
            2 => Ok(SemOp::Remove),
            _ => Err(Errno::InvalidArgument),
        }
    }
}

struct SemState {
    value: i32,
    destroyed: bool,
    waiting: WaitQueue,
}

/// 一个命名信号量
pub struct IpcSem {
    key: i32,
    state: Mutex<SemState>,
}

impl IpcSem {
    fn new(key: i32, value: i32) -> Self {
        Self {
            key,
            state: Mutex::new(SemState {
                value,
                destroyed: false,
                waiting: WaitQueue::new(),
            }),
        }
    }

    pub fn key(&self) -> i32 {
        self.key
    }

    pub fn value(&self) -> i32 {
        self.state.lock().value
    }

    fn wake_all(kernel: &Kernel, pids: Vec<Pid>) {
        for pid in pids {
            kernel.wake_up(pid);
        }
    }

    fn up(&self, kernel: &Kernel, amount: i32) {
        let waiters = {
            let mut st = self.state.lock();
            st.value = st.value.saturating_add(amount);
            st.waiting.drain_all()
        };
        Self::wake_all(kernel, waiters);
    }

    fn down(&self, kernel: &Kernel, current: &Arc<Process>, amount: i32) -> KResult<()> {
        let pid = current.pid();
        let mut taken = 0;
        loop {
            let mut st = self.state.lock();
            if st.destroyed {
                return Err(Errno::NoSuchFileOrDirectory);
            }
            let grab = st.value.min(amount - taken);
            st.value -= grab;
            taken += grab;
            if taken == amount {
                return Ok(());
            }

            st.waiting.add(pid);
            if !current.prepare_sleep() {
                st.waiting.remove(pid);
                drop(st);
                return self.undo(kernel, taken);
            }
            drop(st);

            kernel.schedule(current);
            if self.state.lock().destroyed {
                return Err(Errno::NoSuchFileOrDirectory);
            }
            if current.is_signalled() {
                self.state.lock().waiting.remove(pid);
                return self.undo(kernel, taken);
            }
        }
    }

    /// 归还被打断前已经扣下的部分，可能因此满足其他等待者
    fn undo(&self, kernel: &Kernel, taken: i32) -> KResult<()> {
        debug!("sem {}: interrupted, returning {}", self.key, taken);
        self.up(kernel, taken);
        Err(Errno::InterruptedSystemCall)
    }

    fn destroy(&self, kernel: &Kernel) {
        let waiters = {
            let mut st = self.state.lock();
            st.destroyed = true;
            st.waiting.drain_all()
        };
        Self::wake_all(kernel, waiters);
    }
}

/// 键 -> 信号量
#[derive(Default)]
pub struct SemTable {
    sems: Mutex<HashMap<i32, Arc<IpcSem>>>,
}

impl SemTable {
    pub fn new() -> Self {
        Self {
            sems: Mutex::new(HashMap::new()),
        }
    }

    fn find(&self, key: i32) -> Option<Arc<IpcSem>> {
        self.sems.lock().get(&key).cloned()
    }

    /// 创建信号量，初值为负时先以 0 创建再做扣减
    pub fn create(
        &self,
        kernel: &Kernel,
        current: &Arc<Process>,
        key: i32,
        value: i32,
    ) -> KResult<()> {
        let sem = {
            let mut sems = self.sems.lock();
            if sems.contains_key(&key) {
                return Err(Errno::FileExists);
            }
            let sem = Arc::new(IpcSem::new(key, value.max(0)));
            sems.insert(key, sem.clone());
            sem
        };
        if value < 0 {
            sem.down(kernel, current, value.saturating_neg())
        } else {
            Ok(())
        }
    }

    /// 调整信号量的值
    pub fn set(&self, kernel: &Kernel, current: &Arc<Process>, key: i32, delta: i32) -> KResult<()> {
        let sem = self.find(key).ok_or(Errno::NoSuchDeviceOrAddress)?;
        if delta > 0 {
            sem.up(kernel, delta);
            Ok(())
        } else if delta < 0 {
            sem.down(kernel, current, delta.saturating_neg())
        } else {
            Ok(())
        }
    }

    /// 删除信号量
    pub fn remove(&self, kernel: &Kernel, key: i32) -> KResult<()> {
        let sem = self
            .sems
            .lock()
            .remove(&key)
            .ok_or(Errno::NoSuchFileOrDirectory)?;
        sem.destroy(kernel);
        Ok(())
    }

    /// 当前值，诊断用
    pub fn value(&self, key: i32) -> Option<i32> {
        self.find(key).map(|s| s.value())
    }

    pub fn len(&self) -> usize {
        self.sems.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sems.lock().is_empty()
    }
}
