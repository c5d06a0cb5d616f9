//! 睡眠定时器
//!
//! 每个进程最多一个到期时间，由一个宿主线程统一等待最近的到期点，
//! 到期后通过 `Kernel::wake_up` 唤醒对应进程。进程被其他原因提前唤醒时
//! 由 `sleep` 自己取消定时器。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::process::Pid;

struct TimerState {
    /// pid -> 到期时间
    entries: BTreeMap<Pid, Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Timer {
    max: usize,
    shared: Arc<Shared>,
    started: AtomicBool,
}

impl Timer {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState {
                    entries: BTreeMap::new(),
                    shutdown: false,
                }),
                cond: Condvar::new(),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// 启动定时器线程，重复调用无效果
    pub fn start(&self, kernel: Weak<Kernel>) -> KResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let shared = self.shared.clone();
        thread::Builder::new()
            .name(String::from("simkern-timer"))
            .spawn(move || run(shared, kernel))
            .map(|_| ())
            .map_err(|_| Errno::TryAgain)
    }

    /// 登记 `pid` 在 `delay` 之后到期，已有的登记被替换
    pub fn add(&self, pid: Pid, delay: Duration) -> KResult<()> {
        let mut st = self.shared.lock();
        if !st.entries.contains_key(&pid) && st.entries.len() >= self.max {
            return Err(Errno::TryAgain);
        }
        st.entries.insert(pid, Instant::now() + delay);
        self.shared.cond.notify_all();
        trace!("timer: pid {} in {:?}", pid, delay);
        Ok(())
    }

    /// 取消 `pid` 的登记
    pub fn cancel(&self, pid: Pid) -> bool {
        self.shared.lock().entries.remove(&pid).is_some()
    }

    /// 未到期的登记数
    pub fn pending(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn shutdown(&self) {
        let mut st = self.shared.lock();
        st.shutdown = true;
        st.entries.clear();
        self.shared.cond.notify_all();
    }
}

fn run(shared: Arc<Shared>, kernel: Weak<Kernel>) {
    let mut st = shared.lock();
    loop {
        if st.shutdown {
            break;
        }
        let now = Instant::now();
        let expired: Vec<Pid> = st
            .entries
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(&pid, _)| pid)
            .collect();
        if !expired.is_empty() {
            for pid in &expired {
                st.entries.remove(pid);
            }
            drop(st);
            let kernel = match kernel.upgrade() {
                Some(k) => k,
                None => break,
            };
            for pid in expired {
                kernel.wake_up(pid);
            }
            drop(kernel);
            st = shared.lock();
            continue;
        }

        let next = st.entries.values().min().copied();
        st = match next {
            Some(at) => {
                shared
                    .cond
                    .wait_timeout(st, at.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared.cond.wait(st).unwrap_or_else(PoisonError::into_inner),
        };
    }
    debug!("timer: stopped");
}
