//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度与派发
//!
//! 每个进程是一个真实的宿主线程，但只有被派发到某个虚拟 CPU 上的进程线程
//! 在逻辑上运行，其余线程都停放在自己的 `park` 信号量上：
//! - 派发 (`dispatch`)：占用 CPU 槽位，`park.up()`
//! - 让出 (`schedule`)：腾出 CPU 槽位，把 CPU 交给调度器选出的下一个进程，
//!   然后 `park.down()`
//!
//! 所有 CPU 表与运行队列的修改都在 CREW 写锁下完成，PCB 锁只在写锁内短暂
//! 持有，派发另一个进程之前必须先放掉自己的 PCB 锁。

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{trace, warn};

use crate::kernel::{Kernel, KernelTables};
use crate::process::exit::terminate;
use crate::process::{Pid, Process, ProcessState};
use crate::signal::Signal;

impl KernelTables {
    /// 第一个空闲 CPU
    fn idle_cpu(&self) -> Option<usize> {
        self.cpus.iter().position(|c| c.current.is_none())
    }

    /// 把睡眠或新启动的进程变为可运行
    ///
    /// 有空闲 CPU 时直接派发，否则交给调度器。进程还没来得及离开 CPU 就被
    /// 唤醒时只改状态，`schedule()` 看到 RUNNABLE 后不会停放。
    pub(crate) fn make_runnable(&mut self, p: &Arc<Process>) -> bool {
        {
            let mut inner = p.lock();
            match inner.state {
                ProcessState::Sleeping | ProcessState::Runnable => {}
                _ => return false,
            }
            if inner.cpu.is_some() {
                inner.state = ProcessState::Runnable;
                return true;
            }
            if self.scheduler.contains(p.pid()) {
                return false;
            }
            inner.state = ProcessState::Runnable;
        }
        match self.idle_cpu() {
            Some(cpu) => self.dispatch(p.clone(), cpu),
            None => {
                self.scheduler.add(p.clone());
            }
        }
        true
    }

    /// 把进程放到 CPU 上并放行它的线程
    pub(crate) fn dispatch(&mut self, p: Arc<Process>, cpu: usize) {
        {
            let mut inner = p.lock();
            inner.cpu = Some(cpu);
            inner.state = ProcessState::Running;
        }
        trace!("sched: pid {} -> cpu {}", p.pid(), cpu);
        let slot = &mut self.cpus[cpu];
        slot.dispatches += 1;
        p.park.up();
        slot.current = Some(p);
    }

    /// 腾出 CPU，交给调度器选出的下一个进程，没有则空闲
    pub(crate) fn switch_out(&mut self, cpu: usize) {
        self.cpus[cpu].current = None;
        if let Some(next) = self.scheduler.next() {
            self.dispatch(next, cpu);
        }
    }
}

impl Kernel {
    /// 放入运行队列（或直接派发）
    pub fn add_to_run_queue(&self, p: &Arc<Process>) -> bool {
        self.tables.claim_write().make_runnable(p)
    }

    /// 按 pid 唤醒
    ///
    /// 等待队列只保存 pid，唤醒时进程可能已经退出，此时返回 false。
    pub fn wake_up(&self, pid: Pid) -> bool {
        let mut t = self.tables.claim_write();
        let p = match t.tasks.get(&pid) {
            Some(p) => p.clone(),
            None => return false,
        };
        t.make_runnable(&p)
    }

    /// 调度入口，`me` 必须是调用线程自己的进程
    ///
    /// - RUNNING：让出 CPU（运行队列为空时直接返回）
    /// - SLEEPING / STOPPED：离开 CPU 并停放，直到被唤醒派发
    /// - RUNNABLE：停放之前已被唤醒，恢复 RUNNING 后返回
    ///
    /// 内核已停机时不再返回，调用进程就地结束。
    pub fn schedule(&self, me: &Arc<Process>) {
        {
            let mut t = self.tables.claim_write();
            if !self.is_running() {
                drop(t);
                terminate(Signal::SIGKILL.exit_code());
            }
            let mut inner = me.lock();
            let cpu = match inner.cpu {
                Some(cpu) => cpu,
                None => {
                    warn!("sched: pid {} scheduling without a cpu", me.pid());
                    return;
                }
            };
            self.need_resched[cpu].store(false, Ordering::Release);

            let state = inner.state;
            match state {
                ProcessState::Runnable => {
                    inner.state = ProcessState::Running;
                    return;
                }
                ProcessState::Running => {
                    if !t.scheduler.has_runnable() {
                        return;
                    }
                    inner.state = ProcessState::Runnable;
                    inner.cpu = None;
                    drop(inner);
                    t.scheduler.add(me.clone());
                }
                ProcessState::Sleeping | ProcessState::Stopped => {
                    inner.cpu = None;
                    drop(inner);
                }
                _ => return,
            }
            t.switch_out(cpu);
        }
        me.park.down();
        if !self.is_running() {
            terminate(Signal::SIGKILL.exit_code());
        }
    }

    /// 时钟滴答：运行队列非空时请求所有忙碌的 CPU 重新调度
    pub fn scheduler_tick(&self) {
        let t = self.tables.claim_read();
        if !t.scheduler.has_runnable() {
            return;
        }
        for cpu in t.cpus.iter().filter(|c| c.current.is_some()) {
            self.need_resched[cpu.id].store(true, Ordering::Release);
        }
    }

    /// 系统调用边界上的抢占点
    pub fn check_preempt(&self, me: &Arc<Process>) {
        let cpu = match me.cpu() {
            Some(cpu) => cpu,
            None => return,
        };
        if self.need_resched[cpu].swap(false, Ordering::AcqRel) {
            self.schedule(me);
        }
    }
}
