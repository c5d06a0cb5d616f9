//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程退出与回收
//!
//! 参考 Linux kernel/exit.c 的 do_exit()：
//! 1. 释放资源：描述符、邮箱、定时器 (exit_files 等)
//! 2. 置 ZOMBIE，子进程过继给 init (forget_original_parent)
//! 3. 向父进程记录退出码、发送 SIGCHLD 并唤醒它 (do_notify_parent)
//! 4. 离开任务表与 CPU，交出 CPU
//!
//! 进程线程通过 unwind 一个 `TermProcess` 载荷结束，入口处捕获。

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic;
use std::sync::{Arc, Once};
use std::thread;

use log::{debug, error};

use crate::errno::{Errno, KResult};
use crate::kernel::{HaltReason, Kernel};
use crate::process::fork::THREAD_PREFIX;
use crate::process::{Process, ProcessState};
use crate::signal::{record_child_exit, SigInfo, Signal};

/// 进程终止载荷，携带退出码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermProcess(pub i32);

/// 结束当前进程线程，退出码由线程入口收取
pub fn terminate(code: i32) -> ! {
    panic::resume_unwind(Box::new(TermProcess(code)))
}

/// panic 载荷的文字描述
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(TermProcess(code)) = payload.downcast_ref::<TermProcess>() {
        format!("terminated with {}", code)
    } else {
        String::from("unknown fault")
    }
}

/// 安装故障钩子：进程线程里的 panic 连同调用栈写进内核日志
///
/// 其他线程仍走原来的钩子。只安装一次。
pub fn install_fault_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let current = thread::current();
            match current.name() {
                Some(name) if name.starts_with(THREAD_PREFIX) => {
                    error!("{}: {}\n{}", name, info, Backtrace::force_capture());
                }
                _ => previous(info),
            }
        }));
    });
}

impl Kernel {
    /// 进程退出，调用线程此后不再属于任何 CPU
    pub(crate) fn exit_process(&self, p: &Arc<Process>, code: i32) {
        self.shutdown_process(p);
        self.ending_process(p, code);
    }

    /// 释放进程持有的资源
    fn shutdown_process(&self, p: &Process) {
        for file in p.files().take_all() {
            file.release(self);
        }
        self.mailbox.dead_process(p.pid());
        self.timer.cancel(p.pid());
        self.modules.lock().remove_pid(p.pid());
    }

    fn ending_process(&self, p: &Arc<Process>, code: i32) {
        let pid = p.pid();

        let parent = {
            let t = self.tables.claim_write();
            p.set_state(ProcessState::Zombie);
            let heir = if t.init == Some(pid) { None } else { t.init };
            for child in t.tasks.values().filter(|c| c.ppid() == Some(pid)) {
                child.set_ppid(heir);
            }
            p.ppid().and_then(|ppid| t.tasks.get(&ppid).cloned())
        };

        if let Some(parent) = parent {
            let info = SigInfo::child(pid, code);
            record_child_exit(&parent, info);
            self.queue_signal(&parent, Signal::SIGCHLD, Some(info));
            // SIGCHLD 可能被忽略，wait() 中的父进程仍要醒来
            self.wake_up(parent.pid());
        }

        let is_init = {
            let mut t = self.tables.claim_write();
            t.tasks.remove(&pid);
            t.scheduler.remove(p);
            let cpu = {
                let mut inner = p.lock();
                inner.state = ProcessState::Finished;
                inner.cpu.take()
            };
            if let Some(cpu) = cpu {
                t.switch_out(cpu);
            }
            t.init == Some(pid)
        };

        debug!("exit: pid {} reaped", pid);
        if is_init {
            self.halt(HaltReason::Exited(code));
        }
    }

    /// 收取已退出子进程的退出记录 (do_wait)
    ///
    /// 有记录时立即返回全部记录。没有子进程也没有记录时返回 ECHILD，
    /// `nohang` 时返回 None，否则睡眠直到有子进程退出或被信号打断。
    pub fn wait_children(&self, me: &Arc<Process>, nohang: bool) -> KResult<Option<Vec<SigInfo>>> {
        let pid = me.pid();
        loop {
            let has_children = self
                .tables
                .claim_read()
                .tasks
                .values()
                .any(|c| c.ppid() == Some(pid));
            {
                let mut inner = me.lock();
                if !inner.child_exits.is_empty() {
                    return Ok(Some(std::mem::take(&mut inner.child_exits)));
                }
                if !has_children {
                    return Err(Errno::NoChild);
                }
                if nohang {
                    return Ok(None);
                }
                if inner.signalled {
                    return Err(Errno::InterruptedSystemCall);
                }
                inner.state = ProcessState::Sleeping;
            }
            self.schedule(me);
        }
    }
}
