//! 信号处理机制
//!
//! 参考 Linux 的信号设计 (kernel/signal.c, include/linux/signal.h)：
//! - 每个进程一张处理表，每个信号编号对应 DEFAULT / IGNORE / CATCH 之一
//! - `queue_signal` 把信号挂到目标进程的待处理队列，必要时唤醒它
//! - `deliver_process_signals` 只在信号的目标进程自己的线程上执行，
//!   通常位于系统调用边界
//!
//! SIGKILL / SIGSTOP 不可阻塞、不可忽略、不可捕获：无论处理表内容如何
//! 都按默认动作执行。

use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;

use crate::config::NSIGS;
use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::posix::Posix;
use crate::process::exit::{panic_message, terminate, TermProcess};
use crate::process::{Pid, Process, ProcessState};

/// 标准信号定义
///
/// 编号与 Linux 一致 (include/uapi/asm-generic/signal.h)
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGHUP - 挂起
    SIGHUP = 1,
    /// SIGINT - 中断
    SIGINT = 2,
    /// SIGQUIT - 退出
    SIGQUIT = 3,
    /// SIGILL - 非法指令
    SIGILL = 4,
    /// SIGTRAP - 断点陷阱
    SIGTRAP = 5,
    /// SIGABRT - 异常终止
    SIGABRT = 6,
    /// SIGBUS - 总线错误
    SIGBUS = 7,
    /// SIGFPE - 浮点异常
    SIGFPE = 8,
    /// SIGKILL - 强制杀死
    SIGKILL = 9,
    /// SIGUSR1 - 用户定义信号1
    SIGUSR1 = 10,
    /// SIGSEGV - 段错误，进程运行时故障也映射到它
    SIGSEGV = 11,
    /// SIGUSR2 - 用户定义信号2
    SIGUSR2 = 12,
    /// SIGPIPE - 管道破裂
    SIGPIPE = 13,
    /// SIGALRM - 定时器
    SIGALRM = 14,
    /// SIGTERM - 终止
    SIGTERM = 15,
    /// SIGSTKFLT - 栈错误
    SIGSTKFLT = 16,
    /// SIGCHLD - 子进程退出，携带 (pid, exitcode)
    SIGCHLD = 17,
    /// SIGCONT - 继续
    SIGCONT = 18,
    /// SIGSTOP - 停止
    SIGSTOP = 19,
    /// SIGTSTP - 终端停止
    SIGTSTP = 20,
    /// SIGTTIN - 后台读
    SIGTTIN = 21,
    /// SIGTTOU - 后台写
    SIGTTOU = 22,
}

const ALL_SIGNALS: [Signal; 22] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGKILL,
    Signal::SIGUSR1,
    Signal::SIGSEGV,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGSTKFLT,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGSTOP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

impl Signal {
    /// 从信号编号转换，未知编号返回 EINVAL
    pub fn from_i32(signo: i32) -> KResult<Signal> {
        ALL_SIGNALS
            .iter()
            .copied()
            .find(|s| *s as i32 == signo)
            .ok_or(Errno::InvalidArgument)
    }

    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 处理表下标
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// 不可阻塞的信号
    pub const fn is_forced(self) -> bool {
        matches!(self, Signal::SIGKILL | Signal::SIGSTOP)
    }

    /// 默认动作
    pub const fn default_action(self) -> DefaultAction {
        match self {
            Signal::SIGCHLD => DefaultAction::Ignore,
            Signal::SIGCONT => DefaultAction::Continue,
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                DefaultAction::Stop
            }
            _ => DefaultAction::Terminate,
        }
    }

    /// 被该信号杀死时的退出码
    pub const fn exit_code(self) -> i32 {
        128 + self as i32
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// 处理表按编号索引
const _: () = assert!((Signal::SIGTTOU as usize) < NSIGS);

/// 默认动作
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Ignore,
    Stop,
    Continue,
}

/// 信号附带的数据
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SigInfo {
    /// 相关进程
    pub pid: Pid,
    /// SIGCHLD 时为子进程退出码
    pub code: i32,
}

impl SigInfo {
    /// SIGCHLD 的附加数据
    pub const fn child(pid: Pid, code: i32) -> Self {
        Self { pid, code }
    }
}

/// 处理方式编号，与 signal() 的整数参数对应
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disposition {
    Default = 0,
    Ignore = 1,
    Catch = 2,
}

/// 用户信号处理函数
pub type SigHandler = Arc<dyn Fn(&Posix, Signal, Option<SigInfo>) + Send + Sync>;

/// 信号处理动作
#[derive(Clone, Default)]
pub enum SigAction {
    /// 默认动作
    #[default]
    Default,
    /// 忽略
    Ignore,
    /// 由进程自己的处理函数处理
    Catch(SigHandler),
}

impl SigAction {
    /// 用闭包构造捕获动作
    pub fn catch<F>(handler: F) -> SigAction
    where
        F: Fn(&Posix, Signal, Option<SigInfo>) + Send + Sync + 'static,
    {
        SigAction::Catch(Arc::new(handler))
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            SigAction::Default => Disposition::Default,
            SigAction::Ignore => Disposition::Ignore,
            SigAction::Catch(_) => Disposition::Catch,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, SigAction::Ignore)
    }
}

impl fmt::Debug for SigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigAction::Default => f.write_str("Default"),
            SigAction::Ignore => f.write_str("Ignore"),
            SigAction::Catch(_) => f.write_str("Catch(..)"),
        }
    }
}

/// 待处理信号
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PendingSignal {
    pub signo: Signal,
    pub info: Option<SigInfo>,
}

impl Kernel {
    /// 向进程排队一个信号
    ///
    /// 内核进程和已退出的进程不接收信号。处理方式为 IGNORE 或默认动作本身
    /// 就是忽略的信号直接丢弃，SIGKILL / SIGSTOP 例外。目标在睡眠时把它放回
    /// 运行队列，阻塞原语醒来后通过 `signalled` 区分真实事件与中断。
    pub fn queue_signal(&self, p: &Arc<Process>, signo: Signal, info: Option<SigInfo>) {
        if p.is_ktask() {
            return;
        }
        let wake = {
            let mut inner = p.lock();
            if inner.state.is_dead() || inner.state == ProcessState::Invalid {
                return;
            }
            // SIGCONT 总是让停止的进程继续，SIGKILL 要叫醒停止的进程让它去死
            let resumed = inner.state == ProcessState::Stopped
                && matches!(signo, Signal::SIGCONT | Signal::SIGKILL);
            if resumed {
                inner.state = ProcessState::Sleeping;
            }
            // 默认动作是忽略的信号（SIGCHLD、SIGCONT）不打断阻塞调用
            let queued = signo.is_forced()
                || match &inner.actions[signo.index()] {
                    SigAction::Ignore => false,
                    SigAction::Default => !matches!(
                        signo.default_action(),
                        DefaultAction::Ignore | DefaultAction::Continue
                    ),
                    SigAction::Catch(_) => true,
                };
            if queued {
                inner.pending.push_back(PendingSignal { signo, info });
                inner.signalled = true;
            }
            (queued || resumed) && inner.state == ProcessState::Sleeping
        };
        debug!("signal: queued {} to pid {}", signo, p.pid());
        if wake {
            self.add_to_run_queue(p);
        }
    }

    /// 按 pid 发送信号
    pub fn send_signal(&self, pid: Pid, signo: Signal, info: Option<SigInfo>) -> KResult<()> {
        let p = self.find_process(pid).ok_or(Errno::NoSuchProcess)?;
        self.queue_signal(&p, signo, info);
        Ok(())
    }

    /// 投递进程的待处理信号
    ///
    /// `p` 必须是调用线程自己的进程。致命信号不会返回：进程完成退出清理后
    /// 执行线程直接结束。SIGSTOP 会在这里让出 CPU，直到 SIGCONT 或 SIGKILL。
    pub fn deliver_process_signals(self: &Arc<Self>, p: &Arc<Process>) {
        loop {
            let batch = {
                let mut inner = p.lock();
                if !inner.signalled && inner.pending.is_empty() {
                    return;
                }
                inner.signalled = false;
                std::mem::take(&mut inner.pending)
            };

            for sig in batch {
                let action = if sig.signo.is_forced() {
                    SigAction::Default
                } else {
                    p.action(sig.signo)
                };
                match action {
                    SigAction::Ignore => {}
                    SigAction::Default => match sig.signo.default_action() {
                        DefaultAction::Ignore | DefaultAction::Continue => {}
                        DefaultAction::Stop => {
                            debug!("signal: pid {} stopped by {}", p.pid(), sig.signo);
                            p.set_state(ProcessState::Stopped);
                            self.schedule(p);
                        }
                        DefaultAction::Terminate => {
                            debug!("signal: pid {} killed by {}", p.pid(), sig.signo);
                            terminate(sig.signo.exit_code());
                        }
                    },
                    SigAction::Catch(handler) => {
                        let posix = Posix::new(self.clone(), p.clone());
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            handler(&posix, sig.signo, sig.info)
                        }));
                        if let Err(payload) = result {
                            if payload.is::<TermProcess>() {
                                // 处理函数里调用了 exit()
                                panic::resume_unwind(payload);
                            }
                            self.process_fault(p, &panic_message(payload.as_ref()));
                            terminate(sig.signo.exit_code());
                        }
                    }
                }
            }
        }
    }

    /// 有待处理信号时投递，返回是否有信号
    ///
    /// 阻塞系统调用醒来后用它判断是否被中断。
    pub fn sync_process_signals(self: &Arc<Self>, p: &Arc<Process>) -> bool {
        if !p.is_signalled() {
            return false;
        }
        self.deliver_process_signals(p);
        true
    }
}

/// 设置处理方式，返回之前的处理方式
pub(crate) fn set_action(p: &Process, signo: Signal, action: SigAction) -> SigAction {
    let mut inner = p.lock();
    std::mem::replace(&mut inner.actions[signo.index()], action)
}

/// 记录一个子进程退出，等 wait() 来取
///
/// 与 SIGCHLD 本身分开保存：SIGCHLD 的默认动作是忽略，投递时会被丢弃。
pub(crate) fn record_child_exit(parent: &Process, info: SigInfo) {
    parent.lock().child_exits.push(info);
}
