//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! POSIX 风格的系统调用接口
//!
//! 用户程序只能通过 `Posix` 访问内核。每个系统调用：
//! - 进入时在 PCB 里记下调用名，投递待处理信号，并在需要时让出 CPU（抢占点）
//! - 退出时清除调用名并再次投递信号，被打断的调用在这里运行信号处理函数
//!
//! 错误以 `Errno` 返回，需要负整数时用 `Errno::as_neg_i32()`。

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PriorityClass;
use crate::errno::{Errno, KResult};
use crate::fs::{File, FileFlags, Whence};
use crate::ipc::{Message, MsgQHandle, NamedMsg, Pipe, SemOp};
use crate::kernel::Kernel;
use crate::klog;
use crate::process::exit::terminate;
use crate::process::{Pid, Process, ProcessInfo, ProcessState};
use crate::signal::{set_action, SigAction, Signal};

/// 系统调用上下文：内核与调用进程
pub struct Posix {
    kernel: Arc<Kernel>,
    current: Arc<Process>,
}

impl Posix {
    pub fn new(kernel: Arc<Kernel>, current: Arc<Process>) -> Self {
        Self { kernel, current }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn process(&self) -> &Arc<Process> {
        &self.current
    }

    fn enter(&self, name: &'static str) {
        self.current.set_syscall(Some(name));
        if !self.kernel.is_running() {
            terminate(Signal::SIGKILL.exit_code());
        }
        self.kernel.sync_process_signals(&self.current);
        self.kernel.check_preempt(&self.current);
    }

    fn leave(&self) {
        self.current.set_syscall(None);
        self.kernel.sync_process_signals(&self.current);
    }

    fn syscall<T>(&self, name: &'static str, f: impl FnOnce() -> T) -> T {
        self.enter(name);
        let ret = f();
        self.leave();
        ret
    }

    /// 按描述符取文件对象
    fn file(&self, fd: i32) -> KResult<Arc<File>> {
        self.current.files().get(fd)
    }

    pub fn getpid(&self) -> Pid {
        self.current.pid()
    }

    pub fn getppid(&self) -> Option<Pid> {
        self.current.ppid()
    }

    // ------------------------------------------------------------------
    // 描述符
    // ------------------------------------------------------------------

    /// 创建管道，返回 (读端, 写端)
    pub fn pipe(&self) -> KResult<(i32, i32)> {
        self.syscall("pipe", || {
            let (r, w) = Pipe::open_pair(self.kernel.config().pipe_buffer_size);
            self.current.files().install_pair(r, w)
        })
    }

    pub fn close(&self, fd: i32) -> KResult<()> {
        self.syscall("close", || {
            let file = self.current.files().remove(fd)?;
            file.release(&self.kernel);
            Ok(())
        })
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> KResult<usize> {
        self.syscall("read", || {
            self.file(fd)?.read(&self.kernel, &self.current, buf)
        })
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> KResult<usize> {
        self.syscall("write", || {
            self.file(fd)?.write(&self.kernel, &self.current, buf)
        })
    }

    pub fn write_str(&self, fd: i32, s: &str) -> KResult<usize> {
        self.write(fd, s.as_bytes())
    }

    pub fn lseek(&self, fd: i32, offset: i64, whence: i32) -> KResult<u64> {
        self.syscall("lseek", || {
            let whence = Whence::from_i32(whence)?;
            self.file(fd)?.lseek(offset, whence)
        })
    }

    pub fn ioctl(&self, fd: i32, cmd: u32, arg: usize) -> KResult<i32> {
        self.syscall("ioctl", || self.file(fd)?.ioctl(cmd, arg))
    }

    // ------------------------------------------------------------------
    // 进程控制
    // ------------------------------------------------------------------

    /// 主动让出 CPU
    pub fn reschedule(&self) {
        self.syscall("reschedule", || self.kernel.schedule(&self.current))
    }

    /// 创建子进程运行注册过的程序
    pub fn fork_exec(&self, name: &str, args: &[&str]) -> KResult<Pid> {
        self.syscall("fork_exec", || {
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            self.kernel
                .create_process(Some(&self.current), name, &args, false)
        })
    }

    /// 以内核进程方式加载模块，模块不接收信号
    pub fn loadmodule(&self, name: &str, args: &[&str]) -> KResult<Pid> {
        self.syscall("loadmodule", || {
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            self.kernel
                .create_process(Some(&self.current), name, &args, true)
        })
    }

    /// 结束调用进程
    pub fn exit(&self, code: i32) -> ! {
        self.current.set_syscall(Some("exit"));
        terminate(code)
    }

    /// 睡眠直到被信号打断，总是返回 EINTR
    pub fn pause(&self) -> KResult<()> {
        self.syscall("pause", || {
            let me = &self.current;
            loop {
                if !me.prepare_sleep() {
                    return Err(Errno::InterruptedSystemCall);
                }
                self.kernel.schedule(me);
                if me.is_signalled() {
                    return Err(Errno::InterruptedSystemCall);
                }
            }
        })
    }

    /// 设置信号处理方式，返回之前的处理方式
    ///
    /// SIGKILL / SIGSTOP 也可以设置，但投递时总是执行默认动作。
    pub fn signal(&self, signo: i32, action: SigAction) -> KResult<SigAction> {
        self.syscall("signal", || {
            let sig = Signal::from_i32(signo)?;
            Ok(set_action(&self.current, sig, action))
        })
    }

    /// 发送信号，`signo` 为 0 时只检查进程是否存在
    pub fn kill(&self, pid: Pid, signo: i32) -> KResult<()> {
        self.syscall("kill", || {
            if signo == 0 {
                return self
                    .kernel
                    .find_process(pid)
                    .map(|_| ())
                    .ok_or(Errno::NoSuchProcess);
            }
            let sig = Signal::from_i32(signo)?;
            self.kernel.send_signal(pid, sig, None)
        })
    }

    /// 等待子进程退出，返回 [(pid, 退出码)]
    ///
    /// `nohang` 且没有已退出的子进程时返回 None。
    pub fn wait(&self, nohang: bool) -> KResult<Option<Vec<(Pid, i32)>>> {
        self.syscall("wait", || {
            let exits = self.kernel.wait_children(&self.current, nohang)?;
            Ok(exits.map(|v| v.into_iter().map(|info| (info.pid, info.code)).collect()))
        })
    }

    /// 进程列表快照
    pub fn process_list(&self) -> Vec<ProcessInfo> {
        self.syscall("process_list", || self.kernel.get_process_list())
    }

    /// 修改进程的优先级类别
    pub fn set_priority(&self, pid: Pid, class: PriorityClass) -> bool {
        self.syscall("set_priority", || self.kernel.set_process_priority(pid, class))
    }

    /// 睡眠 `millis` 毫秒，被信号打断时返回 EINTR
    pub fn sleep(&self, millis: u64) -> KResult<()> {
        self.syscall("sleep", || {
            let me = &self.current;
            let deadline = Instant::now() + Duration::from_millis(millis);
            loop {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(());
                }
                if !me.prepare_sleep() {
                    return Err(Errno::InterruptedSystemCall);
                }
                if let Err(e) = self.kernel.timer.add(me.pid(), deadline - now) {
                    me.set_state(ProcessState::Running);
                    return Err(e);
                }
                self.kernel.schedule(me);
                if me.is_signalled() {
                    self.kernel.timer.cancel(me.pid());
                    return Err(Errno::InterruptedSystemCall);
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // 消息与信号量
    // ------------------------------------------------------------------

    /// 向进程的邮箱发送消息，不阻塞
    pub fn sendmsg<T: Any + Send>(&self, pid: Pid, msg_type: i32, payload: T) -> KResult<()> {
        self.syscall("sendmsg", || {
            if msg_type < 0 {
                return Err(Errno::InvalidArgument);
            }
            self.kernel.find_process(pid).ok_or(Errno::NoSuchProcess)?;
            let msg = Message::new(Some(self.current.pid()), pid, msg_type, payload);
            self.kernel.mailbox.send(&self.kernel, msg);
            Ok(())
        })
    }

    /// 从自己的邮箱接收，`source` / `msg_type` 为 None 表示任意
    pub fn recvmsg(&self, source: Option<Pid>, msg_type: Option<i32>) -> KResult<Message> {
        self.syscall("recvmsg", || {
            self.kernel
                .mailbox
                .recv(&self.kernel, &self.current, source, msg_type)
        })
    }

    /// 信号量操作：CREATE 0 / SET 1 / REMOVE 2
    pub fn semop(&self, op: i32, key: i32, value: i32) -> KResult<()> {
        self.syscall("semop", || {
            if key < 0 {
                return Err(Errno::InvalidArgument);
            }
            let sems = &self.kernel.semaphores;
            match SemOp::from_i32(op)? {
                SemOp::Create => sems.create(&self.kernel, &self.current, key, value),
                SemOp::Set => sems.set(&self.kernel, &self.current, key, value),
                SemOp::Remove => sems.remove(&self.kernel, key),
            }
        })
    }

    /// 打开命名消息队列，返回描述符
    pub fn opennmq(&self, name: &str) -> KResult<i32> {
        self.syscall("opennmq", || {
            if name.is_empty() {
                return Err(Errno::InvalidArgument);
            }
            let handle = self.kernel.msgqs.open(name, self.current.pid());
            let file = Arc::new(File::new(
                Arc::new(handle),
                FileFlags::READ | FileFlags::WRITE,
            ));
            self.current.files().install(file.clone()).map_err(|e| {
                file.release(&self.kernel);
                e
            })
        })
    }

    fn msgq_handle<'a>(file: &'a File) -> KResult<&'a MsgQHandle> {
        file.ops()
            .as_any()
            .downcast_ref::<MsgQHandle>()
            .ok_or(Errno::BadFileNumber)
    }

    /// 向命名队列发送，返回收到消息的句柄数
    pub fn writemsg<T: Any + Send + Sync>(&self, fd: i32, msg_type: i32, payload: T) -> KResult<usize> {
        self.syscall("writemsg", || {
            let file = self.file(fd)?;
            let handle = Self::msgq_handle(&file)?;
            self.kernel
                .msgqs
                .send(&self.kernel, handle, NamedMsg::new(msg_type, payload))
        })
    }

    /// 从命名队列接收，没有消息时阻塞
    pub fn readmsg(&self, fd: i32) -> KResult<NamedMsg> {
        self.syscall("readmsg", || {
            let file = self.file(fd)?;
            let handle = Self::msgq_handle(&file)?;
            self.kernel.msgqs.recv(&self.kernel, &self.current, handle)
        })
    }

    /// 写一行内核日志
    pub fn writeklog(&self, text: &str) -> KResult<()> {
        self.syscall("writeklog", || {
            klog::write_user(self.current.pid(), text);
            Ok(())
        })
    }
}
