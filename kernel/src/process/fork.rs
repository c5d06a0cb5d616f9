//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程创建
//!
//! 参考 Linux kernel/fork.c 的流程，但"可执行映像"是程序注册表里的 Rust 代码：
//! 1. 按名字实例化程序 (对应 exec 的加载)
//! 2. 分配 PID 与 PCB，登记到任务表 (copy_process)
//! 3. 继承父进程的描述符 (copy_files)
//! 4. 启动宿主线程，等它进入运行队列后返回 (wake_up_new_task)

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};

use crate::config::PriorityClass;
use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::posix::Posix;
use crate::process::exit::{panic_message, TermProcess};
use crate::process::{Pid, Process, ProcessState};
use crate::program::UserProgram;

/// 进程线程名前缀，故障钩子据此识别进程线程
pub const THREAD_PREFIX: &str = "simkern-pid-";

/// 进程运行时故障的退出码 (128 + SIGSEGV)
pub const FAULT_EXIT_CODE: i32 = 139;

impl Kernel {
    /// 创建进程并启动它的执行线程
    ///
    /// `parent` 为 None 时创建的是第一个进程 (init)。返回时子进程已经在
    /// 运行队列或某个 CPU 上。
    pub fn create_process(
        self: &Arc<Self>,
        parent: Option<&Arc<Process>>,
        name: &str,
        args: &[String],
        ktask: bool,
    ) -> KResult<Pid> {
        let program = self.instantiate(name)?;
        let mut cmdline = Vec::with_capacity(args.len() + 1);
        cmdline.push(name.to_string());
        cmdline.extend(args.iter().cloned());

        let p = {
            let mut t = self.tables.claim_write();
            if t.tasks.len() >= self.config().max_processes {
                warn!("fork: process limit {} reached", self.config().max_processes);
                return Err(Errno::TryAgain);
            }
            let pid = t.pids.alloc().ok_or(Errno::TryAgain)?;
            let ext = t.scheduler.make_ext(PriorityClass::Medium);
            let p = Arc::new(Process::new(
                pid,
                parent.map(|pp| pp.pid()),
                name,
                cmdline,
                ktask,
                ext,
                self.config().max_files_per_process,
            ));
            if t.init.is_none() {
                t.init = Some(pid);
            }
            t.tasks.insert(pid, p.clone());
            p
        };
        if ktask {
            self.modules.lock().insert(name, p.pid());
        }

        match parent {
            Some(parent) => p.files().inherit_from(parent.files()),
            None => self.install_console(&p),
        }

        let kernel = self.clone();
        let child = p.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}{}", THREAD_PREFIX, p.pid()))
            .spawn(move || process_main(kernel, child, program));
        if let Err(e) = spawned {
            warn!("fork: cannot start thread for pid {}: {}", p.pid(), e);
            {
                let mut t = self.tables.claim_write();
                t.tasks.remove(&p.pid());
                if t.init == Some(p.pid()) {
                    t.init = None;
                }
            }
            self.modules.lock().remove_pid(p.pid());
            for file in p.files().take_all() {
                file.release(self);
            }
            return Err(Errno::TryAgain);
        }

        // 等子进程进入运行队列
        p.start.down();
        debug!("fork: pid {} ({}) started", p.pid(), name);
        Ok(p.pid())
    }

    /// 新进程线程的第一步：进入运行队列，放行创建者，等待被派发
    fn starting_process(&self, p: &Arc<Process>) {
        {
            let mut t = self.tables.claim_write();
            p.set_state(ProcessState::Runnable);
            t.make_runnable(p);
        }
        p.start.up();
        p.park.down();
    }
}

/// 进程线程入口
fn process_main(kernel: Arc<Kernel>, p: Arc<Process>, mut program: Box<dyn UserProgram>) {
    kernel.starting_process(&p);

    let posix = Posix::new(kernel.clone(), p.clone());
    let args = p.cmdline().to_vec();
    let code = match panic::catch_unwind(AssertUnwindSafe(|| program.main(&posix, &args))) {
        Ok(code) => code,
        Err(payload) => match payload.downcast_ref::<TermProcess>() {
            Some(TermProcess(code)) => *code,
            None => {
                let msg = panic_message(payload.as_ref());
                if p.is_ktask() {
                    kernel.module_fault(p.name(), &msg);
                } else {
                    kernel.process_fault(&p, &msg);
                }
                FAULT_EXIT_CODE
            }
        },
    };
    drop(posix);
    info!("process {} ({}) exited with {}", p.pid(), p.name(), code);
    kernel.exit_process(&p, code);
}
