//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核核心状态
//!
//! `Kernel` 持有 CPU 表、每个 CPU 的当前进程、任务表、PID 分配器和当前
//! 调度器，全部放在一把 CREW 锁后面（`KernelTables`）。IPC 对象各自有
//! 自己的监视锁，不直接碰 CREW 锁，只通过内核操作间接获取它。
//!
//! 生命周期：`Kernel::new` 构造，`boot` 启动 init，`wait_for_halt` 等待
//! init 退出或内核 panic。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;

use crate::config::{ConfigError, KernelConfig, PriorityClass};
use crate::errno::{Errno, KResult};
use crate::fs::{Console, File, FileFlags, FileOps};
use crate::ipc::{MailBox, NamedQueues, SemTable};
use crate::process::pid::PidAllocator;
use crate::process::{Pid, Process, ProcessInfo, ProcessState};
use crate::program::{ModuleTable, ProgramRegistry, UserProgram};
use crate::sched::{self, Scheduler};
use crate::sync::CrewLock;
use crate::timer::Timer;

/// 虚拟 CPU
pub struct VirtualCpu {
    pub id: usize,
    /// 正在此 CPU 上运行的进程，None 表示空闲
    pub current: Option<Arc<Process>>,
    /// 派发次数
    pub dispatches: u64,
}

/// CPU 快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    pub id: usize,
    pub current: Option<Pid>,
    pub dispatches: u64,
}

/// CREW 锁保护的全局内核表
pub struct KernelTables {
    pub(crate) cpus: Vec<VirtualCpu>,
    /// 任务表：进程是否存在以此为准
    pub(crate) tasks: BTreeMap<Pid, Arc<Process>>,
    pub(crate) pids: PidAllocator,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) init: Option<Pid>,
}

/// 内核停机原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// init 正常退出
    Exited(i32),
    /// 不可恢复的错误
    Panic(String),
}

/// 内核
pub struct Kernel {
    config: KernelConfig,
    pub(crate) tables: CrewLock<KernelTables>,
    programs: spin::RwLock<ProgramRegistry>,
    pub(crate) modules: spin::Mutex<ModuleTable>,
    pub(crate) timer: Timer,
    pub(crate) semaphores: SemTable,
    pub(crate) mailbox: MailBox,
    pub(crate) msgqs: NamedQueues,
    /// 每个 CPU 的重新调度请求
    pub(crate) need_resched: Vec<AtomicBool>,
    halt: Mutex<Option<HaltReason>>,
    halt_cv: Condvar,
    running: AtomicBool,
    booted: AtomicBool,
}

impl Kernel {
    /// 按配置构造内核，调度策略在此确定且之后不再改变
    pub fn new(config: KernelConfig) -> Result<Arc<Kernel>, ConfigError> {
        config.validate()?;
        let scheduler = sched::new_scheduler(&config);
        let cpus = (0..config.ncpus)
            .map(|id| VirtualCpu {
                id,
                current: None,
                dispatches: 0,
            })
            .collect();
        let need_resched = (0..config.ncpus).map(|_| AtomicBool::new(false)).collect();

        info!(
            "kernel: {} cpus, {} scheduler",
            config.ncpus,
            scheduler.policy().as_str()
        );

        Ok(Arc::new(Kernel {
            timer: Timer::new(config.max_timer_tasks),
            tables: CrewLock::new(KernelTables {
                cpus,
                tasks: BTreeMap::new(),
                pids: PidAllocator::new(),
                scheduler,
                init: None,
            }),
            programs: spin::RwLock::new(ProgramRegistry::new()),
            modules: spin::Mutex::new(ModuleTable::new()),
            semaphores: SemTable::new(),
            mailbox: MailBox::new(),
            msgqs: NamedQueues::new(),
            need_resched,
            halt: Mutex::new(None),
            halt_cv: Condvar::new(),
            running: AtomicBool::new(true),
            booted: AtomicBool::new(false),
            config,
        }))
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// 注册一个可执行程序
    pub fn register_program<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn UserProgram> + Send + Sync + 'static,
    {
        self.programs.write().register(name, factory);
    }

    /// 用闭包注册程序，每次 fork_exec 都运行同一个闭包的克隆
    pub fn register_fn<F>(&self, name: &str, main: F)
    where
        F: Fn(&crate::posix::Posix, &[String]) -> i32 + Send + Sync + Clone + 'static,
    {
        self.register_program(name, move || Box::new(main.clone()) as Box<dyn UserProgram>);
    }

    pub(crate) fn instantiate(&self, name: &str) -> KResult<Box<dyn UserProgram>> {
        self.programs.read().instantiate(name)
    }

    /// 已注册的程序名
    pub fn programs(&self) -> Vec<String> {
        self.programs.read().names()
    }

    /// 启动内核：开启定时器与抢占时钟，创建 init (pid 1)
    pub fn boot(self: &Arc<Self>, init: &str, args: &[&str]) -> KResult<Pid> {
        if self.booted.swap(true, Ordering::SeqCst) {
            return Err(Errno::DeviceOrResourceBusy);
        }
        crate::process::exit::install_fault_hook();
        self.timer.start(Arc::downgrade(self))?;
        if self.config.time_slice_ms > 0 {
            self.start_tick()?;
        }

        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let pid = self.create_process(None, init, &args, false)?;
        info!("kernel: init is pid {}", pid);
        Ok(pid)
    }

    /// 抢占时钟
    ///
    /// 每个时间片检查一次运行队列，有进程在等时给所有忙碌的 CPU 置
    /// need_resched，被调度进程在下一个系统调用边界让出 CPU。
    fn start_tick(self: &Arc<Self>) -> KResult<()> {
        let weak = Arc::downgrade(self);
        let slice = Duration::from_millis(self.config.time_slice_ms);
        thread::Builder::new()
            .name(String::from("simkern-tick"))
            .spawn(move || loop {
                thread::sleep(slice);
                let kernel = match weak.upgrade() {
                    Some(k) => k,
                    None => break,
                };
                if !kernel.is_running() {
                    break;
                }
                kernel.scheduler_tick();
            })
            .map(|_| ())
            .map_err(|_| Errno::TryAgain)
    }

    /// 给 init 准备控制台描述符 0/1/2
    pub(crate) fn install_console(&self, p: &Process) {
        let console: Arc<dyn FileOps> = Arc::new(Console::new());
        for flags in [FileFlags::READ, FileFlags::WRITE, FileFlags::WRITE] {
            let file = Arc::new(File::new(console.clone(), flags));
            if p.files().install(file).is_err() {
                warn!("kernel: no descriptor slot for console in pid {}", p.pid());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 停机，只记录第一次的原因
    ///
    /// 停放中的进程线程被放行，它们在 `schedule()` 返回处或下一次系统调用
    /// 入口发现内核已停机，走正常退出路径结束。
    pub fn halt(&self, reason: HaltReason) {
        {
            let mut halt = self.halt.lock().unwrap_or_else(PoisonError::into_inner);
            if halt.is_none() {
                info!("kernel: halting ({:?})", reason);
                *halt = Some(reason);
            }
            self.running.store(false, Ordering::SeqCst);
            self.timer.shutdown();
            self.halt_cv.notify_all();
        }
        self.release_parked();
    }

    /// 放行所有不在 CPU 上的进程线程
    fn release_parked(&self) {
        let mut t = self.tables.claim_write();
        let parked: Vec<Arc<Process>> = t
            .tasks
            .values()
            .filter(|p| {
                let inner = p.lock();
                inner.cpu.is_none()
                    && matches!(
                        inner.state,
                        ProcessState::Sleeping | ProcessState::Runnable | ProcessState::Stopped
                    )
            })
            .cloned()
            .collect();
        for p in parked {
            t.scheduler.remove(&p);
            // RUNNING 且没有 CPU：之后的唤醒不会再派发它
            p.set_state(ProcessState::Running);
            p.park.up();
        }
    }

    /// 内核 panic：记录并停机
    pub fn panic(&self, msg: &str) {
        error!("kernel panic: {}", msg);
        self.halt(HaltReason::Panic(msg.to_string()));
    }

    /// 阻塞直到停机
    pub fn wait_for_halt(&self) -> HaltReason {
        let mut halt = self.halt.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reason) = halt.as_ref() {
                return reason.clone();
            }
            halt = self
                .halt_cv
                .wait(halt)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 最多等待 `timeout`，超时返回 None
    pub fn wait_for_halt_timeout(&self, timeout: Duration) -> Option<HaltReason> {
        let halt = self.halt.lock().unwrap_or_else(PoisonError::into_inner);
        let (halt, _) = self
            .halt_cv
            .wait_timeout_while(halt, timeout, |h| h.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        halt.clone()
    }

    /// 按 pid 查找进程（读锁）
    pub fn find_process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.tables.claim_read().tasks.get(&pid).cloned()
    }

    /// init 进程的 pid
    pub fn init_pid(&self) -> Option<Pid> {
        self.tables.claim_read().init
    }

    /// 进程列表快照
    pub fn get_process_list(&self) -> Vec<ProcessInfo> {
        let t = self.tables.claim_read();
        t.tasks.values().map(|p| p.info()).collect()
    }

    /// JSON 格式的进程列表
    pub fn process_list_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.get_process_list())
    }

    /// CPU 表快照
    pub fn cpu_snapshot(&self) -> Vec<CpuInfo> {
        let t = self.tables.claim_read();
        t.cpus
            .iter()
            .map(|c| CpuInfo {
                id: c.id,
                current: c.current.as_ref().map(|p| p.pid()),
                dispatches: c.dispatches,
            })
            .collect()
    }

    /// 运行队列中的进程数
    pub fn runnable_count(&self) -> usize {
        self.tables.claim_read().scheduler.len()
    }

    /// 修改进程优先级类别
    ///
    /// 在运行队列中的进程先移出再按新类别放回。不区分优先级的调度策略返回 false。
    pub fn set_process_priority(&self, pid: Pid, class: PriorityClass) -> bool {
        let mut t = self.tables.claim_write();
        let p = match t.tasks.get(&pid) {
            Some(p) => p.clone(),
            None => return false,
        };
        t.scheduler.set_priority(&p, class)
    }

    /// 进程运行时故障
    ///
    /// init 的故障不可恢复，直接 panic。
    pub fn process_fault(&self, p: &Process, msg: &str) {
        error!("process {} ({}) fault: {}", p.pid(), p.name(), msg);
        if self.init_pid() == Some(p.pid()) {
            self.panic(&format!("init (pid {}) faulted: {}", p.pid(), msg));
        }
    }

    /// 内核模块故障，只记录
    pub fn module_fault(&self, name: &str, msg: &str) {
        error!("module {} fault: {}", name, msg);
    }

    /// 已加载的内核模块
    pub fn modules(&self) -> Vec<(String, Pid)> {
        self.modules.lock().list()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.timer.shutdown();
    }
}
