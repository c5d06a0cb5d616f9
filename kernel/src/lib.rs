//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! SimKern：可抢占多任务内核的模拟器
//!
//! 虚拟 CPU 上运行由可插拔调度器协调的"进程"（宿主线程），在此之上提供
//! 管道、信号量、邮箱、命名消息队列和信号等经典操作系统服务。
//!
//! 模块划分：
//! - `sync`: 计数信号量与 CREW 锁
//! - `process`: PCB、PID、等待队列、创建与退出
//! - `sched`: 调度策略与派发
//! - `kernel`: 内核核心状态
//! - `signal`: 信号
//! - `ipc`: 管道 / IPC 信号量 / 邮箱 / 命名消息队列
//! - `fs`: 文件对象与描述符表
//! - `timer`: 睡眠定时器
//! - `posix`: 用户程序使用的系统调用接口

pub mod config;
pub mod errno;
pub mod fs;
pub mod ipc;
pub mod kernel;
pub mod klog;
pub mod posix;
pub mod process;
pub mod program;
pub mod sched;
pub mod signal;
pub mod sync;
pub mod timer;

#[cfg(test)]
mod tests;

pub use config::{KernelConfig, PriorityClass, SchedPolicy};
pub use errno::{Errno, KResult};
pub use kernel::{HaltReason, Kernel};
pub use posix::Posix;
pub use process::{Pid, ProcessInfo, ProcessState};
pub use program::UserProgram;
pub use signal::{SigAction, SigInfo, Signal};
