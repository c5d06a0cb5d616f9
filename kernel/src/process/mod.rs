//! 进程管理模块
//!
//! - `task`: 进程控制块 (PCB)
//! - `pid`: PID 分配
//! - `wait`: 等待队列
//! - `fork`: 进程创建与线程入口
//! - `exit`: 进程退出与回收

pub mod exit;
pub mod fork;
pub mod pid;
pub mod task;
pub mod wait;

pub use exit::TermProcess;
pub use task::{HasPriority, HasTicket, Pid, Process, ProcessInfo, ProcessState, SchedExt};
pub use wait::WaitQueue;
