//! 同步原语 (Synchronization Primitives)
//!
//! - `semaphore` - 宿主线程级计数信号量，用于构建 CREW 锁和进程启动/停放握手
//! - `crew` - 并发读/独占写锁，保护全部全局内核表
//!
//! 核心概念：
//! - P 操作 (down): 获取信号量，可能阻塞宿主线程
//! - V 操作 (up): 释放信号量，唤醒一个等待者

pub mod crew;
pub mod semaphore;

pub use crew::{CrewLock, CrewReadGuard, CrewWriteGuard};
pub use semaphore::Semaphore;
