//! PID 管理
//!
//! PID 单调递增，同一次运行内从不复用，溢出时分配失败而不是回绕。
//! 分配器本身没有锁，由 CREW 写锁保护。

use super::task::Pid;

/// init 进程的 PID
pub const PID_INIT: Pid = 1;

/// PID 分配器
#[derive(Debug)]
pub struct PidAllocator {
    next: Pid,
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self { next: PID_INIT }
    }

    /// 分配一个新的 PID，用尽时返回 None
    pub fn alloc(&mut self) -> Option<Pid> {
        let pid = self.next;
        self.next = self.next.checked_add(1)?;
        Some(pid)
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
