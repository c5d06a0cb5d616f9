//! 等待队列 (Wait Queue)
//!
//! 参考 Linux 的 `include/linux/wait.h`：
//! - 进程需要等待某个条件时，加入等待队列、置为 SLEEPING 并调用 schedule()
//! - 条件满足时，唤醒方从队列取出进程并交给 `Kernel::wake_up()`
//!
//! 队列只保存 PID 句柄，本身没有锁。调用者必须持有所属原语的监视锁
//! （管道、信号量、邮箱各自的 Mutex）。

use std::collections::VecDeque;

use super::task::Pid;

/// FIFO 等待队列
#[derive(Debug, Default, Clone)]
pub struct WaitQueue {
    queue: VecDeque<Pid>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// 加到队尾，已在队列中时返回 false
    pub fn add(&mut self, pid: Pid) -> bool {
        if self.queue.contains(&pid) {
            return false;
        }
        self.queue.push_back(pid);
        true
    }

    /// 取出队首
    pub fn remove_head(&mut self) -> Option<Pid> {
        self.queue.pop_front()
    }

    /// 从任意位置删除，返回是否在队列中
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.queue.iter().position(|&p| p == pid) {
            Some(idx) => {
                self.queue.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 取出全部等待者（用于广播唤醒）
    pub fn drain_all(&mut self) -> Vec<Pid> {
        self.queue.drain(..).collect()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.queue.contains(&pid)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut wq = WaitQueue::new();
        assert!(wq.is_empty());
        assert!(wq.add(3));
        assert!(wq.add(1));
        assert!(wq.add(2));
        assert_eq!(wq.remove_head(), Some(3));
        assert_eq!(wq.remove_head(), Some(1));
        assert_eq!(wq.remove_head(), Some(2));
        assert_eq!(wq.remove_head(), None);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut wq = WaitQueue::new();
        assert!(wq.add(5));
        assert!(!wq.add(5));
        assert_eq!(wq.len(), 1);
    }

    #[test]
    fn test_remove_from_middle() {
        let mut wq = WaitQueue::new();
        wq.add(1);
        wq.add(2);
        wq.add(3);
        assert!(wq.remove(2));
        assert!(!wq.remove(2));
        assert_eq!(wq.drain_all(), vec![1, 3]);
        assert!(wq.is_empty());
    }
}
