//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号量 (Semaphore) 机制
//!
//! 参考 Linux `kernel/locking/semaphore.c`，阻塞的是宿主线程：
//! - P 操作 (down): 值减 1，为 0 时阻塞等待
//! - V 操作 (up): 值加 1，唤醒一个等待者
//!
//! 这是最底层的阻塞原语。进程停放、启动握手和 CREW 锁都建立在它之上，
//! 它本身不与调度器交互。

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// 计数信号量
pub struct Semaphore {
    /// 信号量计数值
    count: Mutex<i32>,
    /// 等待者
    wait: Condvar,
}

impl Semaphore {
    /// 创建新信号量
    ///
    /// # 示例
    /// ```
    /// use simkern::sync::Semaphore;
    ///
    /// // 互斥信号量（二值信号量）
    /// let mutex = Semaphore::new(1);
    /// mutex.down();
    /// assert!(!mutex.down_trylock());
    /// mutex.up();
    /// ```
    pub const fn new(value: i32) -> Self {
        Self {
            count: Mutex::new(value),
            wait: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, i32> {
        // 持有者 panic 不会破坏一个整数计数
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// P 操作，计数为 0 时阻塞
    pub fn down(&self) {
        let mut count = self.lock();
        while *count <= 0 {
            count = self.wait.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// 尝试 P 操作，不阻塞
    pub fn down_trylock(&self) -> bool {
        let mut count = self.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// V 操作
    pub fn up(&self) {
        let mut count = self.lock();
        *count += 1;
        self.wait.notify_one();
    }

    /// 当前计数值
    pub fn count(&self) -> i32 {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_up_before_down_is_not_lost() {
        let sem = Semaphore::new(0);
        sem.up();
        sem.down();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_down_blocks_until_up() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || {
                sem.down();
                42
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        sem.up();
        assert_eq!(waiter.join().unwrap(), 42);
    }
}
