//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! CREW 锁 (Concurrent-Read / Exclusive-Write)
//!
//! 保护全部全局内核表：CPU 表、任务表、PID 分配器和调度器内部队列。
//!
//! 由两个计数信号量构成：
//! - `notify` 让写者的准入与新读者互斥，写者在整个写期间持有它
//! - `nreaders_sem` 保护读者计数
//!
//! 写者发现还有读者时登记为"等待写者"，在 `writer` 信号量上停放，
//! 最后一个离开的读者负责唤醒它。

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::semaphore::Semaphore;

/// 并发读/独占写锁
pub struct CrewLock<T> {
    /// 写者准入
    notify: Semaphore,
    /// 保护 nreaders / waiting_writer
    nreaders_sem: Semaphore,
    /// 当前读者数
    nreaders: AtomicUsize,
    /// 是否有写者在等读者离开
    waiting_writer: AtomicBool,
    /// 等待写者在此停放
    writer: Semaphore,
    data: UnsafeCell<T>,
}

// SAFETY: 对 data 的访问全部经过 claim_read / claim_write 的互斥协议
unsafe impl<T: Send> Send for CrewLock<T> {}
unsafe impl<T: Send + Sync> Sync for CrewLock<T> {}

impl<T> CrewLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            notify: Semaphore::new(1),
            nreaders_sem: Semaphore::new(1),
            nreaders: AtomicUsize::new(0),
            waiting_writer: AtomicBool::new(false),
            writer: Semaphore::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// 获取读权限
    ///
    /// 有写者持有或等待时阻塞
    pub fn claim_read(&self) -> CrewReadGuard<'_, T> {
        self.notify.down();
        self.nreaders_sem.down();
        self.nreaders.fetch_add(1, Ordering::Relaxed);
        self.nreaders_sem.up();
        self.notify.up();
        CrewReadGuard { lock: self }
    }

    fn release_read(&self) {
        self.nreaders_sem.down();
        let left = self.nreaders.fetch_sub(1, Ordering::Relaxed) - 1;
        if left == 0 && self.waiting_writer.swap(false, Ordering::Relaxed) {
            self.writer.up();
        }
        self.nreaders_sem.up();
    }

    /// 获取写权限
    ///
    /// 先关闭新读者的准入，再等待已有读者全部离开
    pub fn claim_write(&self) -> CrewWriteGuard<'_, T> {
        self.notify.down();
        self.nreaders_sem.down();
        if self.nreaders.load(Ordering::Relaxed) > 0 {
            self.waiting_writer.store(true, Ordering::Relaxed);
            self.nreaders_sem.up();
            self.writer.down();
        } else {
            self.nreaders_sem.up();
        }
        CrewWriteGuard { lock: self }
    }

    fn release_write(&self) {
        self.notify.up();
    }

    #[cfg(test)]
    fn readers(&self) -> usize {
        self.nreaders.load(Ordering::Relaxed)
    }
}

/// 读守卫，析构时调用 release_read
pub struct CrewReadGuard<'a, T> {
    lock: &'a CrewLock<T>,
}

impl<T> Deref for CrewReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 持有读权限期间没有写者
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for CrewReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// 写守卫，析构时调用 release_write
pub struct CrewWriteGuard<'a, T> {
    lock: &'a CrewLock<T>,
}

impl<T> Deref for CrewWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 持有写权限期间独占
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for CrewWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 持有写权限期间独占
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for CrewWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
