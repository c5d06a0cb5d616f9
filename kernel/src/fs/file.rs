//! 文件对象和文件描述符表
//!
//! 参考 Linux 的 `struct file` / `struct file_operations` / `struct fdtable`：
//! - `FileOps`: 具体对象（管道端、控制台、命名消息队列句柄）实现的操作表
//! - `File`: 打开的文件对象，带访问标志和描述符引用计数
//! - `FdTable`: 每个进程固定大小的描述符槽位
//!
//! 子进程继承父进程的描述符时共享同一个 `File`，引用计数加一；计数归零时
//! 才调用 `FileOps::close`，管道据此判断一端是否已全部关闭。

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use spin::Mutex;

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::process::Process;

bitflags! {
    /// 文件访问标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u32 {
        const READ = 0b0001;
        const WRITE = 0b0010;
    }
}

/// lseek 的起点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    pub fn from_i32(whence: i32) -> KResult<Whence> {
        match whence {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(Errno::InvalidArgument),
        }
    }
}

/// 文件操作表
///
/// 阻塞的实现（管道读写）通过 `kernel` 让出 CPU，`current` 是发起调用的进程。
pub trait FileOps: Send + Sync {
    /// 诊断用名称
    fn name(&self) -> &str;

    fn read(&self, kernel: &Kernel, current: &Arc<Process>, buf: &mut [u8]) -> KResult<usize>;

    fn write(&self, kernel: &Kernel, current: &Arc<Process>, buf: &[u8]) -> KResult<usize>;

    fn lseek(&self, _offset: i64, _whence: Whence) -> KResult<u64> {
        Err(Errno::IllegalSeek)
    }

    fn ioctl(&self, _cmd: u32, _arg: usize) -> KResult<i32> {
        Err(Errno::NotATypewriter)
    }

    /// 最后一个描述符关闭时调用
    fn close(&self, _kernel: &Kernel) {}

    /// 供需要专有操作的调用者向下转型
    fn as_any(&self) -> &dyn Any;
}

/// 打开的文件对象
pub struct File {
    ops: Arc<dyn FileOps>,
    flags: FileFlags,
    /// 引用此对象的描述符个数
    refs: AtomicUsize,
}

impl File {
    pub fn new(ops: Arc<dyn FileOps>, flags: FileFlags) -> Self {
        Self {
            ops,
            flags,
            refs: AtomicUsize::new(1),
        }
    }

    pub fn flags(&self) -> FileFlags {
        self.flags
    }

    pub fn ops(&self) -> &Arc<dyn FileOps> {
        &self.ops
    }

    pub fn name(&self) -> &str {
        self.ops.name()
    }

    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// 多一个描述符引用
    pub fn get(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// 少一个描述符引用，归零时关闭底层对象
    pub fn release(&self, kernel: &Kernel) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.ops.close(kernel);
        }
    }

    pub fn read(&self, kernel: &Kernel, current: &Arc<Process>, buf: &mut [u8]) -> KResult<usize> {
        if !self.flags.contains(FileFlags::READ) {
            return Err(Errno::BadFileNumber);
        }
        self.ops.read(kernel, current, buf)
    }

    pub fn write(&self, kernel: &Kernel, current: &Arc<Process>, buf: &[u8]) -> KResult<usize> {
        if !self.flags.contains(FileFlags::WRITE) {
            return Err(Errno::BadFileNumber);
        }
        self.ops.write(kernel, current, buf)
    }

    pub fn lseek(&self, offset: i64, whence: Whence) -> KResult<u64> {
        self.ops.lseek(offset, whence)
    }

    pub fn ioctl(&self, cmd: u32, arg: usize) -> KResult<i32> {
        self.ops.ioctl(cmd, arg)
    }
}

/// 文件描述符表
pub struct FdTable {
    slots: Mutex<Vec<Option<Arc<File>>>>,
}

impl FdTable {
    pub fn new(max: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; max]),
        }
    }

    fn index(fd: i32) -> KResult<usize> {
        usize::try_from(fd).map_err(|_| Errno::BadFileNumber)
    }

    /// 安装到最小的空闲描述符
    pub fn install(&self, file: Arc<File>) -> KResult<i32> {
        let mut slots = self.slots.lock();
        let fd = slots
            .iter()
            .position(Option::is_none)
            .ok_or(Errno::TooManyOpenFiles)?;
        slots[fd] = Some(file);
        Ok(fd as i32)
    }

    /// 同时安装两个对象，要么都成功要么都不安装
    pub fn install_pair(&self, a: Arc<File>, b: Arc<File>) -> KResult<(i32, i32)> {
        let mut slots = self.slots.lock();
        let mut free = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(fd, _)| fd);
        let (fa, fb) = match (free.next(), free.next()) {
            (Some(fa), Some(fb)) => (fa, fb),
            _ => return Err(Errno::TooManyOpenFiles),
        };
        slots[fa] = Some(a);
        slots[fb] = Some(b);
        Ok((fa as i32, fb as i32))
    }

    pub fn get(&self, fd: i32) -> KResult<Arc<File>> {
        let idx = Self::index(fd)?;
        self.slots
            .lock()
            .get(idx)
            .and_then(Clone::clone)
            .ok_or(Errno::BadFileNumber)
    }

    /// 取下描述符，调用者负责 `release`
    pub fn remove(&self, fd: i32) -> KResult<Arc<File>> {
        let idx = Self::index(fd)?;
        self.slots
            .lock()
            .get_mut(idx)
            .and_then(Option::take)
            .ok_or(Errno::BadFileNumber)
    }

    /// 继承父进程的全部描述符
    pub fn inherit_from(&self, parent: &FdTable) {
        let src = parent.slots.lock();
        let mut dst = self.slots.lock();
        for (slot, file) in dst.iter_mut().zip(src.iter()) {
            if let Some(file) = file {
                file.get();
                *slot = Some(file.clone());
            }
        }
    }

    /// 取下全部描述符（进程退出时）
    pub fn take_all(&self) -> Vec<Arc<File>> {
        self.slots.lock().iter_mut().filter_map(Option::take).collect()
    }

    /// 已打开的描述符个数
    pub fn open_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }
}
