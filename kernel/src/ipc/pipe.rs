//! 管道
//!
//! 参考 Linux fs/pipe.c：固定容量的环形缓冲区，读写两端各有一个等待队列。
//! - 读：有数据就返回已有的部分，写端全部关闭且缓冲区为空时返回 0 (EOF)
//! - 写：按缓冲区剩余空间分块写入，写满则阻塞，直到全部写完
//! - 读端全部关闭后写入：SIGPIPE + EPIPE
//!
//! 两端是各自独立的文件对象，最后一个描述符关闭时才关闭对应的一端。

use std::any::Any;
use std::sync::Arc;

use log::trace;
use spin::Mutex;

use crate::errno::{Errno, KResult};
use crate::fs::{File, FileFlags, FileOps};
use crate::kernel::Kernel;
use crate::process::{Pid, Process, WaitQueue};
use crate::signal::Signal;

/// 定长环形缓冲区
pub struct RingBuffer {
    data: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// 写入尽可能多的字节，返回写入数
    pub fn push(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free());
        let cap = self.capacity();
        for (i, &b) in src[..n].iter().enumerate() {
            self.data[(self.head + self.len + i) % cap] = b;
        }
        self.len += n;
        n
    }

    /// 读出尽可能多的字节，返回读出数
    pub fn pop(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        let cap = self.capacity();
        for (i, b) in dst[..n].iter_mut().enumerate() {
            *b = self.data[(self.head + i) % cap];
        }
        self.head = (self.head + n) % cap.max(1);
        self.len -= n;
        n
    }
}

struct PipeState {
    ring: RingBuffer,
    reader_open: bool,
    writer_open: bool,
    readers: WaitQueue,
    writers: WaitQueue,
}

/// 管道
pub struct Pipe {
    state: Mutex<PipeState>,
}

impl Pipe {
    pub fn new(capacity: usize) -> Arc<Pipe> {
        Arc::new(Pipe {
            state: Mutex::new(PipeState {
                ring: RingBuffer::new(capacity),
                reader_open: true,
                writer_open: true,
                readers: WaitQueue::new(),
                writers: WaitQueue::new(),
            }),
        })
    }

    /// 创建一对文件对象：(读端, 写端)
    pub fn open_pair(capacity: usize) -> (Arc<File>, Arc<File>) {
        let pipe = Pipe::new(capacity);
        let reader = File::new(Arc::new(PipeReader(pipe.clone())), FileFlags::READ);
        let writer = File::new(Arc::new(PipeWriter(pipe)), FileFlags::WRITE);
        (Arc::new(reader), Arc::new(writer))
    }

    /// 缓冲区中未读的字节数
    pub fn buffered(&self) -> usize {
        self.state.lock().ring.len()
    }

    fn wake_all(kernel: &Kernel, pids: Vec<Pid>) {
        for pid in pids {
            kernel.wake_up(pid);
        }
    }

    pub fn read(&self, kernel: &Kernel, current: &Arc<Process>, buf: &mut [u8]) -> KResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let pid = current.pid();
        loop {
            let mut st = self.state.lock();
            if !st.ring.is_empty() {
                st.readers.remove(pid);
                let n = st.ring.pop(buf);
                let writers = st.writers.drain_all();
                drop(st);
                Self::wake_all(kernel, writers);
                trace!("pipe: pid {} read {} bytes", pid, n);
                return Ok(n);
            }
            if !st.writer_open {
                st.readers.remove(pid);
                return Ok(0);
            }
            st.readers.add(pid);
            if !current.prepare_sleep() {
                st.readers.remove(pid);
                return Err(Errno::InterruptedSystemCall);
            }
            drop(st);

            // 醒来后先回到循环顶部看数据，缓冲区非空时即使有信号也先读走
            kernel.schedule(current);
        }
    }

    pub fn write(&self, kernel: &Kernel, current: &Arc<Process>, buf: &[u8]) -> KResult<usize> {
        let pid = current.pid();
        let mut written = 0;
        while written < buf.len() {
            let mut st = self.state.lock();
            if !st.reader_open {
                st.writers.remove(pid);
                drop(st);
                kernel.queue_signal(current, Signal::SIGPIPE, None);
                return Err(Errno::BrokenPipe);
            }
            if st.ring.free() > 0 {
                st.writers.remove(pid);
                written += st.ring.push(&buf[written..]);
                let readers = st.readers.drain_all();
                drop(st);
                Self::wake_all(kernel, readers);
                continue;
            }

            st.writers.add(pid);
            if !current.prepare_sleep() {
                st.writers.remove(pid);
                return Self::interrupted(written);
            }
            drop(st);

            kernel.schedule(current);
        }
        trace!("pipe: pid {} wrote {} bytes", pid, written);
        Ok(written)
    }

    /// 被信号打断：已写出部分数据时返回写出数
    fn interrupted(written: usize) -> KResult<usize> {
        if written > 0 {
            Ok(written)
        } else {
            Err(Errno::InterruptedSystemCall)
        }
    }

    fn close_read(&self, kernel: &Kernel) {
        let writers = {
            let mut st = self.state.lock();
            st.reader_open = false;
            st.writers.drain_all()
        };
        Self::wake_all(kernel, writers);
    }

    fn close_write(&self, kernel: &Kernel) {
        let readers = {
            let mut st = self.state.lock();
            st.writer_open = false;
            st.readers.drain_all()
        };
        Self::wake_all(kernel, readers);
    }
}

/// 管道读端
pub struct PipeReader(Arc<Pipe>);

/// 管道写端
pub struct PipeWriter(Arc<Pipe>);

impl FileOps for PipeReader {
    fn name(&self) -> &str {
        "pipe:r"
    }

    fn read(&self, kernel: &Kernel, current: &Arc<Process>, buf: &mut [u8]) -> KResult<usize> {
        self.0.read(kernel, current, buf)
    }

    fn write(&self, _kernel: &Kernel, _current: &Arc<Process>, _buf: &[u8]) -> KResult<usize> {
        Err(Errno::BadFileNumber)
    }

    fn close(&self, kernel: &Kernel) {
        self.0.close_read(kernel);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FileOps for PipeWriter {
    fn name(&self) -> &str {
        "pipe:w"
    }

    fn read(&self, _kernel: &Kernel, _current: &Arc<Process>, _buf: &mut [u8]) -> KResult<usize> {
        Err(Errno::BadFileNumber)
    }

    fn write(&self, kernel: &Kernel, current: &Arc<Process>, buf: &[u8]) -> KResult<usize> {
        self.0.write(kernel, current, buf)
    }

    fn close(&self, kernel: &Kernel) {
        self.0.close_write(kernel);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_wraps_around() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.push(b"abc"), 3);
        let mut out = [0u8; 2];
        assert_eq!(ring.pop(&mut out), 2);
        assert_eq!(&out, b"ab");
        // 跨过末尾
        assert_eq!(ring.push(b"defg"), 3);
        assert_eq!(ring.free(), 0);
        let mut out = [0u8; 8];
        assert_eq!(ring.pop(&mut out), 4);
        assert_eq!(&out[..4], b"cdef");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_exact_capacity() {
        let mut ring = RingBuffer::new(4096);
        let data = vec![7u8; 5000];
        assert_eq!(ring.push(&data), 4096);
        assert_eq!(ring.push(&data), 0);
        let mut out = vec![0u8; 1000];
        assert_eq!(ring.pop(&mut out), 1000);
        assert_eq!(ring.free(), 1000);
    }
}
