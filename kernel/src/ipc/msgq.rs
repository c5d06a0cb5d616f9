//! 命名消息队列
//!
//! 按名字打开，得到一个文件描述符（句柄）。每个句柄在队列里有自己的接收
//! 槽位：发送时消息复制到除发送者以外的所有槽位，并唤醒每个槽位上的一个
//! 等待者。最后一个句柄关闭时队列消失。
//!
//! 句柄只能用 writemsg / readmsg 访问，普通的 read / write 返回 EIO。

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use spin::Mutex;

use crate::errno::{Errno, KResult};
use crate::fs::{FileOps, Whence};
use crate::kernel::Kernel;
use crate::process::{Pid, Process, WaitQueue};

/// 队列中的消息，所有接收者共享同一份内容
#[derive(Clone)]
pub struct NamedMsg {
    pub msg_type: i32,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl NamedMsg {
    pub fn new<T: Any + Send + Sync>(msg_type: i32, payload: T) -> Self {
        Self {
            msg_type,
            payload: Arc::new(payload),
        }
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// 一个句柄的接收槽位
struct Slot {
    id: u64,
    msgs: VecDeque<NamedMsg>,
    waiting: WaitQueue,
}

#[derive(Default)]
struct Queue {
    slots: Vec<Slot>,
}

/// 全部命名队列
#[derive(Default)]
pub struct NamedQueues {
    queues: Mutex<HashMap<String, Queue>>,
    next_id: AtomicU64,
}

impl NamedQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开（必要时创建）队列，返回新句柄
    pub fn open(&self, name: &str, owner: Pid) -> MsgQHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut queues = self.queues.lock();
        queues.entry(name.to_string()).or_default().slots.push(Slot {
            id,
            msgs: VecDeque::new(),
            waiting: WaitQueue::new(),
        });
        debug!("msgq: pid {} opened {} (handle {})", owner, name, id);
        MsgQHandle {
            name: name.to_string(),
            id,
        }
    }

    /// 发送，返回收到消息的句柄数
    pub fn send(&self, kernel: &Kernel, handle: &MsgQHandle, msg: NamedMsg) -> KResult<usize> {
        let (receivers, wake) = {
            let mut queues = self.queues.lock();
            let queue = queues.get_mut(&handle.name).ok_or(Errno::BadFileNumber)?;
            let mut receivers = 0;
            let mut wake = Vec::new();
            for slot in queue.slots.iter_mut().filter(|s| s.id != handle.id) {
                slot.msgs.push_back(msg.clone());
                receivers += 1;
                if let Some(pid) = slot.waiting.remove_head() {
                    wake.push(pid);
                }
            }
            (receivers, wake)
        };
        for pid in wake {
            kernel.wake_up(pid);
        }
        Ok(receivers)
    }

    /// 接收本句柄槽位上的第一条消息，没有时睡眠
    pub fn recv(
        &self,
        kernel: &Kernel,
        current: &Arc<Process>,
        handle: &MsgQHandle,
    ) -> KResult<NamedMsg> {
        let pid = current.pid();
        loop {
            let mut queues = self.queues.lock();
            let slot = queues
                .get_mut(&handle.name)
                .and_then(|q| q.slots.iter_mut().find(|s| s.id == handle.id))
                .ok_or(Errno::BadFileNumber)?;
            if let Some(msg) = slot.msgs.pop_front() {
                slot.waiting.remove(pid);
                return Ok(msg);
            }

            slot.waiting.add(pid);
            if !current.prepare_sleep() {
                slot.waiting.remove(pid);
                return Err(Errno::InterruptedSystemCall);
            }
            drop(queues);

            kernel.schedule(current);
        }
    }

    /// 关闭句柄，最后一个句柄关闭时删除队列
    fn close(&self, kernel: &Kernel, handle: &MsgQHandle) {
        let stranded = {
            let mut queues = self.queues.lock();
            let queue = match queues.get_mut(&handle.name) {
                Some(q) => q,
                None => return,
            };
            let mut stranded = Vec::new();
            queue.slots.retain_mut(|s| {
                if s.id == handle.id {
                    stranded.extend(s.waiting.drain_all());
                    false
                } else {
                    true
                }
            });
            if queue.slots.is_empty() {
                queues.remove(&handle.name);
                debug!("msgq: {} removed", handle.name);
            }
            stranded
        };
        // 共享句柄的其他进程还睡在这个槽位上，叫醒它们去发现 EBADF
        for pid in stranded {
            kernel.wake_up(pid);
        }
    }

    /// 队列是否存在
    pub fn exists(&self, name: &str) -> bool {
        self.queues.lock().contains_key(name)
    }

    /// 队列上打开的句柄数
    pub fn handles(&self, name: &str) -> usize {
        self.queues.lock().get(name).map_or(0, |q| q.slots.len())
    }
}

/// 命名队列句柄，作为文件对象装进描述符表
#[derive(Debug)]
pub struct MsgQHandle {
    name: String,
    id: u64,
}

impl FileOps for MsgQHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, _kernel: &Kernel, _current: &Arc<Process>, _buf: &mut [u8]) -> KResult<usize> {
        Err(Errno::IOError)
    }

    fn write(&self, _kernel: &Kernel, _current: &Arc<Process>, _buf: &[u8]) -> KResult<usize> {
        Err(Errno::IOError)
    }

    fn lseek(&self, _offset: i64, _whence: Whence) -> KResult<u64> {
        Err(Errno::IllegalSeek)
    }

    fn ioctl(&self, _cmd: u32, _arg: usize) -> KResult<i32> {
        Err(Errno::IOError)
    }

    fn close(&self, kernel: &Kernel) {
        kernel.msgqs.close(kernel, self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::process::SchedExt;

    #[test]
    fn test_send_copies_to_other_handles() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let q = NamedQueues::new();
        let a = q.open("bus", 2);
        let b = q.open("bus", 3);
        let c = q.open("bus", 4);
        assert_eq!(q.handles("bus"), 3);

        assert_eq!(q.send(&kernel, &a, NamedMsg::new(7, String::from("hi"))), Ok(2));

        let me = Arc::new(Process::new(3, None, "t", vec![], false, SchedExt::None, 4));
        let on_b = q.recv(&kernel, &me, &b).unwrap();
        assert_eq!(on_b.msg_type, 7);
        assert_eq!(on_b.get::<String>().map(String::as_str), Some("hi"));
        let on_c = q.recv(&kernel, &me, &c).unwrap();
        assert!(Arc::ptr_eq(&on_b.payload, &on_c.payload));
    }

    #[test]
    fn test_last_close_removes_queue() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let q = NamedQueues::new();
        let a = q.open("log", 2);
        let b = q.open("log", 3);
        q.close(&kernel, &a);
        assert!(q.exists("log"));
        q.close(&kernel, &b);
        assert!(!q.exists("log"));
        assert_eq!(q.send(&kernel, &a, NamedMsg::new(0, ())), Err(Errno::BadFileNumber));
    }
}
