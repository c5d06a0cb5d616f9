//! 进程邮箱
//!
//! 每个进程一个消息队列，按 (来源, 类型) 过滤接收。发送从不阻塞，
//! 接收在没有匹配消息时睡眠。进程退出时它的队列一起丢弃。

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use spin::Mutex;

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::process::{Pid, Process, WaitQueue};

/// 进程间消息
pub struct Message {
    /// 发送者，内核发出的消息为 None
    pub source: Option<Pid>,
    pub dest: Pid,
    /// 应用自定义的类型
    pub msg_type: i32,
    pub payload: Box<dyn Any + Send>,
}

impl Message {
    pub fn new<T: Any + Send>(source: Option<Pid>, dest: Pid, msg_type: i32, payload: T) -> Self {
        Self {
            source,
            dest,
            msg_type,
            payload: Box::new(payload),
        }
    }

    /// 按具体类型取出内容
    pub fn downcast<T: Any>(self) -> Option<T> {
        self.payload.downcast::<T>().ok().map(|b| *b)
    }

    fn matches(&self, source: Option<Pid>, msg_type: Option<i32>) -> bool {
        source.map_or(true, |s| self.source == Some(s))
            && msg_type.map_or(true, |t| self.msg_type == t)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("msg_type", &self.msg_type)
            .finish()
    }
}

#[derive(Default)]
struct MailState {
    queues: HashMap<Pid, VecDeque<Message>>,
    waiting: WaitQueue,
}

/// 全部进程的邮箱
#[derive(Default)]
pub struct MailBox {
    state: Mutex<MailState>,
}

impl MailBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 投递消息并唤醒所有等待接收的进程，它们各自检查是否有匹配的消息
    pub fn send(&self, kernel: &Kernel, msg: Message) {
        let waiters = {
            let mut st = self.state.lock();
            st.queues.entry(msg.dest).or_default().push_back(msg);
            st.waiting.drain_all()
        };
        for pid in waiters {
            kernel.wake_up(pid);
        }
    }

    /// 接收第一条匹配的消息，没有时睡眠
    ///
    /// `source` / `msg_type` 为 None 表示任意。
    pub fn recv(
        &self,
        kernel: &Kernel,
        current: &Arc<Process>,
        source: Option<Pid>,
        msg_type: Option<i32>,
    ) -> KResult<Message> {
        let pid = current.pid();
        loop {
            let mut st = self.state.lock();
            if let Some(queue) = st.queues.get_mut(&pid) {
                if let Some(idx) = queue.iter().position(|m| m.matches(source, msg_type)) {
                    if let Some(msg) = queue.remove(idx) {
                        st.waiting.remove(pid);
                        return Ok(msg);
                    }
                }
            }

            st.waiting.add(pid);
            if !current.prepare_sleep() {
                st.waiting.remove(pid);
                return Err(Errno::InterruptedSystemCall);
            }
            drop(st);

            // 被信号叫醒时也先回去检查一遍，已到达的消息优先
            kernel.schedule(current);
        }
    }

    /// 进程退出：丢弃它的队列
    pub fn dead_process(&self, pid: Pid) {
        let mut st = self.state.lock();
        st.queues.remove(&pid);
        st.waiting.remove(pid);
    }

    /// 某个进程尚未接收的消息数
    pub fn pending(&self, pid: Pid) -> usize {
        self.state.lock().queues.get(&pid).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::process::SchedExt;

    #[test]
    fn test_filtering_picks_first_match() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let me = Arc::new(Process::new(4, None, "t", vec![], false, SchedExt::None, 4));
        let mb = MailBox::new();
        mb.send(&kernel, Message::new(Some(2), 4, 1, "a"));
        mb.send(&kernel, Message::new(Some(3), 4, 2, "b"));
        mb.send(&kernel, Message::new(Some(3), 4, 1, "c"));
        assert_eq!(mb.pending(4), 3);

        let m = mb.recv(&kernel, &me, Some(3), Some(1)).unwrap();
        assert_eq!(m.downcast::<&str>(), Some("c"));
        let m = mb.recv(&kernel, &me, None, Some(2)).unwrap();
        assert_eq!(m.source, Some(3));
        let m = mb.recv(&kernel, &me, None, None).unwrap();
        assert_eq!(m.msg_type, 1);
        assert_eq!(mb.pending(4), 0);
    }

    #[test]
    fn test_dead_process_drops_queue() {
        let kernel = Kernel::new(KernelConfig::default()).unwrap();
        let mb = MailBox::new();
        mb.send(&kernel, Message::new(None, 9, 0, 42u32));
        assert_eq!(mb.pending(9), 1);
        mb.dead_process(9);
        assert_eq!(mb.pending(9), 0);
    }
}
