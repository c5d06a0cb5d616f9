//! 进程间通信
//!
//! 所有阻塞原语都由一个私有监视锁加若干 `WaitQueue` 组成，睡眠与唤醒只通过
//! 内核操作完成，从不直接触碰 CREW 锁。固定模式：
//! 1. 持监视锁检查条件，不满足时进等待队列并 `prepare_sleep()`
//! 2. 放开监视锁后 `schedule()`
//! 3. 醒来检查 `signalled`，被打断则离开等待队列并返回 EINTR，否则重试
//!
//! 唤醒方在监视锁内取出等待者，放锁后再逐个 `wake_up()`。

pub mod mailbox;
pub mod msgq;
pub mod pipe;
pub mod sem;

pub use mailbox::{MailBox, Message};
pub use msgq::{MsgQHandle, NamedMsg, NamedQueues};
pub use pipe::{Pipe, PipeReader, PipeWriter, RingBuffer};
pub use sem::{IpcSem, SemOp, SemTable};
