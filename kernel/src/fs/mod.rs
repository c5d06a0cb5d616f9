//! 文件层
//!
//! 内核只通过 `FileOps` 操作表调用描述符背后的对象，不解释它们的内容：
//! - `file`: 文件对象与描述符表
//! - `console`: 控制台字符设备
//!
//! 管道端和命名消息队列句柄在 `ipc` 里实现同一个操作表。

pub mod console;
pub mod file;

pub use console::Console;
pub use file::{FdTable, File, FileFlags, FileOps, Whence};
