//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 控制台字符设备
//!
//! init 的 0/1/2 号描述符指向它，子进程通过继承得到。写入直接送到宿主的
//! 标准输出，读取没有输入源，总是返回 EOF。

use std::any::Any;
use std::io::Write;
use std::sync::Arc;

use crate::errno::{Errno, KResult};
use crate::fs::FileOps;
use crate::kernel::Kernel;
use crate::process::Process;

/// TCGETS，用来判断描述符是不是终端
pub const TCGETS: u32 = 0x5401;

#[derive(Debug, Default)]
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Console
    }
}

impl FileOps for Console {
    fn name(&self) -> &str {
        "console"
    }

    fn read(&self, _kernel: &Kernel, _current: &Arc<Process>, _buf: &mut [u8]) -> KResult<usize> {
        Ok(0)
    }

    fn write(&self, _kernel: &Kernel, _current: &Arc<Process>, buf: &[u8]) -> KResult<usize> {
        let mut out = std::io::stdout().lock();
        out.write_all(buf).map_err(|_| Errno::IOError)?;
        out.flush().map_err(|_| Errno::IOError)?;
        Ok(buf.len())
    }

    fn ioctl(&self, cmd: u32, _arg: usize) -> KResult<i32> {
        match cmd {
            TCGETS => Ok(0),
            _ => Err(Errno::InvalidArgument),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
