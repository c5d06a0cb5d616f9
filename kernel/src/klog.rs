//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核日志
//!
//! `log` 门面的后端：保留最近 N 行的环形缓冲区，可选回显到 stderr。
//! 类似 Linux 的 printk 环形缓冲区 (kernel/printk/printk.c)。

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::config::defaults;

/// 内核日志器
pub struct KernelLog {
    /// 最近的日志行
    lines: Mutex<VecDeque<String>>,
    /// 保留行数
    capacity: AtomicUsize,
    /// 是否回显到 stderr
    echo: AtomicBool,
}

lazy_static! {
    static ref KLOG: KernelLog = KernelLog::new(defaults::KERNEL_LOG_LINES);
}

impl KernelLog {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: AtomicUsize::new(capacity.max(1)),
            echo: AtomicBool::new(true),
        }
    }

    fn push(&self, line: String) {
        if self.echo.load(Ordering::Relaxed) {
            let _ = writeln!(std::io::stderr(), "{}", line);
        }
        let cap = self.capacity.load(Ordering::Relaxed);
        let mut lines = self.lines.lock();
        while lines.len() >= cap {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.push(format!("[{:<5}] {}: {}", record.level(), record.target(), record.args()));
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// 安装内核日志器
///
/// 可以重复调用：日志器只安装一次，之后的调用只更新级别、容量和回显开关。
pub fn init(level: LevelFilter, lines: usize, echo: bool) {
    KLOG.capacity.store(lines.max(1), Ordering::Relaxed);
    KLOG.echo.store(echo, Ordering::Relaxed);
    // 已经安装过时返回 Err，忽略即可
    let _ = log::set_logger(&*KLOG);
    log::set_max_level(level);
}

/// 用户态写入内核日志 (writeklog)
pub fn write_user(pid: u32, text: &str) {
    KLOG.push(user_line(pid, text));
}

fn user_line(pid: u32, text: &str) -> String {
    format!("[USER ] pid {}: {}", pid, text.trim_end())
}

/// 最近的日志行（旧的在前）
pub fn recent() -> Vec<String> {
    KLOG.lines.lock().iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_latest_lines() {
        let klog = KernelLog::new(2);
        klog.echo.store(false, Ordering::Relaxed);
        klog.push(String::from("a"));
        klog.push(String::from("b"));
        klog.push(String::from("c"));
        let lines: Vec<String> = klog.lines.lock().iter().cloned().collect();
        assert_eq!(lines, vec![String::from("b"), String::from("c")]);
    }

    #[test]
    fn test_user_line_format() {
        assert_eq!(user_line(7, "hello klog\n"), "[USER ] pid 7: hello klog");
    }
}
