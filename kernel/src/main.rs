//! SimKern 演示
//!
//! 读取 Kernel.toml（不存在时用编译期默认值），启动一个小型 init：
//! 用管道把几个生产者的输出汇总到控制台，然后等待全部子进程退出。
//!
//! 用法：`simkern [配置文件]`

use std::process::ExitCode;

use log::{error, info, warn};

use simkern::{klog, HaltReason, Kernel, KernelConfig, Posix};

/// 未指定配置文件时读取的默认路径
const DEFAULT_CONFIG: &str = "Kernel.toml";

/// 控制台描述符
const STDOUT: i32 = 1;

fn producer(sys: &Posix, args: &[String]) -> i32 {
    let fd = match args.get(1).and_then(|s| s.parse::<i32>().ok()) {
        Some(fd) => fd,
        None => return 2,
    };
    for round in 0..3 {
        let line = format!("pid {} round {}\n", sys.getpid(), round);
        if sys.write_str(fd, &line).is_err() {
            return 1;
        }
        sys.reschedule();
    }
    0
}

fn init(sys: &Posix, _args: &[String]) -> i32 {
    let _ = sys.writeklog("init: starting");
    let (rfd, wfd) = match sys.pipe() {
        Ok(fds) => fds,
        Err(e) => {
            let _ = sys.write_str(STDOUT, &format!("init: pipe: {}\n", e));
            return 1;
        }
    };
    let wfd_arg = wfd.to_string();
    for _ in 0..3 {
        if let Err(e) = sys.fork_exec("producer", &[&wfd_arg]) {
            let _ = sys.write_str(STDOUT, &format!("init: fork_exec: {}\n", e));
        }
    }
    let _ = sys.close(wfd);

    let mut buf = [0u8; 256];
    loop {
        match sys.read(rfd, &mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let _ = sys.write(STDOUT, &buf[..n]);
            }
            Err(_) => break,
        }
    }

    let mut reaped = 0;
    while reaped < 3 {
        match sys.wait(false) {
            Ok(Some(exits)) => {
                for (pid, code) in exits {
                    let _ = sys.write_str(STDOUT, &format!("init: pid {} exited with {}\n", pid, code));
                    reaped += 1;
                }
            }
            Ok(None) => {}
            Err(_) => break,
        }
    }
    0
}

fn main() -> ExitCode {
    let (config, fallback) = match std::env::args().nth(1) {
        Some(path) => match KernelConfig::load(&path) {
            Ok(c) => (c, None),
            Err(e) => {
                eprintln!("simkern: {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => KernelConfig::load_optional(DEFAULT_CONFIG),
    };
    let level = config.level_filter().unwrap_or(log::LevelFilter::Info);
    klog::init(level, config.kernel_log_lines, config.log_echo);
    if let Some(e) = fallback {
        warn!("simkern: {}: {}; using defaults", DEFAULT_CONFIG, e);
    }

    let kernel = match Kernel::new(config) {
        Ok(k) => k,
        Err(e) => {
            error!("simkern: bad configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    kernel.register_fn("init", init);
    kernel.register_fn("producer", producer);

    if let Err(e) = kernel.boot("init", &[]) {
        error!("simkern: boot failed: {}", e);
        return ExitCode::FAILURE;
    }
    match kernel.wait_for_halt() {
        HaltReason::Exited(code) => {
            info!("simkern: init exited with {}", code);
            ExitCode::from(code.clamp(0, 255) as u8)
        }
        HaltReason::Panic(msg) => {
            eprintln!("simkern: kernel panic: {}", msg);
            ExitCode::FAILURE
        }
    }
}
