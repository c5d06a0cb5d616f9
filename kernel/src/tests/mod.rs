//! 场景测试
//!
//! 每个测试启动一个完整的内核，把测试逻辑注册为程序交给 init 运行，
//! 由 init 的退出码判断结果：0 表示全部断言通过。
//!
//! 运行测试：
//! ```bash
//! cargo test --package simkern
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::{KernelConfig, SchedPolicy};
use crate::kernel::{HaltReason, Kernel};
use crate::posix::Posix;

pub mod process;
pub mod scheduler;
pub mod signal;

/// 单个场景的最长运行时间
const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

/// 测试用配置：关闭时钟抢占，让执行顺序只由调度策略决定
pub fn config(ncpus: usize, scheduler: SchedPolicy) -> KernelConfig {
    KernelConfig {
        ncpus,
        scheduler,
        time_slice_ms: 0,
        lottery_seed: Some(7),
        ..KernelConfig::default()
    }
}

pub fn kernel(config: KernelConfig) -> Arc<Kernel> {
    Kernel::new(config).expect("valid test config")
}

/// 启动内核并等待 init 结束
pub fn run(kernel: &Arc<Kernel>, init: &str) -> Option<HaltReason> {
    kernel.boot(init, &[]).expect("boot");
    let reason = kernel.wait_for_halt_timeout(SCENARIO_TIMEOUT);
    if reason.is_none() {
        kernel.halt(HaltReason::Panic(String::from("scenario timed out")));
    }
    reason
}

/// 注册 init 并运行，要求 init 以 0 退出
pub fn run_init<F>(kernel: &Arc<Kernel>, init: F)
where
    F: Fn(&Posix, &[String]) -> i32 + Send + Sync + Clone + 'static,
{
    kernel.register_fn("init", init);
    assert_eq!(run(kernel, "init"), Some(HaltReason::Exited(0)));
}

/// 收集 `n` 个子进程的退出记录
pub fn reap(sys: &Posix, n: usize) -> Vec<(crate::process::Pid, i32)> {
    let mut exits = Vec::new();
    while exits.len() < n {
        match sys.wait(false) {
            Ok(Some(batch)) => exits.extend(batch),
            Ok(None) => {}
            Err(_) => break,
        }
    }
    exits
}
