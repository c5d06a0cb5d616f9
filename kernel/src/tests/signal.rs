// 测试：信号
//
// 测试内容：
// 1. SIGKILL 无视 IGNORE / CATCH 设置
// 2. 捕获处理函数在被打断的系统调用返回时运行
// 3. SIGTERM 默认终止进程，退出码为 128 + 信号编号
// 4. SIGSTOP / SIGCONT 停止与继续
// 5. 参数错误
// 6. SIGKILL 叫醒并终止已停止的进程

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{config, kernel, reap, run_init};
use crate::config::SchedPolicy;
use crate::errno::Errno;
use crate::posix::Posix;
use crate::process::ProcessState;
use crate::signal::{SigAction, Signal};

fn single_cpu() -> Arc<crate::kernel::Kernel> {
    kernel(config(1, SchedPolicy::Fifo))
}

/// 反复 pause，直到被杀
fn register_stubborn(k: &Arc<crate::kernel::Kernel>) {
    k.register_fn("stubborn", |sys: &Posix, _: &[String]| {
        let _ = sys.signal(Signal::SIGKILL as i32, SigAction::Ignore);
        let _ = sys.signal(Signal::SIGTERM as i32, SigAction::Ignore);
        loop {
            let _ = sys.pause();
        }
    });
}

/// 测试 1: SIGKILL 总是终止进程
#[test]
fn test_sigkill_cannot_be_ignored() {
    let k = single_cpu();
    register_stubborn(&k);

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("stubborn", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        // 让子进程先跑到 pause
        sys.reschedule();
        // SIGTERM 被忽略，子进程继续 pause
        if sys.kill(pid, Signal::SIGTERM as i32).is_err() {
            return 2;
        }
        sys.reschedule();
        if sys.kill(pid, Signal::SIGKILL as i32).is_err() {
            return 3;
        }
        if reap(sys, 1) != vec![(pid, 137)] {
            return 4;
        }
        0
    });
}

/// 测试 2: 捕获处理函数运行，pause 返回 EINTR
#[test]
fn test_caught_signal_runs_handler() {
    let k = single_cpu();
    let handled = Arc::new(AtomicBool::new(false));
    let flag = handled.clone();
    k.register_fn("catcher", move |sys: &Posix, _: &[String]| {
        let flag = flag.clone();
        let old = sys.signal(
            Signal::SIGUSR1 as i32,
            SigAction::catch(move |_sys: &Posix, sig, _info| {
                assert_eq!(sig, Signal::SIGUSR1);
                flag.store(true, Ordering::SeqCst);
            }),
        );
        if !matches!(old, Ok(SigAction::Default)) {
            return 1;
        }
        match sys.pause() {
            Err(Errno::InterruptedSystemCall) => 0,
            _ => 2,
        }
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("catcher", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        sys.reschedule();
        if sys.kill(pid, Signal::SIGUSR1 as i32).is_err() {
            return 2;
        }
        if reap(sys, 1) != vec![(pid, 0)] {
            return 3;
        }
        0
    });
    assert!(handled.load(Ordering::SeqCst));
}

/// 测试 3: 默认动作终止
#[test]
fn test_sigterm_default_terminates() {
    let k = single_cpu();
    k.register_fn("sleeper", |sys: &Posix, _: &[String]| {
        let _ = sys.pause();
        0
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("sleeper", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        sys.reschedule();
        if sys.kill(pid, Signal::SIGTERM as i32).is_err() {
            return 2;
        }
        if reap(sys, 1) != vec![(pid, 143)] {
            return 3;
        }
        0
    });
}

/// 测试 4: SIGSTOP 停止进程，SIGCONT 让它继续
#[test]
fn test_stop_and_continue() {
    let k = single_cpu();
    k.register_fn("sleeper", |sys: &Posix, _: &[String]| match sys.pause() {
        Err(Errno::InterruptedSystemCall) => 5,
        _ => 6,
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("sleeper", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        sys.reschedule();
        if sys.kill(pid, Signal::SIGSTOP as i32).is_err() {
            return 2;
        }
        // 子进程醒来、投递 SIGSTOP 后停下
        sys.reschedule();
        let state = sys
            .process_list()
            .into_iter()
            .find(|info| info.pid == pid)
            .map(|info| info.state);
        if state != Some(ProcessState::Stopped) {
            return 3;
        }
        if sys.kill(pid, Signal::SIGCONT as i32).is_err() {
            return 4;
        }
        if reap(sys, 1) != vec![(pid, 5)] {
            return 5;
        }
        0
    });
}

/// 测试 5: 参数检查
#[test]
fn test_signal_argument_errors() {
    let k = single_cpu();
    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.kill(999, Signal::SIGTERM as i32) != Err(Errno::NoSuchProcess) {
            return 1;
        }
        if sys.kill(sys.getpid(), 64) != Err(Errno::InvalidArgument) {
            return 2;
        }
        if sys.signal(0, SigAction::Ignore).is_ok() {
            return 3;
        }
        // 0 号信号只检查进程是否存在
        if sys.kill(sys.getpid(), 0).is_err() || sys.kill(999, 0) != Err(Errno::NoSuchProcess) {
            return 4;
        }
        0
    });
}

/// 测试 6: 停止状态下收到 SIGKILL
#[test]
fn test_sigkill_ends_stopped_process() {
    let k = single_cpu();
    k.register_fn("sleeper", |sys: &Posix, _: &[String]| {
        let _ = sys.pause();
        0
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("sleeper", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        sys.reschedule();
        if sys.kill(pid, Signal::SIGSTOP as i32).is_err() {
            return 2;
        }
        sys.reschedule();
        let stopped = sys
            .process_list()
            .iter()
            .any(|info| info.pid == pid && info.state == ProcessState::Stopped);
        if !stopped {
            return 3;
        }
        if sys.kill(pid, Signal::SIGKILL as i32).is_err() {
            return 4;
        }
        if reap(sys, 1) != vec![(pid, 137)] {
            return 5;
        }
        0
    });
}
