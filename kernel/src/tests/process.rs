// 测试：进程生命周期
//
// 测试内容：
// 1. fork_exec / wait 返回子进程退出码
// 2. 没有子进程时 wait 返回 ECHILD，nohang 不阻塞
// 3. 进程列表与父子关系
// 4. 孤儿进程过继给 init
// 5. 运行时故障：普通进程以 139 退出，init 故障导致内核 panic
// 6. 内核模块
// 7. init 退出停机后，仍在睡眠或停止的进程全部结束

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{config, kernel, reap, run, run_init};
use crate::config::SchedPolicy;
use crate::errno::Errno;
use crate::kernel::{HaltReason, Kernel};
use crate::posix::Posix;
use crate::process::ProcessState;

fn single_cpu() -> Arc<Kernel> {
    kernel(config(1, SchedPolicy::Fifo))
}

/// 测试 1: 退出码经 wait 返回，exit() 可以在任意深度调用
#[test]
fn test_wait_returns_exit_codes() {
    let k = single_cpu();
    k.register_fn("seven", |_sys: &Posix, _: &[String]| 7);
    k.register_fn("quitter", |sys: &Posix, _: &[String]| {
        fn nested(sys: &Posix) -> ! {
            sys.exit(42)
        }
        nested(sys)
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("seven", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        if reap(sys, 1) != vec![(pid, 7)] {
            return 2;
        }
        let pid = match sys.fork_exec("quitter", &[]) {
            Ok(pid) => pid,
            Err(_) => return 3,
        };
        if reap(sys, 1) != vec![(pid, 42)] {
            return 4;
        }
        if sys.fork_exec("no-such-program", &[]) != Err(Errno::NoSuchFileOrDirectory) {
            return 5;
        }
        0
    });
}

/// 测试 2: ECHILD 与 nohang
#[test]
fn test_wait_without_children() {
    let k = single_cpu();
    k.register_fn("napper", |sys: &Posix, _: &[String]| {
        let _ = sys.sleep(20);
        0
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.wait(false) != Err(Errno::NoChild) {
            return 1;
        }
        if sys.wait(true) != Err(Errno::NoChild) {
            return 2;
        }
        let pid = match sys.fork_exec("napper", &[]) {
            Ok(pid) => pid,
            Err(_) => return 3,
        };
        // 子进程还在运行队列里
        if sys.wait(true) != Ok(None) {
            return 4;
        }
        if reap(sys, 1) != vec![(pid, 0)] {
            return 5;
        }
        0
    });
}

/// 测试 3: 进程列表
#[test]
fn test_process_list_and_parentage() {
    let k = single_cpu();
    k.register_fn("child", |sys: &Posix, _: &[String]| {
        if sys.getppid() != Some(1) {
            return 1;
        }
        let _ = sys.pause();
        0
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.getpid() != 1 || sys.getppid().is_some() {
            return 1;
        }
        let pid = match sys.fork_exec("child", &["--flag", "x"]) {
            Ok(pid) => pid,
            Err(_) => return 2,
        };
        sys.reschedule();

        let list = sys.process_list();
        let me = match list.iter().find(|info| info.pid == 1) {
            Some(info) => info,
            None => return 3,
        };
        if me.state != ProcessState::Running || me.syscall.as_deref() != Some("process_list") {
            return 4;
        }
        let child = match list.iter().find(|info| info.pid == pid) {
            Some(info) => info,
            None => return 5,
        };
        if child.ppid != Some(1) || child.cmdline != ["child", "--flag", "x"] {
            return 6;
        }
        if child.state != ProcessState::Sleeping || child.syscall.as_deref() != Some("pause") {
            return 7;
        }

        if sys.kill(pid, crate::signal::Signal::SIGKILL as i32).is_err() {
            return 8;
        }
        if reap(sys, 1) != vec![(pid, 137)] {
            return 9;
        }
        if sys.process_list().iter().any(|info| info.pid == pid) {
            return 10;
        }
        0
    });
}

/// 测试 4: 父进程先退出，孙进程由 init 回收
#[test]
fn test_orphans_are_reparented_to_init() {
    let k = single_cpu();
    k.register_fn("grandchild", |sys: &Posix, _: &[String]| {
        match sys.recvmsg(None, None) {
            Ok(_) if sys.getppid() == Some(1) => 3,
            _ => 4,
        }
    });
    k.register_fn("parent", |sys: &Posix, _: &[String]| {
        match sys.fork_exec("grandchild", &[]) {
            Ok(pid) => pid as i32,
            Err(_) => -1,
        }
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.fork_exec("parent", &[]).is_err() {
            return 1;
        }
        let grandchild = match reap(sys, 1).first() {
            Some(&(_, code)) if code > 0 => code as u32,
            _ => return 2,
        };
        if sys.sendmsg(grandchild, 0, ()).is_err() {
            return 3;
        }
        if reap(sys, 1) != vec![(grandchild, 3)] {
            return 4;
        }
        0
    });
}

/// 测试 5: 进程故障不影响内核
#[test]
fn test_faulting_process_exits_with_139() {
    let k = single_cpu();
    k.register_fn("crasher", |_sys: &Posix, _: &[String]| -> i32 {
        let v: Vec<i32> = Vec::new();
        v[3]
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.fork_exec("crasher", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        if reap(sys, 1) != vec![(pid, 139)] {
            return 2;
        }
        0
    });
}

/// 测试 6: init 故障是内核 panic
#[test]
fn test_init_fault_panics_kernel() {
    let k = single_cpu();
    k.register_fn("init", |_sys: &Posix, _: &[String]| -> i32 { panic!("boom") });
    match run(&k, "init") {
        Some(HaltReason::Panic(msg)) => assert!(msg.contains("boom")),
        other => panic!("unexpected halt: {:?}", other),
    }
}

/// 测试 7: 内核模块
#[test]
fn test_loadmodule() {
    let k = single_cpu();
    k.register_fn("svc", |sys: &Posix, _: &[String]| {
        match sys.recvmsg(None, Some(1)) {
            Ok(_) => 0,
            Err(_) => 1,
        }
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        let pid = match sys.loadmodule("svc", &[]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        if sys.kernel().modules() != vec![(String::from("svc"), pid)] {
            return 2;
        }
        sys.reschedule();
        // 模块不接收信号
        if sys.kill(pid, crate::signal::Signal::SIGKILL as i32).is_err() {
            return 3;
        }
        if sys.sendmsg(pid, 1, ()).is_err() {
            return 4;
        }
        if reap(sys, 1) != vec![(pid, 0)] {
            return 5;
        }
        if !sys.kernel().modules().is_empty() {
            return 6;
        }
        0
    });
}

/// 测试 8: 停机放行所有停放的进程线程
#[test]
fn test_halt_ends_leftover_processes() {
    let k = single_cpu();
    k.register_fn("pauser", |sys: &Posix, _: &[String]| {
        let _ = sys.pause();
        0
    });
    k.register_fn("receiver", |sys: &Posix, _: &[String]| {
        let _ = sys.recvmsg(None, None);
        0
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.fork_exec("pauser", &[]).is_err() || sys.fork_exec("receiver", &[]).is_err() {
            return 1;
        }
        let stopped = match sys.fork_exec("pauser", &[]) {
            Ok(pid) => pid,
            Err(_) => return 2,
        };
        sys.reschedule();
        if sys.kill(stopped, crate::signal::Signal::SIGSTOP as i32).is_err() {
            return 3;
        }
        sys.reschedule();
        if sys.process_list().len() != 4 {
            return 4;
        }
        // 不回收子进程直接退出
        0
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while !k.get_process_list().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(k.get_process_list().is_empty());
}
