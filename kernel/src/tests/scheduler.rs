// 测试：调度策略
//
// 测试内容：
// 1. FIFO - 单 CPU 上子进程按创建顺序运行
// 2. Priority - 高优先级类别先运行
// 3. Lottery / Prioritized-Lottery - 所有进程最终都能运行
// 4. 时钟抢占 - 忙循环进程在系统调用边界让出 CPU

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{config, kernel, reap, run_init};
use crate::config::{PriorityClass, SchedPolicy};
use crate::posix::Posix;

/// 子进程把自己的名字记到 `log`
fn register_recorder(k: &Arc<crate::kernel::Kernel>, log: &Arc<Mutex<Vec<String>>>) {
    let log = log.clone();
    k.register_fn("recorder", move |_sys: &Posix, args: &[String]| {
        let tag = args.get(1).cloned().unwrap_or_default();
        log.lock().unwrap().push(tag);
        0
    });
}

/// 测试 1: FIFO 按到达顺序派发
#[test]
fn test_fifo_runs_children_in_creation_order() {
    let k = kernel(config(1, SchedPolicy::Fifo));
    let log = Arc::new(Mutex::new(Vec::new()));
    register_recorder(&k, &log);

    run_init(&k, |sys: &Posix, _: &[String]| {
        for tag in ["A", "B", "C"] {
            if sys.fork_exec("recorder", &[tag]).is_err() {
                return 1;
            }
        }
        let exits = reap(sys, 3);
        if exits.len() != 3 || exits.iter().any(|&(_, code)| code != 0) {
            return 2;
        }
        0
    });
    assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
}

/// 测试 2: 高优先级类别的进程先被派发
#[test]
fn test_priority_prefers_high_class() {
    let k = kernel(config(1, SchedPolicy::Priority));
    let log = Arc::new(Mutex::new(Vec::new()));
    register_recorder(&k, &log);

    run_init(&k, |sys: &Posix, _: &[String]| {
        let low = match sys.fork_exec("recorder", &["low"]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        let high = match sys.fork_exec("recorder", &["high"]) {
            Ok(pid) => pid,
            Err(_) => return 1,
        };
        if !sys.set_priority(low, PriorityClass::Low) || !sys.set_priority(high, PriorityClass::High) {
            return 2;
        }
        if reap(sys, 2).len() != 2 {
            return 3;
        }
        0
    });
    assert_eq!(*log.lock().unwrap(), vec!["high", "low"]);
}

/// 测试 3: 彩票调度下所有进程都能运行完
#[test]
fn test_lottery_policies_run_everyone() {
    for policy in [SchedPolicy::Lottery, SchedPolicy::PrioritizedLottery] {
        let k = kernel(config(2, policy));
        let log = Arc::new(Mutex::new(Vec::new()));
        register_recorder(&k, &log);

        run_init(&k, |sys: &Posix, _: &[String]| {
            let tags = ["p0", "p1", "p2", "p3", "p4"];
            for (i, tag) in tags.iter().enumerate() {
                let pid = match sys.fork_exec("recorder", &[tag]) {
                    Ok(pid) => pid,
                    Err(_) => return 1,
                };
                if i % 2 == 0 {
                    sys.set_priority(pid, PriorityClass::High);
                }
            }
            if reap(sys, tags.len()).len() != tags.len() {
                return 2;
            }
            0
        });

        let mut seen = log.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["p0", "p1", "p2", "p3", "p4"]);
    }
}

/// 测试 4: FIFO 不区分优先级
#[test]
fn test_fifo_ignores_priority() {
    let k = kernel(config(1, SchedPolicy::Fifo));
    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.set_priority(sys.getpid(), PriorityClass::High) {
            return 1;
        }
        0
    });
}

/// 测试 5: 时钟抢占让忙循环进程让出唯一的 CPU
#[test]
fn test_tick_preempts_busy_process() {
    let mut cfg = config(1, SchedPolicy::Fifo);
    cfg.time_slice_ms = 5;
    let k = kernel(cfg);
    let flag = Arc::new(AtomicBool::new(false));

    let spin_flag = flag.clone();
    k.register_fn("spinner", move |sys: &Posix, _: &[String]| {
        // 每轮一个系统调用，给抢占留出机会
        while !spin_flag.load(Ordering::SeqCst) {
            let _ = sys.kill(sys.getpid(), 0);
        }
        0
    });
    let set_flag = flag.clone();
    k.register_fn("setter", move |_sys: &Posix, _: &[String]| {
        set_flag.store(true, Ordering::SeqCst);
        0
    });

    run_init(&k, |sys: &Posix, _: &[String]| {
        if sys.fork_exec("spinner", &[]).is_err() || sys.fork_exec("setter", &[]).is_err() {
            return 1;
        }
        if reap(sys, 2).len() != 2 {
            return 2;
        }
        0
    });
    assert!(flag.load(Ordering::SeqCst));
}
