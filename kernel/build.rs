//! SimKern 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 在 OUT_DIR 中生成默认配置常量 (config_defaults.rs)

use std::env;
use std::fs;
use std::path::PathBuf;

/// 从 `[section] key` 读取整数，缺省时返回 `default`
fn int_of(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 从 `[section] key` 读取字符串，缺省时返回 `default`
fn str_of(config: &toml::Value, section: &str, key: &str, default: &str) -> String {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=build.rs");

    // 读取 Kernel.toml，不存在或解析失败时使用内置默认值
    let config = match fs::read_to_string("../Kernel.toml") {
        Ok(content) => match toml::from_str::<toml::Value>(&content) {
            Ok(value) => value,
            Err(e) => {
                println!("cargo:warning=Kernel.toml 解析失败，使用默认配置: {}", e);
                toml::Value::Table(toml::map::Map::new())
            }
        },
        Err(_) => {
            println!("cargo:warning=未找到 Kernel.toml，使用默认配置");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    let kernel_name = str_of(&config, "general", "name", "SimKern");
    let kernel_version = str_of(&config, "general", "version", "0.2.3");
    println!("cargo:rustc-env=SIMKERN_NAME={}", kernel_name);
    println!("cargo:rustc-env=SIMKERN_VERSION={}", kernel_version);

    generate_config_code(&config, &kernel_name, &kernel_version);
}

fn generate_config_code(config: &toml::Value, kernel_name: &str, kernel_version: &str) {
    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            println!("cargo:warning=OUT_DIR 未设置");
            return;
        }
    };

    let code = format!(
        r#"// SimKern 默认配置（自动生成）
//
// 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

/// 内核名称
pub const KERNEL_NAME: &str = "{name}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{version}";

/// 虚拟 CPU 数量
pub const DEFAULT_NCPUS: usize = {ncpus};

/// 默认调度策略
pub const DEFAULT_SCHEDULER: &str = "{scheduler}";

/// 抢占时间片（毫秒），0 表示关闭
pub const DEFAULT_TIME_SLICE_MS: u64 = {time_slice};

/// 最大进程数
pub const MAX_PROCESSES: usize = {max_processes};

/// 每个进程的文件描述符槽位数
pub const MAX_FILES_PER_PROCESS: usize = {max_files};

/// 管道缓冲区大小（字节）
pub const PIPE_BUFFER_SIZE: usize = {pipe_size};

/// 定时器队列容量
pub const MAX_TIMER_TASKS: usize = {timer_tasks};

/// 彩票调度：各优先级分配的彩票数
pub const LOTTERY_TICKETS_LOW: u32 = {t_low};
pub const LOTTERY_TICKETS_MEDIUM: u32 = {t_medium};
pub const LOTTERY_TICKETS_HIGH: u32 = {t_high};

/// 优先级轮转：各优先级对应的初始级别
pub const PRIORITY_LEVEL_LOW: u32 = {p_low};
pub const PRIORITY_LEVEL_MEDIUM: u32 = {p_medium};
pub const PRIORITY_LEVEL_HIGH: u32 = {p_high};

/// 默认日志级别
pub const DEFAULT_LOG_LEVEL: &str = "{log_level}";

/// 内核日志环形缓冲区行数
pub const KERNEL_LOG_LINES: usize = {log_lines};
"#,
        name = kernel_name,
        version = kernel_version,
        ncpus = int_of(config, "cpu", "ncpus", 2).max(1),
        scheduler = str_of(config, "cpu", "scheduler", "fifo"),
        time_slice = int_of(config, "cpu", "time_slice_ms", 20).max(0),
        max_processes = int_of(config, "process", "max_processes", 1024).max(1),
        max_files = int_of(config, "process", "max_files_per_process", 32).max(3),
        pipe_size = int_of(config, "ipc", "pipe_buffer_size", 4096).max(1),
        timer_tasks = int_of(config, "ipc", "max_timer_tasks", 128).max(1),
        t_low = int_of(config, "lottery", "tickets_low", 1).max(1),
        t_medium = int_of(config, "lottery", "tickets_medium", 2).max(1),
        t_high = int_of(config, "lottery", "tickets_high", 3).max(1),
        p_low = int_of(config, "priority", "level_low", 20).max(0),
        p_medium = int_of(config, "priority", "level_medium", 50).max(0),
        p_high = int_of(config, "priority", "level_high", 100).max(0),
        log_level = str_of(config, "debug", "log_level", "info"),
        log_lines = int_of(config, "debug", "kernel_log_lines", 64).max(1),
    );

    if let Err(e) = fs::write(out_dir.join("config_defaults.rs"), code) {
        println!("cargo:warning=无法写入 config_defaults.rs: {}", e);
    }
}
