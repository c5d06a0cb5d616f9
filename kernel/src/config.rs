//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核配置
//!
//! 编译期默认值由 build.rs 根据 Kernel.toml 生成（见 `defaults`），
//! 运行期可以用 [`KernelConfig::from_toml_str`] / [`KernelConfig::load`] 覆盖。

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 编译期生成的默认常量
pub mod defaults {
    include!(concat!(env!("OUT_DIR"), "/config_defaults.rs"));
}

/// 彩票空间大小：彩票号取自 [0, TICKET_SPACE)
pub const TICKET_SPACE: u32 = i32::MAX as u32;

/// 信号表大小
pub const NSIGS: usize = 32;

/// 调度策略
///
/// 内核初始化时读取一次，之后不可更换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// 先进先出
    Fifo,
    /// 彩票调度，每个进程一张彩票
    Lottery,
    /// 优先级轮转，每次调度后优先级衰减
    Priority,
    /// 按优先级分配彩票数的彩票调度
    PrioritizedLottery,
}

impl SchedPolicy {
    /// 从配置字符串解析
    pub fn parse(name: &str) -> Option<SchedPolicy> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fifo" => Some(SchedPolicy::Fifo),
            "lottery" => Some(SchedPolicy::Lottery),
            "priority" | "rr" | "priority_rr" => Some(SchedPolicy::Priority),
            "prioritized_lottery" | "prio_lottery" => Some(SchedPolicy::PrioritizedLottery),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SchedPolicy::Fifo => "fifo",
            SchedPolicy::Lottery => "lottery",
            SchedPolicy::Priority => "priority",
            SchedPolicy::PrioritizedLottery => "prioritized_lottery",
        }
    }
}

/// 进程优先级类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Low,
    Medium,
    High,
}

impl Default for PriorityClass {
    fn default() -> Self {
        PriorityClass::Medium
    }
}

/// 每个优先级类别分配的彩票数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketCounts {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for TicketCounts {
    fn default() -> Self {
        Self {
            low: defaults::LOTTERY_TICKETS_LOW,
            medium: defaults::LOTTERY_TICKETS_MEDIUM,
            high: defaults::LOTTERY_TICKETS_HIGH,
        }
    }
}

impl TicketCounts {
    pub fn for_class(&self, class: PriorityClass) -> u32 {
        match class {
            PriorityClass::Low => self.low,
            PriorityClass::Medium => self.medium,
            PriorityClass::High => self.high,
        }
    }

    pub fn set_for_class(&mut self, class: PriorityClass, count: u32) {
        match class {
            PriorityClass::Low => self.low = count,
            PriorityClass::Medium => self.medium = count,
            PriorityClass::High => self.high = count,
        }
    }

    fn max(&self) -> u32 {
        self.low.max(self.medium).max(self.high)
    }
}

/// 每个优先级类别对应的优先级轮转初始级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityLevels {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for PriorityLevels {
    fn default() -> Self {
        Self {
            low: defaults::PRIORITY_LEVEL_LOW,
            medium: defaults::PRIORITY_LEVEL_MEDIUM,
            high: defaults::PRIORITY_LEVEL_HIGH,
        }
    }
}

impl PriorityLevels {
    pub fn for_class(&self, class: PriorityClass) -> u32 {
        match class {
            PriorityClass::Low => self.low,
            PriorityClass::Medium => self.medium,
            PriorityClass::High => self.high,
        }
    }
}

/// 运行期内核配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// 虚拟 CPU 数量
    pub ncpus: usize,
    /// 调度策略
    pub scheduler: SchedPolicy,
    /// 抢占时间片（毫秒），0 关闭抢占
    pub time_slice_ms: u64,
    /// 最大进程数
    pub max_processes: usize,
    /// 每个进程的文件描述符槽位数
    pub max_files_per_process: usize,
    /// 管道缓冲区大小
    pub pipe_buffer_size: usize,
    /// 定时器队列容量
    pub max_timer_tasks: usize,
    /// 彩票数配置
    pub lottery_tickets: TicketCounts,
    /// 优先级轮转级别配置
    pub priority_levels: PriorityLevels,
    /// 彩票调度随机种子，None 时取当前时间
    pub lottery_seed: Option<u64>,
    /// 日志级别 (error/warn/info/debug/trace/off)
    pub log_level: String,
    /// 内核日志保留行数
    pub kernel_log_lines: usize,
    /// 是否把内核日志回显到 stderr
    pub log_echo: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            ncpus: defaults::DEFAULT_NCPUS,
            scheduler: SchedPolicy::parse(defaults::DEFAULT_SCHEDULER).unwrap_or(SchedPolicy::Fifo),
            time_slice_ms: defaults::DEFAULT_TIME_SLICE_MS,
            max_processes: defaults::MAX_PROCESSES,
            max_files_per_process: defaults::MAX_FILES_PER_PROCESS,
            pipe_buffer_size: defaults::PIPE_BUFFER_SIZE,
            max_timer_tasks: defaults::MAX_TIMER_TASKS,
            lottery_tickets: TicketCounts::default(),
            priority_levels: PriorityLevels::default(),
            lottery_seed: None,
            log_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
            kernel_log_lines: defaults::KERNEL_LOG_LINES,
            log_echo: true,
        }
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML 解析失败
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值非法
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl KernelConfig {
    /// 解析 TOML 文本，未出现的字段取默认值
    pub fn from_toml_str(text: &str) -> Result<KernelConfig, ConfigError> {
        let config: KernelConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取并解析配置文件
    pub fn load<P: AsRef<Path>>(path: P) -> Result<KernelConfig, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 读取可有可无的配置文件
    ///
    /// 文件不存在时静默使用默认值。文件存在但读不了或内容非法时同样退回
    /// 默认值，并把错误一起返回给调用者报告。
    pub fn load_optional<P: AsRef<Path>>(path: P) -> (KernelConfig, Option<ConfigError>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                (KernelConfig::default(), None)
            }
            Err(e) => (KernelConfig::default(), Some(e)),
        }
    }

    /// 检查取值范围
    ///
    /// 进程上限必须让全部彩票远小于彩票空间，
    /// 这样抽取唯一彩票的重试次数才有界。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ncpus == 0 {
            return Err(ConfigError::Invalid("ncpus must be at least 1"));
        }
        if self.max_processes == 0 {
            return Err(ConfigError::Invalid("max_processes must be at least 1"));
        }
        if self.max_files_per_process == 0 {
            return Err(ConfigError::Invalid("max_files_per_process must be at least 1"));
        }
        if self.pipe_buffer_size == 0 {
            return Err(ConfigError::Invalid("pipe_buffer_size must be at least 1"));
        }
        if self.max_timer_tasks == 0 {
            return Err(ConfigError::Invalid("max_timer_tasks must be at least 1"));
        }
        let t = &self.lottery_tickets;
        if t.low == 0 || t.medium == 0 || t.high == 0 {
            return Err(ConfigError::Invalid("ticket counts must be at least 1"));
        }
        let demand = (self.max_processes as u64).saturating_mul(t.max() as u64);
        if demand > (TICKET_SPACE / 2) as u64 {
            return Err(ConfigError::Invalid("max_processes too large for the ticket space"));
        }
        if self.level_filter().is_none() {
            return Err(ConfigError::Invalid("unknown log_level"));
        }
        Ok(())
    }

    /// 日志级别
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.parse().ok()
    }
}
