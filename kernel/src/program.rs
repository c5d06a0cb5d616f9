//! 可执行程序注册表
//!
//! 模拟的"程序"是注册在内核里的 Rust 代码，`fork_exec` 按名字实例化，
//! 参数以字符串列表传入，第一个元素是程序名。

use std::collections::BTreeMap;

use crate::errno::{Errno, KResult};
use crate::posix::Posix;
use crate::process::Pid;

/// 用户程序
///
/// `main` 的返回值是进程退出码。程序只能通过 `sys` 访问内核。
pub trait UserProgram: Send {
    fn main(&mut self, sys: &Posix, args: &[String]) -> i32;
}

impl<F> UserProgram for F
where
    F: FnMut(&Posix, &[String]) -> i32 + Send,
{
    fn main(&mut self, sys: &Posix, args: &[String]) -> i32 {
        self(sys, args)
    }
}

type Factory = Box<dyn Fn() -> Box<dyn UserProgram> + Send + Sync>;

/// 程序名 -> 构造函数
#[derive(Default)]
pub struct ProgramRegistry {
    programs: BTreeMap<String, Factory>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self {
            programs: BTreeMap::new(),
        }
    }

    /// 注册程序，同名时替换
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn UserProgram> + Send + Sync + 'static,
    {
        self.programs.insert(name.to_string(), Box::new(factory));
    }

    /// 构造一个新的程序实例
    pub fn instantiate(&self, name: &str) -> KResult<Box<dyn UserProgram>> {
        self.programs
            .get(name)
            .map(|factory| factory())
            .ok_or(Errno::NoSuchFileOrDirectory)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.programs.keys().cloned().collect()
    }
}

/// 已加载的内核模块（以内核进程运行的程序）
#[derive(Debug, Default)]
pub struct ModuleTable {
    modules: BTreeMap<Pid, String>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, pid: Pid) {
        self.modules.insert(pid, name.to_string());
    }

    /// 模块进程退出时移除
    pub fn remove_pid(&mut self, pid: Pid) -> Option<String> {
        self.modules.remove(&pid)
    }

    /// (模块名, pid)，按 pid 排序
    pub fn list(&self) -> Vec<(String, Pid)> {
        self.modules
            .iter()
            .map(|(pid, name)| (name.clone(), *pid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_program() {
        let reg = ProgramRegistry::new();
        assert_eq!(reg.instantiate("nope").err(), Some(Errno::NoSuchFileOrDirectory));
    }

    #[test]
    fn test_register_and_list() {
        let mut reg = ProgramRegistry::new();
        reg.register("b", || Box::new(|_: &Posix, _: &[String]| 0) as Box<dyn UserProgram>);
        reg.register("a", || Box::new(|_: &Posix, _: &[String]| 1) as Box<dyn UserProgram>);
        assert!(reg.contains("a"));
        assert!(reg.instantiate("a").is_ok());
        assert_eq!(reg.names(), vec![String::from("a"), String::from("b")]);
    }

    #[test]
    fn test_module_table() {
        let mut mods = ModuleTable::new();
        mods.insert("netd", 7);
        mods.insert("logd", 3);
        assert_eq!(mods.list(), vec![(String::from("logd"), 3), (String::from("netd"), 7)]);
        assert_eq!(mods.remove_pid(3).as_deref(), Some("logd"));
        assert_eq!(mods.remove_pid(3), None);
    }
}
