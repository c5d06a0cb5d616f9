//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 编号与 include/uapi/asm-generic/errno-base.h 一致。
//! 内核内部统一返回 `KResult<T>`，需要系统调用风格的负数时用 `as_neg_i32()`。

use core::fmt;

/// 内核操作的返回类型
pub type KResult<T> = Result<T, Errno>;

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use simkern::errno::{Errno, KResult};
///
/// fn lookup(fd: usize) -> KResult<usize> {
///     if fd > 32 {
///         return Err(Errno::BadFileNumber);
///     }
///     Ok(fd)
/// }
/// assert_eq!(lookup(64).unwrap_err().as_neg_i32(), -9);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such file or directory (ENOENT, 2)
    NoSuchFileOrDirectory = 2,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// I/O error (EIO, 5)
    IOError = 5,

    /// No such device or address (ENXIO, 6)
    NoSuchDeviceOrAddress = 6,

    /// Argument list too long (E2BIG, 7)
    ArgumentListTooLong = 7,

    /// Exec format error (ENOEXEC, 8)
    ExecFormatError = 8,

    /// Bad file number (EBADF, 9)
    BadFileNumber = 9,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Permission denied (EACCES, 13)
    PermissionDenied = 13,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// File exists (EEXIST, 17)
    FileExists = 17,

    /// No such device (ENODEV, 19)
    NoSuchDevice = 19,

    /// Not a directory (ENOTDIR, 20)
    NotADirectory = 20,

    /// Is a directory (EISDIR, 21)
    IsADirectory = 21,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// File table overflow (ENFILE, 23)
    FileTableOverflow = 23,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,

    /// Not a typewriter (ENOTTY, 25)
    NotATypewriter = 25,

    /// No space left on device (ENOSPC, 28)
    NoSpaceLeftOnDevice = 28,

    /// Illegal seek (ESPIPE, 29)
    IllegalSeek = 29,

    /// Broken pipe (EPIPE, 32)
    BrokenPipe = 32,

    /// File name too long (ENAMETOOLONG, 36)
    NameTooLong = 36,

    /// Function not implemented (ENOSYS, 38)
    FunctionNotImplemented = 38,

    /// Operation not supported (EOPNOTSUPP, 95)
    NotSupported = 95,
}

/// 全部错误码，按编号排列
const ALL: [Errno; 29] = [
    Errno::OperationNotPermitted,
    Errno::NoSuchFileOrDirectory,
    Errno::NoSuchProcess,
    Errno::InterruptedSystemCall,
    Errno::IOError,
    Errno::NoSuchDeviceOrAddress,
    Errno::ArgumentListTooLong,
    Errno::ExecFormatError,
    Errno::BadFileNumber,
    Errno::NoChild,
    Errno::TryAgain,
    Errno::OutOfMemory,
    Errno::PermissionDenied,
    Errno::BadAddress,
    Errno::DeviceOrResourceBusy,
    Errno::FileExists,
    Errno::NoSuchDevice,
    Errno::NotADirectory,
    Errno::IsADirectory,
    Errno::InvalidArgument,
    Errno::FileTableOverflow,
    Errno::TooManyOpenFiles,
    Errno::NotATypewriter,
    Errno::NoSpaceLeftOnDevice,
    Errno::IllegalSeek,
    Errno::BrokenPipe,
    Errno::NameTooLong,
    Errno::FunctionNotImplemented,
    Errno::NotSupported,
];

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 从正数或负数错误码还原
    pub fn from_i32(code: i32) -> Option<Errno> {
        let code = code.checked_abs()?;
        ALL.iter().copied().find(|e| e.as_i32() == code)
    }

    /// 符号名，例如 "EINTR"
    pub const fn name(self) -> &'static str {
        match self {
            Errno::OperationNotPermitted => "EPERM",
            Errno::NoSuchFileOrDirectory => "ENOENT",
            Errno::NoSuchProcess => "ESRCH",
            Errno::InterruptedSystemCall => "EINTR",
            Errno::IOError => "EIO",
            Errno::NoSuchDeviceOrAddress => "ENXIO",
            Errno::ArgumentListTooLong => "E2BIG",
            Errno::ExecFormatError => "ENOEXEC",
            Errno::BadFileNumber => "EBADF",
            Errno::NoChild => "ECHILD",
            Errno::TryAgain => "EAGAIN",
            Errno::OutOfMemory => "ENOMEM",
            Errno::PermissionDenied => "EACCES",
            Errno::BadAddress => "EFAULT",
            Errno::DeviceOrResourceBusy => "EBUSY",
            Errno::FileExists => "EEXIST",
            Errno::NoSuchDevice => "ENODEV",
            Errno::NotADirectory => "ENOTDIR",
            Errno::IsADirectory => "EISDIR",
            Errno::InvalidArgument => "EINVAL",
            Errno::FileTableOverflow => "ENFILE",
            Errno::TooManyOpenFiles => "EMFILE",
            Errno::NotATypewriter => "ENOTTY",
            Errno::NoSpaceLeftOnDevice => "ENOSPC",
            Errno::IllegalSeek => "ESPIPE",
            Errno::BrokenPipe => "EPIPE",
            Errno::NameTooLong => "ENAMETOOLONG",
            Errno::FunctionNotImplemented => "ENOSYS",
            Errno::NotSupported => "EOPNOTSUPP",
        }
    }

    /// 错误描述
    pub const fn description(self) -> &'static str {
        match self {
            Errno::OperationNotPermitted => "operation not permitted",
            Errno::NoSuchFileOrDirectory => "no such file or directory",
            Errno::NoSuchProcess => "no such process",
            Errno::InterruptedSystemCall => "interrupted system call",
            Errno::IOError => "I/O error",
            Errno::NoSuchDeviceOrAddress => "no such device or address",
            Errno::ArgumentListTooLong => "argument list too long",
            Errno::ExecFormatError => "exec format error",
            Errno::BadFileNumber => "bad file descriptor",
            Errno::NoChild => "no child processes",
            Errno::TryAgain => "resource temporarily unavailable",
            Errno::OutOfMemory => "out of memory",
            Errno::PermissionDenied => "permission denied",
            Errno::BadAddress => "bad address",
            Errno::DeviceOrResourceBusy => "device or resource busy",
            Errno::FileExists => "file exists",
            Errno::NoSuchDevice => "no such device",
            Errno::NotADirectory => "not a directory",
            Errno::IsADirectory => "is a directory",
            Errno::InvalidArgument => "invalid argument",
            Errno::FileTableOverflow => "file table overflow",
            Errno::TooManyOpenFiles => "too many open files",
            Errno::NotATypewriter => "inappropriate ioctl for device",
            Errno::NoSpaceLeftOnDevice => "no space left on device",
            Errno::IllegalSeek => "illegal seek",
            Errno::BrokenPipe => "broken pipe",
            Errno::NameTooLong => "file name too long",
            Errno::FunctionNotImplemented => "function not implemented",
            Errno::NotSupported => "operation not supported",
        }
    }
}

/// 按错误码（正负均可）查找描述，未知编号返回 "unknown error"
///
/// 对应 C 库的 strerror()
pub fn strerror(code: i32) -> &'static str {
    match Errno::from_i32(code) {
        Some(e) => e.description(),
        None => "unknown error",
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.name())
    }
}

impl std::error::Error for Errno {}

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const ENXIO: i32 = 6;
    pub const E2BIG: i32 = 7;
    pub const ENOEXEC: i32 = 8;
    pub const EBADF: i32 = 9;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const ENOTTY: i32 = 25;
    pub const ENOSPC: i32 = 28;
    pub const ESPIPE: i32 = 29;
    pub const EPIPE: i32 = 32;
    pub const ENAMETOOLONG: i32 = 36;
    pub const ENOSYS: i32 = 38;
    pub const EOPNOTSUPP: i32 = 95;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(Errno::NoSuchProcess.as_i32(), 3);
        assert_eq!(Errno::InterruptedSystemCall.as_i32(), 4);
        assert_eq!(Errno::BrokenPipe.as_i32(), 32);
        assert_eq!(Errno::NotSupported.as_i32(), 95);
    }

    #[test]
    fn test_errno_negative() {
        assert_eq!(Errno::BadFileNumber.as_neg_i32(), -9);
        assert_eq!(Errno::InvalidArgument.as_neg_i32(), -22);
    }

    #[test]
    fn test_errno_constants() {
        assert_eq!(constants::ESRCH, Errno::NoSuchProcess.as_i32());
        assert_eq!(constants::EPIPE, Errno::BrokenPipe.as_i32());
        assert_eq!(constants::EEXIST, Errno::FileExists.as_i32());
    }

    #[test]
    fn test_errno_roundtrip_table() {
        for e in ALL {
            assert_eq!(Errno::from_i32(e.as_i32()), Some(e));
            assert_eq!(Errno::from_i32(e.as_neg_i32()), Some(e));
        }
        assert_eq!(Errno::from_i32(0), None);
        assert_eq!(Errno::from_i32(15), None);
    }

    #[test]
    fn test_strerror() {
        assert_eq!(strerror(-4), "interrupted system call");
        assert_eq!(strerror(32), "broken pipe");
        assert_eq!(strerror(1234), "unknown error");
        assert_eq!(format!("{}", Errno::NoSuchProcess), "no such process (ESRCH)");
    }
}
