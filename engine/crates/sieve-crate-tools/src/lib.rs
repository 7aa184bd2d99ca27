//! Sieve 工具集
//!
//! 目前只提供日志初始化。

pub mod init_log;
