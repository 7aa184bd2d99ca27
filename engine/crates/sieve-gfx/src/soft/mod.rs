//! CPU 上的执行后端
//!
//! 按录制顺序逐条执行命令，compute pipeline 由注册的 [`kernel::SoftKernel`] 实现，
//! 一次执行一个 workgroup。执行过程中校验 buffer 的同步和 image 的 layout。

pub mod device;
pub mod hazard;
pub mod kernel;
pub mod stats;
