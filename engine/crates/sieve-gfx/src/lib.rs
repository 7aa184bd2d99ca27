//! Sieve GFX 层
//!
//! 真正的图形设备不在本仓库的范围内，这里只提供：
//!
//! - **GfxCommandBuffer**: 录制式的命令流（barrier、copy、fill、dispatch、indirect draw）
//! - **GfxDevice**: 后端的边界，负责资源创建、上传和提交
//! - **soft**: 在 CPU 上确定性执行命令流的后端，同时校验同步是否正确

pub mod basic;
pub mod commands;
pub mod device;
pub mod frame_counter;
pub mod handles;
pub mod resources;
pub mod soft;
