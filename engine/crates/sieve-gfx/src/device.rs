use ash::vk;

use crate::{
    commands::command_buffer::GfxCommandBuffer,
    handles::{GfxBufferHandle, GfxImageHandle, GfxPipelineHandle},
    resources::{buffer::GfxBufferDesc, image::GfxImageDesc, pipeline::GfxComputePipelineDesc},
};

/// 图形后端的边界
///
/// 核心逻辑只通过这个 trait 访问设备：创建资源、写入 host visible 的 buffer、
/// 提交录制好的命令。读回数据不属于这里，由具体的后端自行提供。
pub trait GfxDevice {
    /// 创建的 buffer 内容为 0
    fn create_buffer(&mut self, desc: &GfxBufferDesc, debug_name: &str) -> GfxBufferHandle;
    fn destroy_buffer(&mut self, buffer: GfxBufferHandle);
    fn buffer_size(&self, buffer: GfxBufferHandle) -> vk::DeviceSize;

    /// 新创建的 image 处于 `UNDEFINED` layout
    fn create_image(&mut self, desc: &GfxImageDesc, debug_name: &str) -> GfxImageHandle;
    fn destroy_image(&mut self, image: GfxImageHandle);

    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> GfxPipelineHandle;

    /// 只能写入 host visible 的 buffer
    fn write_buffer(&mut self, buffer: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]);

    /// 提交并执行一个命令缓冲
    fn submit(&mut self, cmd: GfxCommandBuffer);
}
