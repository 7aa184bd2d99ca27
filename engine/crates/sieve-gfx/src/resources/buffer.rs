use ash::vk;

use crate::handles::GfxBufferHandle;

/// 创建 buffer 所需的信息
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferDesc {
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    /// 缓冲区用途
    pub usage: vk::BufferUsageFlags,
    /// 是否可以被 CPU 直接写入（stage buffer）
    pub host_visible: bool,
}

// new & init
impl GfxBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage, host_visible: false }
    }

    /// device local 的 storage buffer，可以作为 copy 的目标
    #[inline]
    pub fn new_ssbo(size: vk::DeviceSize) -> Self {
        Self::new(size, vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
    }

    /// 既是 storage buffer 又可以作为 indirect 参数
    #[inline]
    pub fn new_indirect(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::INDIRECT_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST,
        )
    }

    /// CPU 可写的 stage buffer
    #[inline]
    pub fn new_stage_buffer(size: vk::DeviceSize) -> Self {
        Self { size, usage: vk::BufferUsageFlags::TRANSFER_SRC, host_visible: true }
    }
}

/// buffer 中的一段区域，通常用于描述 vertex/index 数据在大 buffer 中的位置
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxBufferView {
    pub buffer: GfxBufferHandle,
    /// 起始偏移（字节）
    pub offset: vk::DeviceSize,
    /// 区域大小（字节）
    pub size: vk::DeviceSize,
    /// 单个元素的大小（字节）
    pub stride: u32,
}

impl GfxBufferView {
    #[inline]
    pub fn new(buffer: GfxBufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize, stride: u32) -> Self {
        Self { buffer, offset, size, stride }
    }

    /// 第一个元素在整个 buffer 中的索引
    #[inline]
    pub fn first_element(&self) -> u32 {
        if self.stride == 0 { 0 } else { (self.offset / self.stride as u64) as u32 }
    }

    /// 元素数量
    #[inline]
    pub fn element_count(&self) -> u32 {
        if self.stride == 0 { 0 } else { (self.size / self.stride as u64) as u32 }
    }
}
