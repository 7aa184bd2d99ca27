use ash::vk;
use sieve_gfx::handles::GfxBufferHandle;
use sieve_gfx::resources::buffer::GfxBufferDesc;

use crate::resource_state::RgBufferState;

/// 缓冲区资源描述（用于创建临时资源）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferDesc {
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    /// 缓冲区用途，只有用途相同的临时资源才会共享物理 buffer
    pub usage: vk::BufferUsageFlags,
}

// new & init
impl RgBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }

    #[inline]
    pub fn new_ssbo(size: vk::DeviceSize) -> Self {
        let desc = GfxBufferDesc::new_ssbo(size);
        Self { size: desc.size, usage: desc.usage }
    }

    /// 可以作为 indirect 参数的 storage buffer
    #[inline]
    pub fn new_indirect(size: vk::DeviceSize) -> Self {
        let desc = GfxBufferDesc::new_indirect(size);
        Self { size: desc.size, usage: desc.usage }
    }

    #[inline]
    pub fn to_gfx_desc(&self) -> GfxBufferDesc {
        GfxBufferDesc::new(self.size, self.usage)
    }
}

/// 缓冲区资源的来源
#[derive(Clone, Debug)]
pub enum RgBufferSource {
    /// 从外部导入的缓冲区，graph 不负责其生命周期
    Imported { buffer_handle: GfxBufferHandle },
    /// 由 RenderGraph 创建的临时缓冲区
    Transient { desc: RgBufferDesc },
}

/// 缓冲区资源条目
#[derive(Clone, Debug)]
pub struct RgBufferResource {
    pub source: RgBufferSource,
    /// 导入时的状态；临时资源为 UNDEFINED
    pub initial_state: RgBufferState,
    /// 调试名称
    pub name: String,
    /// 当前版本
    pub version: u32,
}

// new & init
impl RgBufferResource {
    pub fn imported(name: impl Into<String>, buffer_handle: GfxBufferHandle, initial_state: RgBufferState) -> Self {
        Self {
            source: RgBufferSource::Imported { buffer_handle },
            initial_state,
            name: name.into(),
            version: 0,
        }
    }

    pub fn transient(name: impl Into<String>, desc: RgBufferDesc) -> Self {
        Self {
            source: RgBufferSource::Transient { desc },
            initial_state: RgBufferState::UNDEFINED,
            name: name.into(),
            version: 0,
        }
    }
}

// getter
impl RgBufferResource {
    /// 物理 buffer handle（仅对导入资源有效）
    #[inline]
    pub fn imported_handle(&self) -> Option<GfxBufferHandle> {
        match &self.source {
            RgBufferSource::Imported { buffer_handle } => Some(*buffer_handle),
            RgBufferSource::Transient { .. } => None,
        }
    }

    #[inline]
    pub fn transient_desc(&self) -> Option<&RgBufferDesc> {
        match &self.source {
            RgBufferSource::Imported { .. } => None,
            RgBufferSource::Transient { desc } => Some(desc),
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(&self.source, RgBufferSource::Transient { .. })
    }
}
