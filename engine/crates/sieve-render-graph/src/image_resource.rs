use ash::vk;
use sieve_gfx::handles::GfxImageHandle;
use sieve_gfx::resources::image::GfxImageDesc;

use crate::resource_state::RgImageState;

/// 图像资源描述（用于创建临时资源）
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

// new & init
impl RgImageDesc {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self { width, height, format, usage }
    }

    #[inline]
    pub fn to_gfx_desc(&self) -> GfxImageDesc {
        GfxImageDesc::new_2d(self.width, self.height, self.format, self.usage)
    }
}

/// 图像资源的来源
#[derive(Clone, Debug)]
pub enum RgImageSource {
    /// 从外部导入的图像
    Imported { image_handle: GfxImageHandle, format: vk::Format },
    /// 由 RenderGraph 创建的临时图像
    Transient { desc: RgImageDesc },
}

/// 图像资源条目
#[derive(Clone, Debug)]
pub struct RgImageResource {
    pub source: RgImageSource,
    pub initial_state: RgImageState,
    pub name: String,
    pub version: u32,
}

// new & init
impl RgImageResource {
    pub fn imported(
        name: impl Into<String>,
        image_handle: GfxImageHandle,
        format: vk::Format,
        initial_state: RgImageState,
    ) -> Self {
        Self {
            source: RgImageSource::Imported { image_handle, format },
            initial_state,
            name: name.into(),
            version: 0,
        }
    }

    pub fn transient(name: impl Into<String>, desc: RgImageDesc) -> Self {
        Self {
            source: RgImageSource::Transient { desc },
            initial_state: RgImageState::UNDEFINED,
            name: name.into(),
            version: 0,
        }
    }
}

// getter
impl RgImageResource {
    #[inline]
    pub fn imported_handle(&self) -> Option<GfxImageHandle> {
        match &self.source {
            RgImageSource::Imported { image_handle, .. } => Some(*image_handle),
            RgImageSource::Transient { .. } => None,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        match &self.source {
            RgImageSource::Imported { format, .. } => *format,
            RgImageSource::Transient { desc } => desc.format,
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(&self.source, RgImageSource::Transient { .. })
    }

    /// 根据格式推断 barrier 使用的 aspect
    #[inline]
    pub fn infer_aspect(&self) -> vk::ImageAspectFlags {
        GfxImageDesc { format: self.format(), ..Default::default() }.infer_aspect()
    }
}
