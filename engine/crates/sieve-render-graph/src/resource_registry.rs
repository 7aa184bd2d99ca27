use slotmap::SlotMap;

use crate::buffer_resource::RgBufferResource;
use crate::image_resource::RgImageResource;
use crate::resource_handle::{RgBufferHandle, RgBufferId, RgImageHandle, RgImageId};

/// 资源注册表
///
/// 管理 RenderGraph 中所有声明的资源，并记录每个资源的当前版本。
/// 使用 SlotMap 存储资源，提供带代际信息的 id。
#[derive(Default)]
pub struct RgResourceRegistry {
    images: SlotMap<RgImageId, RgImageResource>,
    buffers: SlotMap<RgBufferId, RgBufferResource>,
}

// new & init
impl RgResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

// register
impl RgResourceRegistry {
    pub fn register_image(&mut self, resource: RgImageResource) -> RgImageHandle {
        RgImageHandle::new(self.images.insert(resource))
    }

    pub fn register_buffer(&mut self, resource: RgBufferResource) -> RgBufferHandle {
        RgBufferHandle::new(self.buffers.insert(resource))
    }
}

// 版本校验
impl RgResourceRegistry {
    /// 校验句柄持有当前版本，返回资源条目
    pub(crate) fn checked_buffer_mut(&mut self, handle: RgBufferHandle, pass_name: &str) -> &mut RgBufferResource {
        let resource = self
            .buffers
            .get_mut(handle.id)
            .unwrap_or_else(|| panic!("[{pass_name}] unknown buffer handle {handle:?}"));
        if resource.version != handle.version {
            panic!(
                "[{pass_name}] stale handle for buffer <{}>: {:?}, current version is v{}",
                resource.name, handle, resource.version
            );
        }
        resource
    }

    pub(crate) fn checked_image_mut(&mut self, handle: RgImageHandle, pass_name: &str) -> &mut RgImageResource {
        let resource = self
            .images
            .get_mut(handle.id)
            .unwrap_or_else(|| panic!("[{pass_name}] unknown image handle {handle:?}"));
        if resource.version != handle.version {
            panic!(
                "[{pass_name}] stale handle for image <{}>: {:?}, current version is v{}",
                resource.name, handle, resource.version
            );
        }
        resource
    }
}

// getter & iter
impl RgResourceRegistry {
    #[inline]
    pub fn get_image(&self, id: RgImageId) -> Option<&RgImageResource> {
        self.images.get(id)
    }

    #[inline]
    pub fn get_buffer(&self, id: RgBufferId) -> Option<&RgBufferResource> {
        self.buffers.get(id)
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn iter_images(&self) -> impl Iterator<Item = (RgImageId, &RgImageResource)> {
        self.images.iter()
    }

    #[inline]
    pub fn iter_buffers(&self) -> impl Iterator<Item = (RgBufferId, &RgBufferResource)> {
        self.buffers.iter()
    }

    /// 资源名称，找不到时返回 `<unknown>`
    #[inline]
    pub fn buffer_name(&self, id: RgBufferId) -> &str {
        self.buffers.get(id).map(|r| r.name.as_str()).unwrap_or("<unknown>")
    }

    #[inline]
    pub fn image_name(&self, id: RgImageId) -> &str {
        self.images.get(id).map(|r| r.name.as_str()).unwrap_or("<unknown>")
    }
}
