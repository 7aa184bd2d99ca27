//! RenderGraph 资源句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用，与 `GfxDevice` 的物理句柄分离。
//! id 是带代际信息的 slotmap key，version 跟踪资源被写入的次数。

use std::fmt;

use slotmap::new_key_type;

new_key_type! {
    /// buffer 在 `RgResourceRegistry` 中的 key
    pub struct RgBufferId;
    /// image 在 `RgResourceRegistry` 中的 key
    pub struct RgImageId;
}

/// Graph 内部的 Buffer 句柄
///
/// 只有持有当前版本的句柄才能读写资源，写入后需要使用返回的新版本句柄。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgBufferHandle {
    pub(crate) id: RgBufferId,
    /// 版本号，每次写操作后递增
    pub(crate) version: u32,
}

impl RgBufferHandle {
    #[inline]
    pub(crate) fn new(id: RgBufferId) -> Self {
        Self { id, version: 0 }
    }

    #[inline]
    pub fn id(&self) -> RgBufferId {
        self.id
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// 写操作后使用的句柄
    #[inline]
    pub(crate) fn next_version(&self) -> Self {
        Self { id: self.id, version: self.version + 1 }
    }
}

impl fmt::Debug for RgBufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgBuffer({:?}.v{})", self.id, self.version)
    }
}

/// Graph 内部的 Image 句柄
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgImageHandle {
    pub(crate) id: RgImageId,
    pub(crate) version: u32,
}

impl RgImageHandle {
    #[inline]
    pub(crate) fn new(id: RgImageId) -> Self {
        Self { id, version: 0 }
    }

    #[inline]
    pub fn id(&self) -> RgImageId {
        self.id
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub(crate) fn next_version(&self) -> Self {
        Self { id: self.id, version: self.version + 1 }
    }
}

impl fmt::Debug for RgImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgImage({:?}.v{})", self.id, self.version)
    }
}
