//! Barrier 自动计算
//!
//! 根据资源状态转换生成 buffer/image 的 memory barrier。

use ash::vk;
use sieve_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use sieve_gfx::handles::{GfxBufferHandle, GfxImageHandle};

use crate::resource_handle::{RgBufferId, RgImageId};
use crate::resource_state::{RgBufferState, RgImageState};

/// 缓冲区 Barrier 描述
#[derive(Clone, Debug)]
pub struct RgBufferBarrierDesc {
    pub resource: RgBufferId,
    pub src_state: RgBufferState,
    pub dst_state: RgBufferState,
    pub offset: vk::DeviceSize,
    /// WHOLE_SIZE 表示整个缓冲区
    pub size: vk::DeviceSize,
}

impl RgBufferBarrierDesc {
    pub fn new(resource: RgBufferId, src_state: RgBufferState, dst_state: RgBufferState) -> Self {
        Self { resource, src_state, dst_state, offset: 0, size: vk::WHOLE_SIZE }
    }

    /// 状态相同且都是只读时不需要 barrier；
    /// 任意一侧有写操作时，即使状态相同也需要 barrier
    pub fn needs_barrier(&self) -> bool {
        !(self.src_state == self.dst_state && self.src_state.is_read_only() && self.dst_state.is_read_only())
    }

    pub fn to_gfx_barrier(&self, buffer: GfxBufferHandle) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .buffer(buffer, self.offset, self.size)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
    }
}

/// 图像 Barrier 描述
#[derive(Clone, Debug)]
pub struct RgImageBarrierDesc {
    pub resource: RgImageId,
    pub src_state: RgImageState,
    pub dst_state: RgImageState,
    /// 图像 aspect（COLOR / DEPTH / STENCIL）
    pub aspect: vk::ImageAspectFlags,
}

impl RgImageBarrierDesc {
    pub fn new(resource: RgImageId, src_state: RgImageState, dst_state: RgImageState) -> Self {
        Self { resource, src_state, dst_state, aspect: vk::ImageAspectFlags::COLOR }
    }

    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn needs_barrier(&self) -> bool {
        // Layout 不同一定需要 barrier
        if self.src_state.layout != self.dst_state.layout {
            return true;
        }
        !(self.src_state == self.dst_state && self.src_state.is_read_only())
    }

    pub fn to_gfx_barrier(&self, image: GfxImageHandle) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(image)
            .layout_transfer(self.src_state.layout, self.dst_state.layout)
            .src_mask(self.src_state.stage, self.src_state.src_access())
            .dst_mask(self.dst_state.stage, self.dst_state.access)
            .image_aspect_flag(self.aspect)
    }
}

/// Pass 执行前需要的 Barrier 集合，执行时作为一次 pipeline barrier 提交
#[derive(Clone, Debug, Default)]
pub struct PassBarriers {
    pub image_barriers: Vec<RgImageBarrierDesc>,
    pub buffer_barriers: Vec<RgBufferBarrierDesc>,
}

impl PassBarriers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image_barrier(&mut self, barrier: RgImageBarrierDesc) {
        if barrier.needs_barrier() {
            self.image_barriers.push(barrier);
        }
    }

    pub fn add_buffer_barrier(&mut self, barrier: RgBufferBarrierDesc) {
        if barrier.needs_barrier() {
            self.buffer_barriers.push(barrier);
        }
    }

    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    pub fn image_barrier_count(&self) -> usize {
        self.image_barriers.len()
    }

    pub fn buffer_barrier_count(&self) -> usize {
        self.buffer_barriers.len()
    }
}

/// 编译阶段跟踪的缓冲区状态
///
/// 除了当前状态，还记录最后一次写入时的状态：
/// 之后切换到另一种读取方式时，需要再次让这次写入对新的 stage 可见。
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgTrackedBufferState {
    pub current: RgBufferState,
    pub last_write: Option<RgBufferState>,
}

impl RgTrackedBufferState {
    pub fn new(initial: RgBufferState) -> Self {
        Self { current: initial, last_write: initial.is_write().then_some(initial) }
    }

    /// 切换到 `required` 状态，返回需要的 barrier
    pub fn transition(&mut self, resource: RgBufferId, required: RgBufferState) -> Option<RgBufferBarrierDesc> {
        let src = if required.is_read_only() {
            if self.current == required {
                return None;
            }
            self.last_write.unwrap_or(self.current)
        } else {
            self.last_write = Some(required);
            self.current
        };
        self.current = required;

        let barrier = RgBufferBarrierDesc::new(resource, src, required);
        barrier.needs_barrier().then_some(barrier)
    }
}

/// 编译阶段跟踪的图像状态
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgTrackedImageState {
    pub current: RgImageState,
    pub last_write: Option<RgImageState>,
}

impl RgTrackedImageState {
    pub fn new(initial: RgImageState) -> Self {
        Self { current: initial, last_write: initial.is_write().then_some(initial) }
    }

    pub fn transition(
        &mut self,
        resource: RgImageId,
        required: RgImageState,
        aspect: vk::ImageAspectFlags,
    ) -> Option<RgImageBarrierDesc> {
        if required.is_read_only() && self.current == required {
            return None;
        }
        let mut src = if required.is_read_only() { self.last_write.unwrap_or(self.current) } else { self.current };
        // layout 只能从当前真实的 layout 转换
        src.layout = self.current.layout;

        if required.is_write() {
            self.last_write = Some(required);
        }
        self.current = required;

        let barrier = RgImageBarrierDesc::new(resource, src, required).with_aspect(aspect);
        barrier.needs_barrier().then_some(barrier)
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn buffer_id() -> RgBufferId {
        let mut map: SlotMap<RgBufferId, ()> = SlotMap::with_key();
        map.insert(())
    }

    #[test]
    fn test_read_to_same_read_skipped() {
        let barrier = RgBufferBarrierDesc::new(
            buffer_id(),
            RgBufferState::STORAGE_READ_COMPUTE,
            RgBufferState::STORAGE_READ_COMPUTE,
        );
        assert!(!barrier.needs_barrier());
    }

    #[test]
    fn test_write_to_same_write_needs_hazard_barrier() {
        let barrier = RgBufferBarrierDesc::new(
            buffer_id(),
            RgBufferState::STORAGE_READ_WRITE_COMPUTE,
            RgBufferState::STORAGE_READ_WRITE_COMPUTE,
        );
        assert!(barrier.needs_barrier());
        let gfx = barrier.to_gfx_barrier(Default::default());
        assert_eq!(gfx.mask.src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    }

    #[test]
    fn test_tracked_read_after_write_uses_write_as_source() {
        let id = buffer_id();
        let mut tracked = RgTrackedBufferState::new(RgBufferState::UNDEFINED);
        assert!(tracked.transition(id, RgBufferState::STORAGE_WRITE_COMPUTE).is_some());

        let first_read = tracked.transition(id, RgBufferState::STORAGE_READ_COMPUTE).unwrap();
        assert_eq!(first_read.src_state, RgBufferState::STORAGE_WRITE_COMPUTE);
        assert!(tracked.transition(id, RgBufferState::STORAGE_READ_COMPUTE).is_none());

        // 换成 indirect 读取时需要再次对写入做可见性操作
        let indirect = tracked.transition(id, RgBufferState::INDIRECT_BUFFER).unwrap();
        assert_eq!(indirect.src_state, RgBufferState::STORAGE_WRITE_COMPUTE);
    }

    #[test]
    fn test_image_layout_change_needs_barrier() {
        let mut images: SlotMap<RgImageId, ()> = SlotMap::with_key();
        let id = images.insert(());
        let mut tracked = RgTrackedImageState::new(RgImageState::SHADER_READ_FRAGMENT);
        let barrier = tracked.transition(id, RgImageState::SHADER_READ_COMPUTE, vk::ImageAspectFlags::COLOR);
        // layout 相同的两种只读采样，stage 不同
        assert!(barrier.is_some());
        let barrier = tracked.transition(id, RgImageState::STORAGE_WRITE_COMPUTE, vk::ImageAspectFlags::COLOR).unwrap();
        assert_eq!(barrier.src_state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.dst_state.layout, vk::ImageLayout::GENERAL);
    }
}
