//! 每个 bucket 的 draw call buffer 以及它们的生命周期
//!
//! opaque / transparent 的 buffer 只创建一次；阴影 buffer 以 `LightId` 为 key 缓存，
//! 每帧通过 `reconcile` 和当前的光源列表对比：
//! - id 依然存在：复用，只更新 debug name 和 slot 索引
//! - 新的 id：创建新的 buffer（内容为 0）
//! - id 消失，或者 cascade 数量变化：释放
//!
//! 释放的 buffer 可能还在被 in-flight 的帧使用，需要等待 fif_count 帧之后才销毁。

use std::collections::{HashMap, HashSet};

use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;

use sieve_gfx::device::GfxDevice;
use sieve_gfx::frame_counter::FrameCounter;
use sieve_gfx::handles::GfxBufferHandle;
use sieve_gfx::resources::buffer::GfxBufferDesc;

use crate::gpu_types::{COUNTER_HEADER_SIZE, INDIRECT_DRAW_STRIDE, SORT_ENTRY_SIZE};
use crate::scene_view::{ShadowLight, ShadowLightKind};
use crate::visibility_bucket::{LightId, VisibilityBucket};

/// 一个 bucket 的两个 buffer
///
/// - sort buffer：`GpuCounterHeader` + `GpuSortEntry[capacity]`，原地排序
/// - indirect buffer：`GpuCounterHeader` + `GpuIndirectDrawRecord[capacity]`
pub struct DrawCallCommandBuffer {
    bucket: VisibilityBucket,
    sort_buffer: GfxBufferHandle,
    indirect_buffer: GfxBufferHandle,
    capacity: u32,

    debug_name: String,
    /// 在 shadow view buffer 中的索引，opaque / transparent 无效
    slot_index: u32,
}

// new & init
impl DrawCallCommandBuffer {
    pub fn new(device: &mut dyn GfxDevice, bucket: VisibilityBucket, capacity: u32, slot_index: u32) -> Self {
        let debug_name = bucket.to_string();
        let sort_buffer = device.create_buffer(
            &GfxBufferDesc::new_indirect(Self::sort_buffer_size(capacity)),
            &format!("{debug_name}-sort"),
        );
        let indirect_buffer = device.create_buffer(
            &GfxBufferDesc::new_indirect(Self::indirect_buffer_size(capacity)),
            &format!("{debug_name}-indirect"),
        );

        Self { bucket, sort_buffer, indirect_buffer, capacity, debug_name, slot_index }
    }

    #[inline]
    pub fn sort_buffer_size(capacity: u32) -> vk::DeviceSize {
        COUNTER_HEADER_SIZE + SORT_ENTRY_SIZE * capacity as vk::DeviceSize
    }

    #[inline]
    pub fn indirect_buffer_size(capacity: u32) -> vk::DeviceSize {
        COUNTER_HEADER_SIZE + INDIRECT_DRAW_STRIDE as vk::DeviceSize * capacity as vk::DeviceSize
    }

    fn refresh(&mut self, bucket: VisibilityBucket, slot_index: u32) {
        self.bucket = bucket;
        self.debug_name = bucket.to_string();
        self.slot_index = slot_index;
    }
}
// destroy
impl DrawCallCommandBuffer {
    pub fn destroy(self, device: &mut dyn GfxDevice) {
        device.destroy_buffer(self.sort_buffer);
        device.destroy_buffer(self.indirect_buffer);
    }
}
// getters
impl DrawCallCommandBuffer {
    #[inline]
    pub fn bucket(&self) -> VisibilityBucket {
        self.bucket
    }
    #[inline]
    pub fn sort_buffer(&self) -> GfxBufferHandle {
        self.sort_buffer
    }
    #[inline]
    pub fn indirect_buffer(&self) -> GfxBufferHandle {
        self.indirect_buffer
    }
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
    #[inline]
    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketStatus {
    /// 复用了上一帧的 buffer
    Active,
    /// 本帧新创建
    Allocated,
    /// 已经释放，等待销毁
    Stale,
}

/// 一次 `reconcile` 的结果
#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    pub reused: Vec<VisibilityBucket>,
    pub allocated: Vec<VisibilityBucket>,
    pub released: Vec<VisibilityBucket>,
}

impl ReconcileReport {
    #[inline]
    pub fn is_unchanged(&self) -> bool {
        self.allocated.is_empty() && self.released.is_empty()
    }
}

struct RetiredBuffer {
    retired_frame_id: u64,
    buffer: DrawCallCommandBuffer,
}

/// 所有 bucket 的 draw call buffer
pub struct DrawCallBufferCache {
    capacity: u32,
    max_spot_shadows: usize,
    max_directional_lights: usize,
    max_cascades: usize,

    opaque: DrawCallCommandBuffer,
    transparent: DrawCallCommandBuffer,
    /// 顺序和光源列表一致
    spot_lights: IndexMap<LightId, DrawCallCommandBuffer>,
    directional_lights: IndexMap<LightId, Vec<DrawCallCommandBuffer>>,

    statuses: HashMap<VisibilityBucket, BucketStatus>,
    retired: Vec<RetiredBuffer>,
}

// new & init
impl DrawCallBufferCache {
    pub fn new(
        device: &mut dyn GfxDevice,
        capacity: u32,
        max_spot_shadows: u32,
        max_directional_lights: u32,
        max_cascades: u32,
    ) -> Self {
        let opaque = DrawCallCommandBuffer::new(device, VisibilityBucket::Opaque, capacity, u32::MAX);
        let transparent = DrawCallCommandBuffer::new(device, VisibilityBucket::Transparent, capacity, u32::MAX);

        let statuses = HashMap::from([
            (VisibilityBucket::Opaque, BucketStatus::Allocated),
            (VisibilityBucket::Transparent, BucketStatus::Allocated),
        ]);

        Self {
            capacity,
            max_spot_shadows: max_spot_shadows as usize,
            max_directional_lights: max_directional_lights as usize,
            max_cascades: max_cascades as usize,
            opaque,
            transparent,
            spot_lights: IndexMap::new(),
            directional_lights: IndexMap::new(),
            statuses,
            retired: Vec::new(),
        }
    }
}
// update
impl DrawCallBufferCache {
    /// 根据本帧的光源列表更新阴影 buffer
    ///
    /// shadow view 的 slot 按光源列表的顺序分配，方向光的每个 cascade 占一个 slot
    ///
    /// # Panics
    /// spot light、方向光或者 cascade 的数量超出容量
    pub fn reconcile(&mut self, device: &mut dyn GfxDevice, lights: &[ShadowLight], frame_id: u64) -> ReconcileReport {
        let _span = tracy_client::span!("DrawCallBufferCache::reconcile");

        let spot_count = lights.iter().filter(|l| matches!(l.kind, ShadowLightKind::Spot { .. })).count();
        let directional_count = lights.len() - spot_count;
        assert!(
            spot_count <= self.max_spot_shadows,
            "spot shadow count {} exceeds capacity {}",
            spot_count,
            self.max_spot_shadows
        );
        assert!(
            directional_count <= self.max_directional_lights,
            "directional light count {} exceeds capacity {}",
            directional_count,
            self.max_directional_lights
        );
        let mut seen_ids = HashSet::new();
        assert!(lights.iter().all(|l| seen_ids.insert(l.id)), "duplicated light id");

        let mut report = ReconcileReport::default();
        let mut prev_spot_lights = std::mem::take(&mut self.spot_lights);
        let mut prev_directional_lights = std::mem::take(&mut self.directional_lights);

        // cascade 数量变化的方向光，在新的 buffer 创建之后再释放
        let mut replaced = Vec::new();

        self.statuses.clear();
        self.statuses.insert(VisibilityBucket::Opaque, BucketStatus::Active);
        self.statuses.insert(VisibilityBucket::Transparent, BucketStatus::Active);

        let mut slot_index = 0_u32;
        for light in lights {
            match &light.kind {
                ShadowLightKind::Spot { .. } => {
                    let bucket = VisibilityBucket::SpotShadow { light: light.id };
                    let buffer = match prev_spot_lights.shift_remove(&light.id) {
                        Some(mut buffer) => {
                            buffer.refresh(bucket, slot_index);
                            self.mark(&mut report, bucket, BucketStatus::Active);
                            buffer
                        }
                        None => {
                            self.mark(&mut report, bucket, BucketStatus::Allocated);
                            DrawCallCommandBuffer::new(device, bucket, self.capacity, slot_index)
                        }
                    };
                    self.spot_lights.insert(light.id, buffer);
                    slot_index += 1;
                }
                ShadowLightKind::Directional { cascades, .. } => {
                    assert!(
                        cascades.len() <= self.max_cascades,
                        "{} has {} cascades, capacity is {}",
                        light.id,
                        cascades.len(),
                        self.max_cascades
                    );

                    let reusable = match prev_directional_lights.shift_remove(&light.id) {
                        Some(buffers) if buffers.len() == cascades.len() => Some(buffers),
                        Some(buffers) => {
                            // cascade 数量变化，整组重建
                            replaced.extend(buffers);
                            None
                        }
                        None => None,
                    };

                    let buffers = match reusable {
                        Some(mut buffers) => {
                            for (cascade, buffer) in buffers.iter_mut().enumerate() {
                                let bucket = VisibilityBucket::Cascade { light: light.id, cascade: cascade as u32 };
                                buffer.refresh(bucket, slot_index + cascade as u32);
                                self.mark(&mut report, bucket, BucketStatus::Active);
                            }
                            buffers
                        }
                        None => (0..cascades.len())
                            .map(|cascade| {
                                let bucket = VisibilityBucket::Cascade { light: light.id, cascade: cascade as u32 };
                                self.mark(&mut report, bucket, BucketStatus::Allocated);
                                DrawCallCommandBuffer::new(device, bucket, self.capacity, slot_index + cascade as u32)
                            })
                            .collect(),
                    };
                    self.directional_lights.insert(light.id, buffers);
                    slot_index += cascades.len() as u32;
                }
            }
        }

        // 本帧不存在的光源，以及被整组重建的 cascade
        let stale = prev_spot_lights
            .into_values()
            .chain(prev_directional_lights.into_values().flatten())
            .chain(replaced)
            .collect_vec();
        self.retire(&mut report, stale, frame_id);

        if !report.is_unchanged() {
            log::debug!(
                "draw call buffers reconciled: reused [{}], allocated [{}], released [{}]",
                report.reused.iter().join(", "),
                report.allocated.iter().join(", "),
                report.released.iter().join(", ")
            );
        }
        report
    }

    fn mark(&mut self, report: &mut ReconcileReport, bucket: VisibilityBucket, status: BucketStatus) {
        match status {
            BucketStatus::Active => report.reused.push(bucket),
            BucketStatus::Allocated => report.allocated.push(bucket),
            BucketStatus::Stale => report.released.push(bucket),
        }
        self.statuses.insert(bucket, status);
    }

    fn retire(&mut self, report: &mut ReconcileReport, buffers: Vec<DrawCallCommandBuffer>, frame_id: u64) {
        for buffer in buffers {
            // 重建的 cascade 在本帧已经标记为 Allocated，不覆盖
            if !self.statuses.contains_key(&buffer.bucket) {
                self.statuses.insert(buffer.bucket, BucketStatus::Stale);
            }
            report.released.push(buffer.bucket);
            self.retired.push(RetiredBuffer { retired_frame_id: frame_id, buffer });
        }
    }

    /// 销毁已经不会再被 GPU 使用的 buffer，返回被销毁的物理 buffer
    pub fn collect_retired(&mut self, device: &mut dyn GfxDevice, frame_counter: &FrameCounter) -> Vec<GfxBufferHandle> {
        let (expired, pending): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|r| frame_counter.is_retired(r.retired_frame_id));
        self.retired = pending;

        let mut destroyed = Vec::with_capacity(expired.len() * 2);
        for RetiredBuffer { buffer, .. } in expired {
            log::debug!("destroy draw call buffer <{}>", buffer.debug_name);
            destroyed.push(buffer.sort_buffer);
            destroyed.push(buffer.indirect_buffer);
            buffer.destroy(device);
        }
        destroyed
    }
}
// destroy
impl DrawCallBufferCache {
    pub fn destroy(self, device: &mut dyn GfxDevice) {
        self.opaque.destroy(device);
        self.transparent.destroy(device);
        for buffer in self.spot_lights.into_values() {
            buffer.destroy(device);
        }
        for buffer in self.directional_lights.into_values().flatten() {
            buffer.destroy(device);
        }
        for retired in self.retired {
            retired.buffer.destroy(device);
        }
    }
}
// getters
impl DrawCallBufferCache {
    #[inline]
    pub fn opaque(&self) -> &DrawCallCommandBuffer {
        &self.opaque
    }

    #[inline]
    pub fn transparent(&self) -> &DrawCallCommandBuffer {
        &self.transparent
    }

    #[inline]
    pub fn spot_light(&self, light: LightId) -> Option<&DrawCallCommandBuffer> {
        self.spot_lights.get(&light)
    }

    #[inline]
    pub fn cascades(&self, light: LightId) -> Option<&[DrawCallCommandBuffer]> {
        self.directional_lights.get(&light).map(Vec::as_slice)
    }

    /// 所有阴影 buffer，按 slot 索引排序
    pub fn shadow_buffers(&self) -> Vec<&DrawCallCommandBuffer> {
        self.spot_lights
            .values()
            .chain(self.directional_lights.values().flatten())
            .sorted_by_key(|b| b.slot_index)
            .collect()
    }

    /// opaque、transparent 以及所有阴影 buffer
    pub fn all_buffers(&self) -> Vec<&DrawCallCommandBuffer> {
        let mut buffers = vec![&self.opaque, &self.transparent];
        buffers.extend(self.shadow_buffers());
        buffers
    }

    #[inline]
    pub fn status(&self, bucket: &VisibilityBucket) -> Option<BucketStatus> {
        self.statuses.get(bucket).copied()
    }

    #[inline]
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};

    use sieve_gfx::soft::device::SoftDevice;

    use super::*;

    fn spot(id: u64) -> ShadowLight {
        ShadowLight::spot(LightId(id), Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 0.6, 20.0)
    }

    fn directional(id: u64, cascades: usize) -> ShadowLight {
        ShadowLight::directional(LightId(id), Vec3::NEG_Y, vec![Mat4::IDENTITY; cascades])
    }

    fn new_cache(device: &mut SoftDevice) -> DrawCallBufferCache {
        DrawCallBufferCache::new(device, 64, 2, 1, 4)
    }

    #[test]
    fn test_reuse_while_id_persists() {
        let mut device = SoftDevice::new();
        let mut cache = new_cache(&mut device);

        let report = cache.reconcile(&mut device, &[spot(1), directional(2, 2)], 0);
        assert_eq!(report.allocated.len(), 3);
        let spot_sort = cache.spot_light(LightId(1)).unwrap().sort_buffer();
        let cascade_sort = cache.cascades(LightId(2)).unwrap()[1].sort_buffer();

        // 光源顺序变化，buffer 复用，slot 重新分配
        let report = cache.reconcile(&mut device, &[directional(2, 2), spot(1)], 1);
        assert!(report.is_unchanged());
        assert_eq!(report.reused.len(), 3);
        assert_eq!(cache.spot_light(LightId(1)).unwrap().sort_buffer(), spot_sort);
        assert_eq!(cache.spot_light(LightId(1)).unwrap().slot_index(), 2);
        assert_eq!(cache.cascades(LightId(2)).unwrap()[1].sort_buffer(), cascade_sort);
        assert_eq!(cache.cascades(LightId(2)).unwrap()[1].slot_index(), 1);
        assert_eq!(
            cache.status(&VisibilityBucket::SpotShadow { light: LightId(1) }),
            Some(BucketStatus::Active)
        );

        let slots = cache.shadow_buffers().iter().map(|b| b.slot_index()).collect_vec();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn test_release_and_deferred_destroy() {
        let mut device = SoftDevice::new();
        let mut cache = new_cache(&mut device);
        cache.reconcile(&mut device, &[spot(1), spot(2)], 0);
        let removed = cache.spot_light(LightId(2)).unwrap().sort_buffer();

        let report = cache.reconcile(&mut device, &[spot(1), spot(3)], 1);
        assert_eq!(report.released, vec![VisibilityBucket::SpotShadow { light: LightId(2) }]);
        assert_eq!(report.allocated, vec![VisibilityBucket::SpotShadow { light: LightId(3) }]);
        assert_eq!(cache.status(&VisibilityBucket::SpotShadow { light: LightId(2) }), Some(BucketStatus::Stale));
        assert_eq!(cache.retired_count(), 1);

        // 新的 buffer 计数为 0
        let new_sort = cache.spot_light(LightId(3)).unwrap().sort_buffer();
        assert_eq!(device.read_pod::<u32>(new_sort, 0), 0);

        // in-flight 的帧结束之前不能销毁
        let mut frame_counter = FrameCounter::new(2);
        assert!(cache.collect_retired(&mut device, &frame_counter).is_empty());
        assert!(device.buffer_exists(removed));

        frame_counter.next_frame();
        frame_counter.next_frame();
        let destroyed = cache.collect_retired(&mut device, &frame_counter);
        assert_eq!(destroyed.len(), 2);
        assert!(!device.buffer_exists(removed));
        assert_eq!(cache.retired_count(), 0);
    }

    #[test]
    fn test_cascade_count_change_recreates() {
        let mut device = SoftDevice::new();
        let mut cache = new_cache(&mut device);
        cache.reconcile(&mut device, &[directional(7, 2)], 0);
        let old = cache.cascades(LightId(7)).unwrap()[0].sort_buffer();

        let report = cache.reconcile(&mut device, &[directional(7, 3)], 1);
        assert_eq!(report.released.len(), 2);
        assert_eq!(report.allocated.len(), 3);
        assert_ne!(cache.cascades(LightId(7)).unwrap()[0].sort_buffer(), old);
        assert_eq!(
            cache.status(&VisibilityBucket::Cascade { light: LightId(7), cascade: 0 }),
            Some(BucketStatus::Allocated)
        );

        // 减少 cascade：新的 cascade 0 是 Allocated，不再存在的 cascade 是 Stale
        let report = cache.reconcile(&mut device, &[directional(7, 1)], 2);
        assert_eq!(report.released.len(), 3);
        assert_eq!(report.allocated, vec![VisibilityBucket::Cascade { light: LightId(7), cascade: 0 }]);
        assert_eq!(
            cache.status(&VisibilityBucket::Cascade { light: LightId(7), cascade: 0 }),
            Some(BucketStatus::Allocated)
        );
        for cascade in 1..3 {
            assert_eq!(
                cache.status(&VisibilityBucket::Cascade { light: LightId(7), cascade }),
                Some(BucketStatus::Stale)
            );
        }
        assert_eq!(cache.retired_count(), 5);
    }

    #[test]
    #[should_panic(expected = "spot shadow count 3 exceeds capacity 2")]
    fn test_spot_capacity_asserted() {
        let mut device = SoftDevice::new();
        let mut cache = new_cache(&mut device);
        cache.reconcile(&mut device, &[spot(1), spot(2), spot(3)], 0);
    }

    #[test]
    #[should_panic(expected = "cascades, capacity is 4")]
    fn test_cascade_capacity_asserted() {
        let mut device = SoftDevice::new();
        let mut cache = new_cache(&mut device);
        cache.reconcile(&mut device, &[directional(1, 5)], 0);
    }
}
