//! 临时资源的复用
//!
//! - **RgAliasPlan**: 编译阶段的复用计划。生命周期（执行顺序中第一次到最后一次使用）
//!   不重叠且用途相同的临时 buffer 共享同一个物理 buffer，大小取最大者。
//! - **RgTransientPool**: 执行阶段的物理分配。资源在帧结束时回到空闲列表，
//!   空闲超过一定帧数后才会被销毁。

use std::collections::HashMap;

use slotmap::SecondaryMap;

use sieve_gfx::device::GfxDevice;
use sieve_gfx::handles::{GfxBufferHandle, GfxImageHandle};

use crate::buffer_resource::RgBufferDesc;
use crate::image_resource::RgImageDesc;
use crate::resource_handle::RgBufferId;

/// 一个物理 buffer 以及共享它的临时资源
#[derive(Clone, Debug)]
pub struct RgAliasSlot {
    pub desc: RgBufferDesc,
    /// 按执行顺序排列的占用者
    pub occupants: Vec<RgBufferId>,
    /// 最后一个占用者最后一次被使用的位置（执行顺序）
    last_use: usize,
}

/// 临时 buffer 的复用计划
#[derive(Default, Debug)]
pub struct RgAliasPlan {
    pub slots: Vec<RgAliasSlot>,
    pub(crate) buffer_slots: SecondaryMap<RgBufferId, usize>,
    /// 同一个 slot 中的前一个占用者
    pub(crate) predecessors: SecondaryMap<RgBufferId, RgBufferId>,
}

impl RgAliasPlan {
    /// 根据生命周期构建复用计划
    ///
    /// `lifetimes` 中每一项为 `(id, desc, first_use, last_use)`，位置均为执行顺序中的序号。
    pub fn build(lifetimes: &[(RgBufferId, RgBufferDesc, usize, usize)]) -> Self {
        let mut plan = Self::default();

        let mut ordered = lifetimes.iter().collect::<Vec<_>>();
        // 稳定排序，同一位置开始的资源保持声明顺序
        ordered.sort_by_key(|(_, _, first, _)| *first);

        for (id, desc, first, last) in ordered {
            let reusable = plan
                .slots
                .iter()
                .position(|slot| slot.desc.usage == desc.usage && slot.last_use < *first);

            let slot_idx = match reusable {
                Some(idx) => {
                    let slot = &mut plan.slots[idx];
                    if let Some(&prev) = slot.occupants.last() {
                        plan.predecessors.insert(*id, prev);
                    }
                    slot.desc.size = slot.desc.size.max(desc.size);
                    slot.occupants.push(*id);
                    slot.last_use = *last;
                    idx
                }
                None => {
                    plan.slots.push(RgAliasSlot { desc: desc.clone(), occupants: vec![*id], last_use: *last });
                    plan.slots.len() - 1
                }
            };
            plan.buffer_slots.insert(*id, slot_idx);
        }

        plan
    }

    #[inline]
    pub fn slot_of(&self, id: RgBufferId) -> Option<usize> {
        self.buffer_slots.get(id).copied()
    }

    #[inline]
    pub fn predecessor_of(&self, id: RgBufferId) -> Option<RgBufferId> {
        self.predecessors.get(id).copied()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

struct PooledBuffer {
    handle: GfxBufferHandle,
    desc: RgBufferDesc,
    /// 在空闲列表中没有被复用的帧数
    idle_frames: u32,
}

struct PooledImage {
    handle: GfxImageHandle,
    desc: RgImageDesc,
    idle_frames: u32,
}

/// 临时资源的物理分配池
///
/// 在 `CompiledGraph::execute` 中分配，帧结束（命令执行完成）后调用 `end_frame`
/// 归还到空闲列表。
pub struct RgTransientPool {
    active_buffers: Vec<PooledBuffer>,
    free_buffers: HashMap<RgBufferDesc, Vec<PooledBuffer>>,
    active_images: Vec<PooledImage>,
    free_images: HashMap<RgImageDesc, Vec<PooledImage>>,

    /// 空闲超过该帧数的资源会被销毁
    max_idle_frames: u32,
}

impl RgTransientPool {
    pub fn new(max_idle_frames: u32) -> Self {
        Self {
            active_buffers: Vec::new(),
            free_buffers: HashMap::new(),
            active_images: Vec::new(),
            free_images: HashMap::new(),
            max_idle_frames,
        }
    }
}
// 分配
impl RgTransientPool {
    /// 获取一个匹配 desc 的 buffer，没有空闲的就创建新的
    pub fn acquire_buffer(&mut self, device: &mut dyn GfxDevice, desc: &RgBufferDesc, name: &str) -> GfxBufferHandle {
        let pooled = match self.free_buffers.get_mut(desc).and_then(|bucket| bucket.pop()) {
            Some(mut buffer) => {
                buffer.idle_frames = 0;
                buffer
            }
            None => {
                log::debug!("transient pool: create buffer <{}> ({} bytes)", name, desc.size);
                PooledBuffer { handle: device.create_buffer(&desc.to_gfx_desc(), name), desc: desc.clone(), idle_frames: 0 }
            }
        };
        let handle = pooled.handle;
        self.active_buffers.push(pooled);
        handle
    }

    pub fn acquire_image(&mut self, device: &mut dyn GfxDevice, desc: &RgImageDesc, name: &str) -> GfxImageHandle {
        let pooled = match self.free_images.get_mut(desc).and_then(|bucket| bucket.pop()) {
            Some(mut image) => {
                image.idle_frames = 0;
                image
            }
            None => {
                log::debug!("transient pool: create image <{}> ({}x{})", name, desc.width, desc.height);
                PooledImage { handle: device.create_image(&desc.to_gfx_desc(), name), desc: desc.clone(), idle_frames: 0 }
            }
        };
        let handle = pooled.handle;
        self.active_images.push(pooled);
        handle
    }
}
// 帧边界
impl RgTransientPool {
    /// 将本帧使用的资源归还到空闲列表，并销毁空闲太久的资源
    ///
    /// 需要在本帧的命令执行完成之后调用
    pub fn end_frame(&mut self, device: &mut dyn GfxDevice) {
        for bucket in self.free_buffers.values_mut() {
            bucket.iter_mut().for_each(|b| b.idle_frames += 1);
        }
        for bucket in self.free_images.values_mut() {
            bucket.iter_mut().for_each(|i| i.idle_frames += 1);
        }

        for buffer in self.active_buffers.drain(..) {
            self.free_buffers.entry(buffer.desc.clone()).or_default().push(buffer);
        }
        for image in self.active_images.drain(..) {
            self.free_images.entry(image.desc.clone()).or_default().push(image);
        }

        self.trim(device);
    }

    fn trim(&mut self, device: &mut dyn GfxDevice) {
        let max_idle_frames = self.max_idle_frames;
        for bucket in self.free_buffers.values_mut() {
            bucket.retain(|b| {
                let keep = b.idle_frames <= max_idle_frames;
                if !keep {
                    device.destroy_buffer(b.handle);
                }
                keep
            });
        }
        self.free_buffers.retain(|_, bucket| !bucket.is_empty());

        for bucket in self.free_images.values_mut() {
            bucket.retain(|i| {
                let keep = i.idle_frames <= max_idle_frames;
                if !keep {
                    device.destroy_image(i.handle);
                }
                keep
            });
        }
        self.free_images.retain(|_, bucket| !bucket.is_empty());
    }

    /// 销毁所有资源
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        for buffer in self.active_buffers.drain(..).chain(self.free_buffers.drain().flat_map(|(_, b)| b)) {
            device.destroy_buffer(buffer.handle);
        }
        for image in self.active_images.drain(..).chain(self.free_images.drain().flat_map(|(_, i)| i)) {
            device.destroy_image(image.handle);
        }
    }
}
// getters
impl RgTransientPool {
    /// 池中所有 buffer 的数量（使用中 + 空闲）
    pub fn total_buffer_count(&self) -> usize {
        self.active_buffers.len() + self.free_buffers.values().map(Vec::len).sum::<usize>()
    }

    pub fn total_image_count(&self) -> usize {
        self.active_images.len() + self.free_images.values().map(Vec::len).sum::<usize>()
    }
}
