use ash::vk;
use bytemuck::Pod;
use slotmap::SlotMap;

use crate::{
    commands::command_buffer::GfxBinding,
    handles::GfxBufferHandle,
    soft::device::SoftBuffer,
};

/// 在 CPU 上模拟一个 compute shader
///
/// `run_group` 每次执行一个完整的 workgroup，group shared memory 和
/// `GroupMemoryBarrier` 通过在函数内分阶段循环所有线程来模拟。
pub trait SoftKernel: Send + Sync {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]);
}

/// kernel 执行时能访问的资源
pub struct SoftKernelContext<'a> {
    pub(crate) pipeline_name: &'a str,
    pub(crate) group_size: [u32; 3],
    pub(crate) buffers: &'a mut SlotMap<GfxBufferHandle, SoftBuffer>,
    pub(crate) bindings: &'a [GfxBinding],
    pub(crate) push_constants: &'a [u8],
}
// getters
impl SoftKernelContext<'_> {
    #[inline]
    pub fn group_size(&self) -> [u32; 3] {
        self.group_size
    }

    /// 读取 push constant
    pub fn push_constants<T: Pod>(&self) -> T {
        let size = size_of::<T>();
        assert!(
            self.push_constants.len() >= size,
            "[{}] push constant too small: {} < {}",
            self.pipeline_name,
            self.push_constants.len(),
            size
        );
        bytemuck::pod_read_unaligned(&self.push_constants[..size])
    }

    /// binding 的可见大小（字节）
    pub fn binding_size(&self, slot: u32) -> vk::DeviceSize {
        self.binding(slot).size
    }
}
// 内存访问
impl SoftKernelContext<'_> {
    fn binding(&self, slot: u32) -> &GfxBinding {
        self.bindings
            .iter()
            .find(|b| b.slot == slot)
            .unwrap_or_else(|| panic!("[{}] slot {} is not bound", self.pipeline_name, slot))
    }

    /// 返回绑定的 buffer 以及在 buffer 中的绝对偏移
    fn locate(&self, slot: u32, byte_offset: vk::DeviceSize, len: usize, write: bool) -> (GfxBufferHandle, usize) {
        let binding = self.binding(slot);
        if write {
            assert!(binding.access.can_write(), "[{}] write to read-only slot {}", self.pipeline_name, slot);
        } else {
            assert!(binding.access.can_read(), "[{}] read from write-only slot {}", self.pipeline_name, slot);
        }
        assert!(
            byte_offset + len as vk::DeviceSize <= binding.size,
            "[{}] out of bounds access on slot {}: offset {} + {} > {}",
            self.pipeline_name,
            slot,
            byte_offset,
            len,
            binding.size
        );
        (binding.buffer, (binding.offset + byte_offset) as usize)
    }

    pub fn load<T: Pod>(&self, slot: u32, byte_offset: vk::DeviceSize) -> T {
        let len = size_of::<T>();
        let (buffer, offset) = self.locate(slot, byte_offset, len, false);
        bytemuck::pod_read_unaligned(&self.buffers[buffer].data[offset..offset + len])
    }

    pub fn store<T: Pod>(&mut self, slot: u32, byte_offset: vk::DeviceSize, value: T) {
        let len = size_of::<T>();
        let (buffer, offset) = self.locate(slot, byte_offset, len, true);
        self.buffers[buffer].data[offset..offset + len].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// 和 `InterlockedAdd` 相同，返回旧值
    pub fn atomic_add(&mut self, slot: u32, byte_offset: vk::DeviceSize, value: u32) -> u32 {
        let old: u32 = self.load(slot, byte_offset);
        self.store(slot, byte_offset, old.wrapping_add(value));
        old
    }
}
