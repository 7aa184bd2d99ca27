use std::cell::{Ref, RefCell};

use ash::vk;
use itertools::Itertools;

use crate::{
    basic::color::LabelColor,
    commands::barrier::{GfxBufferBarrier, GfxImageBarrier},
    handles::{GfxBufferHandle, GfxPipelineHandle},
};

/// shader 对绑定 buffer 的访问方式
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GfxBindingAccess {
    Read,
    Write,
    ReadWrite,
}
impl GfxBindingAccess {
    #[inline]
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }
    #[inline]
    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// 绑定到 compute pipeline 某个 slot 上的一段 buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBinding {
    pub slot: u32,
    pub buffer: GfxBufferHandle,
    pub offset: vk::DeviceSize,
    /// `vk::WHOLE_SIZE` 表示从 offset 到 buffer 末尾
    pub size: vk::DeviceSize,
    pub access: GfxBindingAccess,
}
impl GfxBinding {
    #[inline]
    pub fn read(slot: u32, buffer: GfxBufferHandle) -> Self {
        Self { slot, buffer, offset: 0, size: vk::WHOLE_SIZE, access: GfxBindingAccess::Read }
    }
    #[inline]
    pub fn write(slot: u32, buffer: GfxBufferHandle) -> Self {
        Self { slot, buffer, offset: 0, size: vk::WHOLE_SIZE, access: GfxBindingAccess::Write }
    }
    #[inline]
    pub fn read_write(slot: u32, buffer: GfxBufferHandle) -> Self {
        Self { slot, buffer, offset: 0, size: vk::WHOLE_SIZE, access: GfxBindingAccess::ReadWrite }
    }
    /// builder
    #[inline]
    pub fn range(mut self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.offset = offset;
        self.size = size;
        self
    }
}

/// dispatch 的 group 数量来源
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxDispatchSize {
    Direct([u32; 3]),
    /// 从 buffer 的 offset 处读取 `{x, y, z}` 三个 u32
    Indirect { buffer: GfxBufferHandle, offset: vk::DeviceSize },
}

#[derive(Clone, Debug)]
pub struct GfxDispatchCmd {
    pub pipeline: GfxPipelineHandle,
    pub bindings: Vec<GfxBinding>,
    pub push_constants: Vec<u8>,
    pub size: GfxDispatchSize,
}

/// 录制下来的一条命令
#[derive(Clone, Debug)]
pub enum GfxCommand {
    BeginLabel {
        name: String,
        color: [f32; 4],
    },
    EndLabel,
    PipelineBarrier {
        buffer_barriers: Vec<GfxBufferBarrier>,
        image_barriers: Vec<GfxImageBarrier>,
    },
    CopyBuffer {
        src: GfxBufferHandle,
        dst: GfxBufferHandle,
        regions: Vec<vk::BufferCopy>,
    },
    FillBuffer {
        dst: GfxBufferHandle,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    },
    UpdateBuffer {
        dst: GfxBufferHandle,
        offset: vk::DeviceSize,
        data: Vec<u8>,
    },
    Dispatch(GfxDispatchCmd),
    DrawIndexedIndirectCount {
        args_buffer: GfxBufferHandle,
        args_offset: vk::DeviceSize,
        count_buffer: GfxBufferHandle,
        count_offset: vk::DeviceSize,
        max_draw_count: u32,
        stride: u32,
    },
}

/// 当前绑定的状态，dispatch 时会被快照到命令中
#[derive(Default)]
struct GfxBoundState {
    pipeline: Option<GfxPipelineHandle>,
    bindings: Vec<GfxBinding>,
    push_constants: Vec<u8>,
}

/// 命令缓冲
///
/// 和 Vulkan 的 CommandBuffer 一样通过 `&self` 录制命令，录制完成后交给
/// `GfxDevice::submit` 执行。不是 `Sync` 的。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new("frame");
/// cmd.bind_pipeline(pipeline);
/// cmd.bind_buffers(&[GfxBinding::read(0, src), GfxBinding::write(1, dst)]);
/// cmd.dispatch([4, 1, 1]);
/// device.submit(cmd);
/// ```
pub struct GfxCommandBuffer {
    name: String,
    commands: RefCell<Vec<GfxCommand>>,
    bound: RefCell<GfxBoundState>,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(debug_name: &str) -> Self {
        Self {
            name: debug_name.to_string(),
            commands: RefCell::new(Vec::new()),
            bound: RefCell::new(GfxBoundState::default()),
        }
    }

    /// 开始录制，自动设置 debug label
    #[inline]
    pub fn begin(&self) {
        self.begin_label(&self.name, LabelColor::COLOR_PASS);
    }

    /// 结束录制，结束 debug label
    #[inline]
    pub fn end(&self) {
        self.end_label();
    }

    #[inline]
    fn push(&self, cmd: GfxCommand) {
        self.commands.borrow_mut().push(cmd);
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn commands(&self) -> Ref<'_, Vec<GfxCommand>> {
        self.commands.borrow()
    }

    #[inline]
    pub fn into_commands(self) -> Vec<GfxCommand> {
        self.commands.into_inner()
    }

    /// 已经录制的 dispatch 数量（direct + indirect）
    pub fn dispatch_count(&self) -> usize {
        self.commands.borrow().iter().filter(|cmd| matches!(cmd, GfxCommand::Dispatch(_))).count()
    }

    /// 已经录制的 pipeline barrier 数量
    pub fn barrier_batch_count(&self) -> usize {
        self.commands.borrow().iter().filter(|cmd| matches!(cmd, GfxCommand::PipelineBarrier { .. })).count()
    }
}
// 数据传输类型
impl GfxCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn copy_buffer(&self, src: GfxBufferHandle, dst: GfxBufferHandle, regions: &[vk::BufferCopy]) {
        self.push(GfxCommand::CopyBuffer { src, dst, regions: regions.to_vec() });
    }

    /// 用 4 字节的 data 填充 buffer 的一段区域，offset 和 size 需要 4 字节对齐
    ///
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn fill_buffer(&self, dst: GfxBufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) {
        assert!(offset % 4 == 0, "fill_buffer offset must be 4-byte aligned: {offset}");
        assert!(size == vk::WHOLE_SIZE || size % 4 == 0, "fill_buffer size must be 4-byte aligned: {size}");
        self.push(GfxCommand::FillBuffer { dst, offset, size, data });
    }

    /// 将 data 传输到 buffer 中，大小限制：65536Bytes=64KB
    ///
    /// 需要注意同步
    #[inline]
    pub fn update_buffer(&self, dst: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) {
        assert!(data.len() <= 65536, "update_buffer data too large: {} bytes", data.len());
        self.push(GfxCommand::UpdateBuffer { dst, offset, data: data.to_vec() });
    }
}
// 计算着色器相关命令
impl GfxCommandBuffer {
    /// - command type: state
    #[inline]
    pub fn bind_pipeline(&self, pipeline: GfxPipelineHandle) {
        let mut bound = self.bound.borrow_mut();
        bound.pipeline = Some(pipeline);
        bound.bindings.clear();
        bound.push_constants.clear();
    }

    /// 替换当前的全部 buffer 绑定
    ///
    /// - command type: state
    #[inline]
    pub fn bind_buffers(&self, bindings: &[GfxBinding]) {
        let slots = bindings.iter().map(|b| b.slot).sorted().collect_vec();
        assert!(slots.iter().tuple_windows().all(|(a, b)| a != b), "duplicate binding slot in {slots:?}");
        self.bound.borrow_mut().bindings = bindings.to_vec();
    }

    /// - command type: state
    #[inline]
    pub fn push_constants(&self, data: &[u8]) {
        self.bound.borrow_mut().push_constants = data.to_vec();
    }

    /// - command type: action
    #[inline]
    pub fn dispatch(&self, group_cnt: [u32; 3]) {
        self.record_dispatch(GfxDispatchSize::Direct(group_cnt));
    }

    /// 从 buffer 中读取 `{x, y, z}` 作为 group 数量
    ///
    /// - command type: action
    #[inline]
    pub fn dispatch_indirect(&self, buffer: GfxBufferHandle, offset: vk::DeviceSize) {
        self.record_dispatch(GfxDispatchSize::Indirect { buffer, offset });
    }

    fn record_dispatch(&self, size: GfxDispatchSize) {
        let cmd = {
            let bound = self.bound.borrow();
            let pipeline = bound.pipeline.unwrap_or_else(|| panic!("[{}] dispatch without bound pipeline", self.name));
            GfxDispatchCmd {
                pipeline,
                bindings: bound.bindings.clone(),
                push_constants: bound.push_constants.clone(),
                size,
            }
        };
        self.push(GfxCommand::Dispatch(cmd));
    }
}
// 绘制类型的命令
impl GfxCommandBuffer {
    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw_indexed_indirect_count(
        &self,
        args_buffer: GfxBufferHandle,
        args_offset: vk::DeviceSize,
        count_buffer: GfxBufferHandle,
        count_offset: vk::DeviceSize,
        max_draw_count: u32,
        stride: u32,
    ) {
        self.push(GfxCommand::DrawIndexedIndirectCount {
            args_buffer,
            args_offset,
            count_buffer,
            count_offset,
            max_draw_count,
            stride,
        });
    }
}
// 同步相关命令
impl GfxCommandBuffer {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn buffer_memory_barrier(&self, barriers: &[GfxBufferBarrier]) {
        self.pipeline_barrier(barriers, &[]);
    }

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        self.pipeline_barrier(&[], barriers);
    }

    /// 一次提交多个 barrier，空的 barrier 不会被录制
    #[inline]
    pub fn pipeline_barrier(&self, buffer_barriers: &[GfxBufferBarrier], image_barriers: &[GfxImageBarrier]) {
        if buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        self.push(GfxCommand::PipelineBarrier {
            buffer_barriers: buffer_barriers.to_vec(),
            image_barriers: image_barriers.to_vec(),
        });
    }
}
// debug 相关命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_label(&self, label_name: &str, label_color: [f32; 4]) {
        self.push(GfxCommand::BeginLabel { name: label_name.to_string(), color: label_color });
    }

    #[inline]
    pub fn end_label(&self) {
        self.push(GfxCommand::EndLabel);
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_dispatch_snapshots_bindings() {
        let mut buffers: SlotMap<GfxBufferHandle, ()> = SlotMap::with_key();
        let mut pipelines: SlotMap<GfxPipelineHandle, ()> = SlotMap::with_key();
        let a = buffers.insert(());
        let b = buffers.insert(());
        let pipe = pipelines.insert(());

        let cmd = GfxCommandBuffer::new("test");
        cmd.bind_pipeline(pipe);
        cmd.bind_buffers(&[GfxBinding::read(0, a)]);
        cmd.push_constants(&[1, 0, 0, 0]);
        cmd.dispatch([2, 1, 1]);
        cmd.bind_buffers(&[GfxBinding::write(0, b)]);
        cmd.dispatch_indirect(a, 12);

        assert_eq!(cmd.dispatch_count(), 2);
        let commands = cmd.into_commands();
        match (&commands[0], &commands[1]) {
            (GfxCommand::Dispatch(first), GfxCommand::Dispatch(second)) => {
                assert_eq!(first.bindings[0].buffer, a);
                assert_eq!(first.push_constants, vec![1, 0, 0, 0]);
                assert_eq!(first.size, GfxDispatchSize::Direct([2, 1, 1]));
                assert_eq!(second.bindings[0].buffer, b);
                assert_eq!(second.size, GfxDispatchSize::Indirect { buffer: a, offset: 12 });
            }
            _ => panic!("unexpected commands"),
        }
    }

    #[test]
    fn test_empty_barrier_not_recorded() {
        let cmd = GfxCommandBuffer::new("test");
        cmd.pipeline_barrier(&[], &[]);
        assert_eq!(cmd.barrier_batch_count(), 0);
    }

    #[test]
    #[should_panic(expected = "dispatch without bound pipeline")]
    fn test_dispatch_requires_pipeline() {
        let cmd = GfxCommandBuffer::new("test");
        cmd.dispatch([1, 1, 1]);
    }
}
