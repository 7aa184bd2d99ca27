use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use slotmap::SlotMap;

use crate::{
    commands::{
        barrier::{GfxBufferBarrier, GfxImageBarrier},
        command_buffer::{GfxBinding, GfxCommand, GfxCommandBuffer, GfxDispatchCmd, GfxDispatchSize},
    },
    device::GfxDevice,
    handles::{GfxBufferHandle, GfxImageHandle, GfxPipelineHandle},
    resources::{buffer::GfxBufferDesc, image::GfxImageDesc, pipeline::GfxComputePipelineDesc},
    soft::{
        hazard::SoftHazardTracker,
        kernel::{SoftKernel, SoftKernelContext},
        stats::{SoftDrawCall, SoftStats},
    },
};

pub struct SoftBuffer {
    pub(crate) name: String,
    pub(crate) desc: GfxBufferDesc,
    pub(crate) data: Vec<u8>,
}

struct SoftImage {
    name: String,
    layout: vk::ImageLayout,
}

struct SoftPipeline {
    desc: GfxComputePipelineDesc,
    kernel: Arc<dyn SoftKernel>,
}

/// 在 CPU 上执行命令流的设备
///
/// 每次 `submit` 都会完整执行命令缓冲，相当于提交后立即等待队列空闲。
pub struct SoftDevice {
    buffers: SlotMap<GfxBufferHandle, SoftBuffer>,
    images: SlotMap<GfxImageHandle, SoftImage>,
    pipelines: SlotMap<GfxPipelineHandle, SoftPipeline>,

    /// shader 路径 -> kernel 实现
    kernel_library: HashMap<String, Arc<dyn SoftKernel>>,

    hazards: SoftHazardTracker,
    stats: SoftStats,
}
impl Default for SoftDevice {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl SoftDevice {
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            kernel_library: HashMap::new(),
            hazards: SoftHazardTracker::default(),
            stats: SoftStats::default(),
        }
    }

    /// 注册 shader 对应的 kernel 实现，需要在创建 pipeline 之前调用
    pub fn register_kernel(&mut self, shader_path: &str, kernel: Arc<dyn SoftKernel>) {
        if self.kernel_library.insert(shader_path.to_string(), kernel).is_some() {
            log::warn!("soft kernel <{}> registered twice, the old one is replaced", shader_path);
        }
    }
}
// getters
impl SoftDevice {
    #[inline]
    pub fn stats(&self) -> &SoftStats {
        &self.stats
    }

    #[inline]
    pub fn take_stats(&mut self) -> SoftStats {
        std::mem::take(&mut self.stats)
    }

    #[inline]
    pub fn buffer_exists(&self, buffer: GfxBufferHandle) -> bool {
        self.buffers.contains_key(buffer)
    }

    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn buffer_name(&self, buffer: GfxBufferHandle) -> &str {
        &self.buffer(buffer).name
    }

    #[inline]
    pub fn image_layout(&self, image: GfxImageHandle) -> vk::ImageLayout {
        self.images.get(image).unwrap_or_else(|| panic!("unknown image: {image:?}")).layout
    }

    /// 读回 buffer 的全部内容
    #[inline]
    pub fn read_buffer(&self, buffer: GfxBufferHandle) -> &[u8] {
        &self.buffer(buffer).data
    }

    pub fn read_pod<T: Pod>(&self, buffer: GfxBufferHandle, offset: vk::DeviceSize) -> T {
        let data = &self.buffer(buffer).data;
        let offset = offset as usize;
        bytemuck::pod_read_unaligned(&data[offset..offset + size_of::<T>()])
    }

    pub fn read_pod_slice<T: Pod>(&self, buffer: GfxBufferHandle, offset: vk::DeviceSize, count: usize) -> Vec<T> {
        let stride = size_of::<T>();
        (0..count).map(|i| self.read_pod(buffer, offset + (i * stride) as vk::DeviceSize)).collect()
    }

    /// 绕过 host visible 的限制直接修改 buffer，只用于构造测试数据
    pub fn poke_buffer(&mut self, buffer: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) {
        let offset = offset as usize;
        let dst = &mut self.buffer_mut(buffer).data;
        assert!(offset + data.len() <= dst.len(), "poke out of bounds");
        dst[offset..offset + data.len()].copy_from_slice(data);
    }

    fn buffer(&self, buffer: GfxBufferHandle) -> &SoftBuffer {
        self.buffers.get(buffer).unwrap_or_else(|| panic!("unknown buffer: {buffer:?}"))
    }

    fn buffer_mut(&mut self, buffer: GfxBufferHandle) -> &mut SoftBuffer {
        self.buffers.get_mut(buffer).unwrap_or_else(|| panic!("unknown buffer: {buffer:?}"))
    }
}
impl GfxDevice for SoftDevice {
    fn create_buffer(&mut self, desc: &GfxBufferDesc, debug_name: &str) -> GfxBufferHandle {
        assert!(desc.size > 0, "buffer <{debug_name}> created with zero size");
        log::trace!("soft: create buffer <{}> ({} bytes)", debug_name, desc.size);
        self.buffers.insert(SoftBuffer {
            name: debug_name.to_string(),
            desc: desc.clone(),
            data: vec![0; desc.size as usize],
        })
    }

    fn destroy_buffer(&mut self, buffer: GfxBufferHandle) {
        let removed = self.buffers.remove(buffer);
        assert!(removed.is_some(), "destroy unknown buffer: {buffer:?}");
        self.hazards.forget(buffer);
    }

    fn buffer_size(&self, buffer: GfxBufferHandle) -> vk::DeviceSize {
        self.buffer(buffer).desc.size
    }

    fn create_image(&mut self, desc: &GfxImageDesc, debug_name: &str) -> GfxImageHandle {
        log::trace!("soft: create image <{}> {:?}", debug_name, desc.extent);
        self.images.insert(SoftImage { name: debug_name.to_string(), layout: vk::ImageLayout::UNDEFINED })
    }

    fn destroy_image(&mut self, image: GfxImageHandle) {
        let removed = self.images.remove(image);
        assert!(removed.is_some(), "destroy unknown image: {image:?}");
    }

    fn create_compute_pipeline(&mut self, desc: &GfxComputePipelineDesc) -> GfxPipelineHandle {
        let kernel = self
            .kernel_library
            .get(&desc.shader_path)
            .unwrap_or_else(|| panic!("unknown shader kernel: <{}>", desc.shader_path))
            .clone();
        self.pipelines.insert(SoftPipeline { desc: desc.clone(), kernel })
    }

    fn write_buffer(&mut self, buffer: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) {
        let dst = self.buffer_mut(buffer);
        assert!(dst.desc.host_visible, "buffer <{}> is not host visible", dst.name);
        let offset = offset as usize;
        assert!(offset + data.len() <= dst.data.len(), "write out of bounds on buffer <{}>", dst.name);
        dst.data[offset..offset + data.len()].copy_from_slice(data);
    }

    fn submit(&mut self, cmd: GfxCommandBuffer) {
        let _span = tracy_client::span!("SoftDevice::submit");
        let name = cmd.name().to_string();
        let mut label_depth = 0_usize;
        for command in cmd.into_commands() {
            match command {
                GfxCommand::BeginLabel { name, .. } => {
                    log::trace!("soft: {:indent$}begin <{}>", "", name, indent = label_depth * 2);
                    label_depth += 1;
                }
                GfxCommand::EndLabel => {
                    assert!(label_depth > 0, "[{name}] end_label without begin_label");
                    label_depth -= 1;
                }
                GfxCommand::PipelineBarrier { buffer_barriers, image_barriers } => {
                    self.exec_barrier(&buffer_barriers, &image_barriers);
                }
                GfxCommand::CopyBuffer { src, dst, regions } => self.exec_copy(src, dst, &regions),
                GfxCommand::FillBuffer { dst, offset, size, data } => self.exec_fill(dst, offset, size, data),
                GfxCommand::UpdateBuffer { dst, offset, data } => self.exec_update(dst, offset, &data),
                GfxCommand::Dispatch(dispatch) => self.exec_dispatch(&dispatch),
                GfxCommand::DrawIndexedIndirectCount {
                    args_buffer,
                    args_offset,
                    count_buffer,
                    count_offset,
                    max_draw_count,
                    stride,
                } => self.exec_draw_indirect_count(
                    args_buffer,
                    args_offset,
                    count_buffer,
                    count_offset,
                    max_draw_count,
                    stride,
                ),
            }
        }
        assert!(label_depth == 0, "[{name}] unbalanced debug labels");

        self.hazards.flush();
        self.stats.submits += 1;
    }
}
// 命令执行
impl SoftDevice {
    fn exec_barrier(&mut self, buffer_barriers: &[GfxBufferBarrier], image_barriers: &[GfxImageBarrier]) {
        for barrier in buffer_barriers {
            assert!(self.buffers.contains_key(barrier.buffer), "barrier on unknown buffer: {:?}", barrier.buffer);
            self.hazards.apply_barrier(barrier.buffer, barrier.mask.src_access);
        }
        for barrier in image_barriers {
            let image = self
                .images
                .get_mut(barrier.image)
                .unwrap_or_else(|| panic!("barrier on unknown image: {:?}", barrier.image));
            if barrier.old_layout != vk::ImageLayout::UNDEFINED && barrier.old_layout != image.layout {
                panic!(
                    "resource in unexpected state: image <{}> is in {:?}, barrier expects {:?}",
                    image.name, image.layout, barrier.old_layout
                );
            }
            image.layout = barrier.new_layout;
        }
        self.stats.barrier_batches += 1;
    }

    fn exec_copy(&mut self, src: GfxBufferHandle, dst: GfxBufferHandle, regions: &[vk::BufferCopy]) {
        let src_name = self.buffer(src).name.clone();
        let dst_name = self.buffer(dst).name.clone();
        let command = format!("copy {src_name} -> {dst_name}");
        self.hazards.check_access(src, &src_name, &command);
        self.hazards.check_access(dst, &dst_name, &command);

        for region in regions {
            let size = region.size as usize;
            let src_offset = region.src_offset as usize;
            let dst_offset = region.dst_offset as usize;
            assert!(src_offset + size <= self.buffer(src).data.len(), "copy out of bounds on <{src_name}>");
            assert!(dst_offset + size <= self.buffer(dst).data.len(), "copy out of bounds on <{dst_name}>");
            let bytes = self.buffer(src).data[src_offset..src_offset + size].to_vec();
            self.buffer_mut(dst).data[dst_offset..dst_offset + size].copy_from_slice(&bytes);
        }
        self.hazards.record_write(dst, &command);
    }

    fn exec_fill(&mut self, dst: GfxBufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) {
        let buffer_name = self.buffer(dst).name.clone();
        let command = format!("fill {buffer_name}");
        self.hazards.check_access(dst, &buffer_name, &command);

        let buffer = self.buffer_mut(dst);
        let offset = offset as usize;
        let end = if size == vk::WHOLE_SIZE { buffer.data.len() / 4 * 4 } else { offset + size as usize };
        assert!(end <= buffer.data.len(), "fill out of bounds on <{buffer_name}>");
        for word in buffer.data[offset..end].chunks_exact_mut(4) {
            word.copy_from_slice(&data.to_ne_bytes());
        }
        self.hazards.record_write(dst, &command);
    }

    fn exec_update(&mut self, dst: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) {
        let buffer_name = self.buffer(dst).name.clone();
        let command = format!("update {buffer_name}");
        self.hazards.check_access(dst, &buffer_name, &command);

        let buffer = self.buffer_mut(dst);
        let offset = offset as usize;
        assert!(offset + data.len() <= buffer.data.len(), "update out of bounds on <{buffer_name}>");
        buffer.data[offset..offset + data.len()].copy_from_slice(data);
        self.hazards.record_write(dst, &command);
    }

    fn exec_dispatch(&mut self, dispatch: &GfxDispatchCmd) {
        let pipeline = self
            .pipelines
            .get(dispatch.pipeline)
            .unwrap_or_else(|| panic!("unknown pipeline: {:?}", dispatch.pipeline));
        let kernel = pipeline.kernel.clone();
        let pipeline_name = pipeline.desc.shader_path.clone();
        let group_size = pipeline.desc.group_size;
        let command = format!("dispatch {pipeline_name}");

        // 解析 WHOLE_SIZE，检查范围
        let bindings = dispatch
            .bindings
            .iter()
            .map(|binding| {
                let buffer = self.buffer(binding.buffer);
                let buffer_size = buffer.data.len() as vk::DeviceSize;
                let size = if binding.size == vk::WHOLE_SIZE { buffer_size - binding.offset } else { binding.size };
                assert!(
                    binding.offset + size <= buffer_size,
                    "[{pipeline_name}] binding {} out of range on <{}>",
                    binding.slot,
                    buffer.name
                );
                self.hazards.check_access(binding.buffer, &buffer.name, &command);
                GfxBinding { size, ..*binding }
            })
            .collect::<Vec<_>>();

        let group_cnt = match dispatch.size {
            GfxDispatchSize::Direct(cnt) => cnt,
            GfxDispatchSize::Indirect { buffer, offset } => {
                let args_name = self.buffer(buffer).name.clone();
                self.hazards.check_access(buffer, &args_name, &command);
                assert!(
                    offset + 12 <= self.buffer(buffer).data.len() as vk::DeviceSize,
                    "[{pipeline_name}] indirect args out of range on <{args_name}> at offset {offset}"
                );
                self.read_pod::<[u32; 3]>(buffer, offset)
            }
        };

        *self.stats.dispatches.entry(pipeline_name.clone()).or_default() += 1;
        let total_groups = group_cnt.iter().map(|&c| c as u64).product::<u64>();
        if total_groups == 0 {
            self.stats.empty_dispatches += 1;
        } else {
            let mut ctx = SoftKernelContext {
                pipeline_name: &pipeline_name,
                group_size,
                buffers: &mut self.buffers,
                bindings: &bindings,
                push_constants: &dispatch.push_constants,
            };
            for z in 0..group_cnt[2] {
                for y in 0..group_cnt[1] {
                    for x in 0..group_cnt[0] {
                        kernel.run_group(&mut ctx, [x, y, z]);
                    }
                }
            }
            self.stats.executed_groups += total_groups;
        }

        for binding in bindings.iter().filter(|b| b.access.can_write()) {
            self.hazards.record_write(binding.buffer, &command);
        }
    }

    fn exec_draw_indirect_count(
        &mut self,
        args_buffer: GfxBufferHandle,
        args_offset: vk::DeviceSize,
        count_buffer: GfxBufferHandle,
        count_offset: vk::DeviceSize,
        max_draw_count: u32,
        stride: u32,
    ) {
        let command = "draw_indexed_indirect_count";
        self.hazards.check_access(args_buffer, &self.buffer(args_buffer).name, command);
        self.hazards.check_access(count_buffer, &self.buffer(count_buffer).name, command);

        let count = self.read_pod::<u32>(count_buffer, count_offset).min(max_draw_count);
        let commands = (0..count)
            .map(|i| {
                let base = args_offset + i as vk::DeviceSize * stride as vk::DeviceSize;
                let [index_count, instance_count, first_index, vertex_offset, first_instance] =
                    self.read_pod::<[u32; 5]>(args_buffer, base);
                vk::DrawIndexedIndirectCommand {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset: vertex_offset as i32,
                    first_instance,
                }
            })
            .collect();
        self.stats.draw_calls.push(SoftDrawCall { count, commands });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 每个线程把 slot 0 中对应的 u32 加上 push constant
    struct AddKernel;
    impl SoftKernel for AddKernel {
        fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
            let add: u32 = ctx.push_constants();
            let count = (ctx.binding_size(0) / 4) as u32;
            for local in 0..ctx.group_size()[0] {
                let idx = group_id[0] * ctx.group_size()[0] + local;
                if idx < count {
                    let v: u32 = ctx.load(0, idx as u64 * 4);
                    ctx.store(0, idx as u64 * 4, v + add);
                }
            }
        }
    }

    fn setup() -> (SoftDevice, GfxPipelineHandle, GfxBufferHandle) {
        sieve_crate_tools::init_log::init_test_log();

        let mut device = SoftDevice::new();
        device.register_kernel("test/add.slang", Arc::new(AddKernel));
        let pipeline = device.create_compute_pipeline(&GfxComputePipelineDesc::new("test/add.slang", [4, 1, 1], 4));
        let buffer = device.create_buffer(&GfxBufferDesc::new_indirect(40), "data");
        (device, pipeline, buffer)
    }

    fn compute_to_compute() -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .src_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE)
            .dst_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_READ)
    }

    #[test]
    fn test_dispatch_with_barrier() {
        let (mut device, pipeline, buffer) = setup();
        let cmd = GfxCommandBuffer::new("test");
        cmd.bind_pipeline(pipeline);
        cmd.bind_buffers(&[GfxBinding::read_write(0, buffer)]);
        cmd.push_constants(bytemuck::bytes_of(&3_u32));
        cmd.dispatch([3, 1, 1]);
        cmd.buffer_memory_barrier(&[compute_to_compute().buffer(buffer, 0, vk::WHOLE_SIZE)]);
        cmd.dispatch([3, 1, 1]);
        device.submit(cmd);

        assert_eq!(device.read_pod_slice::<u32>(buffer, 0, 10), vec![6; 10]);
        assert_eq!(device.stats().dispatch_count("test/add.slang"), 2);
        assert_eq!(device.stats().executed_groups, 6);
        assert_eq!(device.stats().barrier_batches, 1);
    }

    #[test]
    #[should_panic(expected = "missing barrier")]
    fn test_missing_barrier_panics() {
        let (mut device, pipeline, buffer) = setup();
        let cmd = GfxCommandBuffer::new("test");
        cmd.bind_pipeline(pipeline);
        cmd.bind_buffers(&[GfxBinding::read_write(0, buffer)]);
        cmd.push_constants(bytemuck::bytes_of(&1_u32));
        cmd.dispatch([1, 1, 1]);
        cmd.dispatch([1, 1, 1]);
        device.submit(cmd);
    }

    #[test]
    #[should_panic(expected = "missing barrier")]
    fn test_read_only_barrier_does_not_sync_writes() {
        let (mut device, pipeline, buffer) = setup();
        let cmd = GfxCommandBuffer::new("test");
        cmd.fill_buffer(buffer, 0, vk::WHOLE_SIZE, 0);
        cmd.buffer_memory_barrier(&[GfxBufferBarrier::new()
            .buffer(buffer, 0, vk::WHOLE_SIZE)
            .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
            .dst_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_READ)]);
        cmd.bind_pipeline(pipeline);
        cmd.bind_buffers(&[GfxBinding::read_write(0, buffer)]);
        cmd.push_constants(bytemuck::bytes_of(&1_u32));
        cmd.dispatch([1, 1, 1]);
        device.submit(cmd);
    }

    #[test]
    fn test_indirect_dispatch_reads_args() {
        let (mut device, pipeline, buffer) = setup();
        let args = device.create_buffer(&GfxBufferDesc::new_indirect(24), "args");
        device.poke_buffer(args, 12, bytemuck::cast_slice(&[2_u32, 1, 1]));

        let cmd = GfxCommandBuffer::new("test");
        cmd.bind_pipeline(pipeline);
        cmd.bind_buffers(&[GfxBinding::read_write(0, buffer)]);
        cmd.push_constants(bytemuck::bytes_of(&1_u32));
        // offset 0 处的参数全为 0
        cmd.dispatch_indirect(args, 0);
        cmd.buffer_memory_barrier(&[compute_to_compute().buffer(buffer, 0, vk::WHOLE_SIZE)]);
        cmd.dispatch_indirect(args, 12);
        device.submit(cmd);

        let data = device.read_pod_slice::<u32>(buffer, 0, 10);
        assert_eq!(&data[..8], &[1; 8]);
        assert_eq!(&data[8..], &[0; 2]);
        assert_eq!(device.stats().empty_dispatches, 1);
    }

    #[test]
    fn test_copy_and_fill() {
        let mut device = SoftDevice::new();
        let stage = device.create_buffer(&GfxBufferDesc::new_stage_buffer(16), "stage");
        let dst = device.create_buffer(&GfxBufferDesc::new_ssbo(16), "dst");
        device.write_buffer(stage, 0, bytemuck::cast_slice(&[1_u32, 2, 3, 4]));

        let cmd = GfxCommandBuffer::new("test");
        cmd.copy_buffer(stage, dst, &[vk::BufferCopy { src_offset: 0, dst_offset: 0, size: 16 }]);
        cmd.buffer_memory_barrier(&[GfxBufferBarrier::new()
            .buffer(dst, 0, vk::WHOLE_SIZE)
            .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
            .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)]);
        cmd.fill_buffer(dst, 4, 8, 0);
        device.submit(cmd);

        assert_eq!(device.read_pod_slice::<u32>(dst, 0, 4), vec![1, 0, 0, 4]);
    }

    #[test]
    #[should_panic(expected = "is not host visible")]
    fn test_write_device_local_panics() {
        let mut device = SoftDevice::new();
        let dst = device.create_buffer(&GfxBufferDesc::new_ssbo(16), "dst");
        device.write_buffer(dst, 0, &[0; 4]);
    }

    #[test]
    #[should_panic(expected = "unknown shader kernel")]
    fn test_unknown_kernel_panics() {
        let mut device = SoftDevice::new();
        device.create_compute_pipeline(&GfxComputePipelineDesc::new("missing.slang", [1, 1, 1], 0));
    }

    #[test]
    #[should_panic(expected = "resource in unexpected state")]
    fn test_image_layout_mismatch_panics() {
        let mut device = SoftDevice::new();
        let image = device.create_image(&GfxImageDesc::default(), "image");
        let cmd = GfxCommandBuffer::new("test");
        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(image)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL)]);
        cmd.image_memory_barrier(&[GfxImageBarrier::new()
            .image(image)
            .layout_transfer(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::GENERAL)]);
        device.submit(cmd);
    }

    #[test]
    fn test_draw_indirect_count_clamps() {
        let mut device = SoftDevice::new();
        let args = device.create_buffer(&GfxBufferDesc::new_indirect(64), "args");
        device.poke_buffer(args, 0, bytemuck::bytes_of(&5_u32));
        device.poke_buffer(args, 16, bytemuck::cast_slice(&[36_u32, 1, 0, 0, 7, 7]));
        device.poke_buffer(args, 40, bytemuck::cast_slice(&[12_u32, 1, 3, 0, 9, 9]));

        let cmd = GfxCommandBuffer::new("test");
        cmd.draw_indexed_indirect_count(args, 16, args, 0, 2, 24);
        device.submit(cmd);

        let draw = &device.stats().draw_calls[0];
        assert_eq!(draw.count, 2);
        assert_eq!(draw.commands[1].index_count, 12);
        assert_eq!(draw.commands[1].first_instance, 9);
    }
}
