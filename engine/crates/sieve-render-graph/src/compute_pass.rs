use std::marker::PhantomData;

use ash::vk;

use sieve_gfx::commands::command_buffer::{GfxBinding, GfxCommandBuffer};
use sieve_gfx::device::GfxDevice;
use sieve_gfx::handles::{GfxBufferHandle, GfxPipelineHandle};
use sieve_gfx::resources::pipeline::GfxComputePipelineDesc;

/// 泛型参数 P 表示 compute shader 的参数，以 push constant 的形式传入 shader
pub struct ComputePass<P: bytemuck::Pod> {
    pipeline: GfxPipelineHandle,
    group_size: [u32; 3],

    _phantom: PhantomData<P>,
}

impl<P: bytemuck::Pod> Clone for ComputePass<P> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<P: bytemuck::Pod> Copy for ComputePass<P> {}

impl<P: bytemuck::Pod> ComputePass<P> {
    pub fn new(device: &mut dyn GfxDevice, shader_path: &str, group_size: [u32; 3]) -> Self {
        let desc = GfxComputePipelineDesc::new(shader_path, group_size, size_of::<P>() as u32);
        let pipeline = device.create_compute_pipeline(&desc);

        Self { pipeline, group_size, _phantom: PhantomData }
    }

    #[inline]
    pub fn pipeline(&self) -> GfxPipelineHandle {
        self.pipeline
    }

    #[inline]
    pub fn group_size(&self) -> [u32; 3] {
        self.group_size
    }

    /// 覆盖 `thread_count` 个线程（一维）需要的 group 数量
    #[inline]
    pub fn group_count_for(&self, thread_count: u32) -> u32 {
        thread_count.div_ceil(self.group_size[0])
    }

    fn bind(&self, cmd: &GfxCommandBuffer, bindings: &[GfxBinding], params: &P) {
        cmd.bind_pipeline(self.pipeline);
        cmd.bind_buffers(bindings);
        cmd.push_constants(bytemuck::bytes_of(params));
    }

    pub fn exec(&self, cmd: &GfxCommandBuffer, bindings: &[GfxBinding], params: &P, group_cnt: [u32; 3]) {
        self.bind(cmd, bindings, params);
        cmd.dispatch(group_cnt);
    }

    /// group 数量从 `args_buffer` 的 `offset` 处读取（`[u32; 3]`）
    pub fn exec_indirect(
        &self,
        cmd: &GfxCommandBuffer,
        bindings: &[GfxBinding],
        params: &P,
        args_buffer: GfxBufferHandle,
        offset: vk::DeviceSize,
    ) {
        self.bind(cmd, bindings, params);
        cmd.dispatch_indirect(args_buffer, offset);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sieve_gfx::resources::buffer::GfxBufferDesc;
    use sieve_gfx::soft::device::SoftDevice;
    use sieve_gfx::soft::kernel::{SoftKernel, SoftKernelContext};

    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct AddParams {
        value: u32,
        count: u32,
    }

    /// out[i] = in[i] + value
    struct AddKernel;

    impl SoftKernel for AddKernel {
        fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
            let params: AddParams = ctx.push_constants();
            let group_size = ctx.group_size()[0];
            for local in 0..group_size {
                let i = group_id[0] * group_size + local;
                if i >= params.count {
                    continue;
                }
                let v: u32 = ctx.load(0, i as u64 * 4);
                ctx.store(1, i as u64 * 4, v + params.value);
            }
        }
    }

    #[test]
    fn test_exec_on_soft_device() {
        let mut device = SoftDevice::new();
        device.register_kernel("test/add.slang", Arc::new(AddKernel));
        let pass = ComputePass::<AddParams>::new(&mut device, "test/add.slang", [4, 1, 1]);
        assert_eq!(pass.group_count_for(10), 3);
        assert_eq!(pass.group_count_for(0), 0);

        let input = device.create_buffer(&GfxBufferDesc::new_ssbo(40), "input");
        let output = device.create_buffer(&GfxBufferDesc::new_ssbo(40), "output");
        let values: Vec<u32> = (0..10).collect();
        device.poke_buffer(input, 0, bytemuck::cast_slice(&values));

        let cmd = GfxCommandBuffer::new("test");
        pass.exec(
            &cmd,
            &[GfxBinding::read(0, input), GfxBinding::write(1, output)],
            &AddParams { value: 100, count: 10 },
            [pass.group_count_for(10), 1, 1],
        );
        device.submit(cmd);

        let result: Vec<u32> = device.read_pod_slice(output, 0, 10);
        assert_eq!(result, (100..110).collect::<Vec<u32>>());
        assert_eq!(device.stats().dispatch_count("test/add.slang"), 1);
    }
}
