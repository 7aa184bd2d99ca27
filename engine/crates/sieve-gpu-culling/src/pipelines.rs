use sieve_gfx::device::GfxDevice;
use sieve_render_graph::ComputePass;

use crate::gpu_types::{BitonicArgsParams, BitonicParams, CullParams, GrabParams};

/// compute shader 的路径，同时也是 soft 后端中 kernel 的注册名
pub mod shader_path {
    pub const CULL_CAMERA: &str = "gpu_culling/cull_camera.slang";
    pub const CULL_SHADOW: &str = "gpu_culling/cull_shadow.slang";
    pub const BITONIC_ARGS: &str = "gpu_culling/bitonic_args.slang";
    pub const BITONIC_PRESORT: &str = "gpu_culling/bitonic_presort.slang";
    pub const BITONIC_OUTER: &str = "gpu_culling/bitonic_outer.slang";
    pub const BITONIC_INNER: &str = "gpu_culling/bitonic_inner.slang";
    pub const GRAB_ARGS: &str = "gpu_culling/grab_args.slang";
    pub const GRAB_GATHER: &str = "gpu_culling/grab_gather.slang";
}

pub const CULL_GROUP_SIZE: u32 = 64;
/// 参数生成 kernel 的线程数，也是 bitonic 支持的最大迭代次数
pub const BITONIC_ARGS_GROUP_SIZE: u32 = 22;
pub const BITONIC_GROUP_SIZE: u32 = 1024;
/// 一个 group 在 shared memory 中排序的元素数量
pub const BITONIC_WINDOW: u32 = BITONIC_GROUP_SIZE * 2;
pub const GRAB_GROUP_SIZE: u32 = 64;

/// 剔除管线用到的所有 compute pipeline
#[derive(Clone, Copy)]
pub struct CullingPipelines {
    pub cull_camera: ComputePass<CullParams>,
    pub cull_shadow: ComputePass<CullParams>,

    pub bitonic_args: ComputePass<BitonicArgsParams>,
    pub bitonic_presort: ComputePass<BitonicParams>,
    pub bitonic_outer: ComputePass<BitonicParams>,
    pub bitonic_inner: ComputePass<BitonicParams>,

    pub grab_args: ComputePass<GrabParams>,
    pub grab_gather: ComputePass<GrabParams>,
}

impl CullingPipelines {
    pub fn new(device: &mut dyn GfxDevice) -> Self {
        Self {
            cull_camera: ComputePass::new(device, shader_path::CULL_CAMERA, [CULL_GROUP_SIZE, 1, 1]),
            cull_shadow: ComputePass::new(device, shader_path::CULL_SHADOW, [CULL_GROUP_SIZE, 1, 1]),

            bitonic_args: ComputePass::new(device, shader_path::BITONIC_ARGS, [BITONIC_ARGS_GROUP_SIZE, 1, 1]),
            bitonic_presort: ComputePass::new(device, shader_path::BITONIC_PRESORT, [BITONIC_GROUP_SIZE, 1, 1]),
            bitonic_outer: ComputePass::new(device, shader_path::BITONIC_OUTER, [BITONIC_GROUP_SIZE, 1, 1]),
            bitonic_inner: ComputePass::new(device, shader_path::BITONIC_INNER, [BITONIC_GROUP_SIZE, 1, 1]),

            grab_args: ComputePass::new(device, shader_path::GRAB_ARGS, [1, 1, 1]),
            grab_gather: ComputePass::new(device, shader_path::GRAB_GATHER, [GRAB_GROUP_SIZE, 1, 1]),
        }
    }
}
