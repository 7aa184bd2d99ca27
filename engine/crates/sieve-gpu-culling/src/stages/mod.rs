//! 剔除管线的各个阶段，每个阶段向 RenderGraph 中添加若干 pass

pub mod bitonic_sort;
pub mod cull;
pub mod grab;
pub mod upload;

use sieve_render_graph::RgBufferHandle;

/// 场景数据在 graph 中的句柄
#[derive(Clone, Copy, Debug)]
pub struct SceneBufferHandles {
    pub per_draw: RgBufferHandle,
    pub material: RgBufferHandle,
    pub frame_uniforms: RgBufferHandle,
    pub shadow_views: RgBufferHandle,
}

/// 一个 bucket 的两个 buffer 在 graph 中的句柄
#[derive(Clone, Copy, Debug)]
pub struct BucketBufferHandles {
    pub sort: RgBufferHandle,
    pub indirect: RgBufferHandle,
}
