//! 视锥剔除
//!
//! 每个视锥一次 dispatch，每个线程处理一条 per-draw record，
//! 通过测试的 record 原子地追加到 bucket 的 sort buffer 中。

use sieve_gfx::commands::command_buffer::GfxBinding;
use sieve_render_graph::{RenderGraphBuilder, RgBufferHandle, RgBufferState, RgPassKind};

use crate::gpu_types::CullParams;
use crate::pipelines::CullingPipelines;
use crate::stages::SceneBufferHandles;

#[derive(Clone, Copy)]
struct CameraCullPassData {
    per_draw: RgBufferHandle,
    frame_uniforms: RgBufferHandle,
    opaque: RgBufferHandle,
    transparent: RgBufferHandle,
}

#[derive(Clone, Copy)]
struct ShadowCullPassData {
    per_draw: RgBufferHandle,
    shadow_views: RgBufferHandle,
    bucket: RgBufferHandle,
}

/// 相机视锥的剔除，一个 pass 同时输出 opaque 和 transparent
///
/// 返回写入后的 (opaque, transparent) sort buffer
pub fn add_camera_cull_pass(
    graph: &mut RenderGraphBuilder<'_>,
    pipelines: &CullingPipelines,
    draw_count: u32,
    scene: SceneBufferHandles,
    opaque_sort: RgBufferHandle,
    transparent_sort: RgBufferHandle,
) -> (RgBufferHandle, RgBufferHandle) {
    let pass = pipelines.cull_camera;
    let data = graph.add_pass(
        "cull-camera",
        RgPassKind::Compute,
        |builder| CameraCullPassData {
            per_draw: builder.read_buffer(scene.per_draw, RgBufferState::STORAGE_READ_COMPUTE),
            frame_uniforms: builder.read_buffer(scene.frame_uniforms, RgBufferState::UNIFORM_COMPUTE),
            opaque: builder.read_write_buffer(opaque_sort, RgBufferState::STORAGE_READ_WRITE_COMPUTE),
            transparent: builder.read_write_buffer(transparent_sort, RgBufferState::STORAGE_READ_WRITE_COMPUTE),
        },
        move |data, ctx| {
            let params = CullParams { draw_count, view_index: 0, _padding: Default::default() };
            pass.exec(
                ctx.cmd,
                &[
                    GfxBinding::read(0, ctx.buffer(data.per_draw)),
                    GfxBinding::read(1, ctx.buffer(data.frame_uniforms)),
                    GfxBinding::read_write(2, ctx.buffer(data.opaque)),
                    GfxBinding::read_write(3, ctx.buffer(data.transparent)),
                ],
                &params,
                [pass.group_count_for(draw_count), 1, 1],
            );
        },
    );

    (data.opaque, data.transparent)
}

/// 一个阴影 bucket 的剔除，只考虑投射阴影的物体
///
/// `view_index` 是 bucket 在 shadow view buffer 中的索引
pub fn add_shadow_cull_pass(
    graph: &mut RenderGraphBuilder<'_>,
    pipelines: &CullingPipelines,
    bucket_name: &str,
    draw_count: u32,
    view_index: u32,
    scene: SceneBufferHandles,
    sort: RgBufferHandle,
) -> RgBufferHandle {
    let pass = pipelines.cull_shadow;
    let data = graph.add_pass(
        format!("{bucket_name}/cull"),
        RgPassKind::Compute,
        |builder| ShadowCullPassData {
            per_draw: builder.read_buffer(scene.per_draw, RgBufferState::STORAGE_READ_COMPUTE),
            shadow_views: builder.read_buffer(scene.shadow_views, RgBufferState::STORAGE_READ_COMPUTE),
            bucket: builder.read_write_buffer(sort, RgBufferState::STORAGE_READ_WRITE_COMPUTE),
        },
        move |data, ctx| {
            let params = CullParams { draw_count, view_index, _padding: Default::default() };
            pass.exec(
                ctx.cmd,
                &[
                    GfxBinding::read(0, ctx.buffer(data.per_draw)),
                    GfxBinding::read(1, ctx.buffer(data.shadow_views)),
                    GfxBinding::read_write(2, ctx.buffer(data.bucket)),
                ],
                &params,
                [pass.group_count_for(draw_count), 1, 1],
            );
        },
    );

    data.bucket
}
