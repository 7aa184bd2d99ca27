//! 压缩：把排序后的索引列表转换为 indirect draw 参数

use sieve_gfx::commands::command_buffer::GfxBinding;
use sieve_render_graph::{RenderGraphBuilder, RgBufferDesc, RgBufferHandle, RgBufferState, RgPassKind};

use crate::gpu_types::{DISPATCH_ARGS_SIZE, GrabParams};
use crate::pipelines::CullingPipelines;

#[derive(Clone, Copy)]
struct GrabArgsPassData {
    sort: RgBufferHandle,
    args: RgBufferHandle,
}

#[derive(Clone, Copy)]
struct GrabPassData {
    args: RgBufferHandle,
    sort: RgBufferHandle,
    per_draw: RgBufferHandle,
    indirect: RgBufferHandle,
}

/// 添加 grab-args 和 grab 两个 pass，返回写入后的 indirect buffer
///
/// grab-args 用一个线程写入 `ceil(count / 64)`；grab 中每个线程处理一个排序后的条目，
/// 在相同的位置写入 draw 参数
pub fn add_grab_passes(
    graph: &mut RenderGraphBuilder<'_>,
    pipelines: &CullingPipelines,
    bucket_name: &str,
    capacity: u32,
    sort: RgBufferHandle,
    per_draw: RgBufferHandle,
    indirect: RgBufferHandle,
) -> RgBufferHandle {
    let args_pass = pipelines.grab_args;
    let gather_pass = pipelines.grab_gather;
    let params = GrabParams { max_draw_count: capacity, _padding: Default::default() };

    let args_data = graph.add_pass(
        format!("{bucket_name}/grab-args"),
        RgPassKind::Compute,
        |builder| {
            let args =
                builder.create_buffer(format!("{bucket_name}/grab-args"), RgBufferDesc::new_indirect(DISPATCH_ARGS_SIZE));
            GrabArgsPassData {
                sort: builder.read_buffer(sort, RgBufferState::STORAGE_READ_COMPUTE),
                args: builder.write_buffer(args, RgBufferState::STORAGE_WRITE_COMPUTE),
            }
        },
        move |data, ctx| {
            args_pass.exec(
                ctx.cmd,
                &[GfxBinding::read(0, ctx.buffer(data.sort)), GfxBinding::write(1, ctx.buffer(data.args))],
                &params,
                [1, 1, 1],
            );
        },
    );

    let grab_data = graph.add_pass(
        format!("{bucket_name}/grab"),
        RgPassKind::Compute,
        |builder| GrabPassData {
            args: builder.read_buffer(args_data.args, RgBufferState::INDIRECT_BUFFER),
            sort: builder.read_buffer(args_data.sort, RgBufferState::STORAGE_READ_COMPUTE),
            per_draw: builder.read_buffer(per_draw, RgBufferState::STORAGE_READ_COMPUTE),
            indirect: builder.read_write_buffer(indirect, RgBufferState::STORAGE_READ_WRITE_COMPUTE),
        },
        move |data, ctx| {
            gather_pass.exec_indirect(
                ctx.cmd,
                &[
                    GfxBinding::read(0, ctx.buffer(data.sort)),
                    GfxBinding::read(1, ctx.buffer(data.per_draw)),
                    GfxBinding::read_write(2, ctx.buffer(data.indirect)),
                ],
                &params,
                ctx.buffer(data.args),
                0,
            );
        },
    );

    grab_data.indirect
}
