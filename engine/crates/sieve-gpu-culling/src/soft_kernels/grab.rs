use sieve_gfx::soft::kernel::{SoftKernel, SoftKernelContext};

use crate::gpu_types::{
    COUNTER_HEADER_SIZE, GpuDispatchArgs, GpuIndirectDrawRecord, GpuPerDrawRecord, GrabParams, INDIRECT_DRAW_STRIDE,
    PER_DRAW_RECORD_SIZE,
};
use crate::pipelines::GRAB_GROUP_SIZE;
use crate::soft_kernels::{load_entry, sort_count};

/// - slot 0: sort buffer
/// - slot 1: dispatch 参数
pub struct GrabArgsKernel;

impl SoftKernel for GrabArgsKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, _group_id: [u32; 3]) {
        let params: GrabParams = ctx.push_constants();
        let count = sort_count(ctx, 0).min(params.max_draw_count);
        ctx.store(1, 0, GpuDispatchArgs { x: count.div_ceil(GRAB_GROUP_SIZE), y: 1, z: 1 });
    }
}

/// - slot 0: 排序后的 sort buffer
/// - slot 1: per-draw records
/// - slot 2: indirect buffer
pub struct GrabGatherKernel;

impl SoftKernel for GrabGatherKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
        let params: GrabParams = ctx.push_constants();
        let count = sort_count(ctx, 0).min(params.max_draw_count);
        let group_size = ctx.group_size()[0];

        for local in 0..group_size {
            let idx = group_id[0] * group_size + local;
            if idx >= count {
                break;
            }

            let entry = load_entry(ctx, 0, idx);
            if entry.is_sentinel() {
                continue;
            }
            let record: GpuPerDrawRecord = ctx.load(1, entry.payload as u64 * PER_DRAW_RECORD_SIZE);
            let draw = GpuIndirectDrawRecord {
                index_count: record.index_count,
                instance_count: 1,
                first_index: record.first_index,
                vertex_offset: record.vertex_offset,
                first_instance: entry.payload,
                draw_index: entry.payload,
            };
            ctx.store(2, COUNTER_HEADER_SIZE + idx as u64 * INDIRECT_DRAW_STRIDE as u64, draw);
            ctx.atomic_add(2, 0, 1);
        }
    }
}
