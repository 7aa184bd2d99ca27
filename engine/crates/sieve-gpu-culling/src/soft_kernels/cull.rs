use glam::Vec4Swizzles;

use sieve_gfx::soft::kernel::{SoftKernel, SoftKernelContext};

use crate::frustum::{distance_sort_key, planes_intersect_aabb};
use crate::gpu_types::{
    CullParams, GpuFrameUniforms, GpuPerDrawRecord, GpuShadowView, GpuSortEntry, PER_DRAW_RECORD_SIZE,
    per_draw_flags, shadow_view_kind,
};
use crate::soft_kernels::append_entry;

/// - slot 0: per-draw records
/// - slot 1: frame uniforms
/// - slot 2: opaque sort buffer
/// - slot 3: transparent sort buffer
pub struct CameraCullKernel;

impl SoftKernel for CameraCullKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
        let params: CullParams = ctx.push_constants();
        let uniforms: GpuFrameUniforms = ctx.load(1, 0);
        let camera_position = uniforms.camera_position.xyz();
        let group_size = ctx.group_size()[0];

        for local in 0..group_size {
            let draw_idx = group_id[0] * group_size + local;
            if draw_idx >= params.draw_count {
                break;
            }

            let record: GpuPerDrawRecord = ctx.load(0, draw_idx as u64 * PER_DRAW_RECORD_SIZE);
            if !planes_intersect_aabb(&uniforms.frustum_planes, record.aabb_center, record.aabb_extent) {
                continue;
            }

            let key = distance_sort_key(record.aabb_center.distance(camera_position));
            let slot = if record.flags & per_draw_flags::TRANSPARENT != 0 { 3 } else { 2 };
            append_entry(ctx, slot, GpuSortEntry { key, payload: draw_idx });
        }
    }
}

/// - slot 0: per-draw records
/// - slot 1: shadow views
/// - slot 2: bucket 的 sort buffer
pub struct ShadowCullKernel;

impl SoftKernel for ShadowCullKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
        let params: CullParams = ctx.push_constants();
        let view: GpuShadowView = ctx.load(1, params.view_index as u64 * size_of::<GpuShadowView>() as u64);
        let planes = &view.planes[..view.plane_count as usize];
        let group_size = ctx.group_size()[0];

        for local in 0..group_size {
            let draw_idx = group_id[0] * group_size + local;
            if draw_idx >= params.draw_count {
                break;
            }

            let record: GpuPerDrawRecord = ctx.load(0, draw_idx as u64 * PER_DRAW_RECORD_SIZE);
            if record.flags & per_draw_flags::CASTS_SHADOW == 0 {
                continue;
            }
            if !planes_intersect_aabb(planes, record.aabb_center, record.aabb_extent) {
                continue;
            }

            let distance = match view.kind {
                shadow_view_kind::SPOT => record.aabb_center.distance(view.origin.xyz()),
                // 沿光源方向的深度
                _ => record.aabb_center.dot(view.origin.xyz()),
            };
            append_entry(ctx, 2, GpuSortEntry { key: distance_sort_key(distance), payload: draw_idx });
        }
    }
}
