//! 剔除管线的 compute shader 在 soft 后端上的实现
//!
//! 每个 kernel 以 shader 路径注册，和 GPU 版本使用相同的 binding 和 push constant。

mod bitonic;
mod cull;
mod grab;

use std::sync::Arc;

use sieve_gfx::soft::device::SoftDevice;
use sieve_gfx::soft::kernel::SoftKernelContext;

use crate::gpu_types::{COUNTER_HEADER_SIZE, GpuSortEntry, SORT_ENTRY_SIZE};
use crate::pipelines::shader_path;

/// 注册所有 kernel，需要在 `CullingPipelines::new` 之前调用
pub fn register_soft_kernels(device: &mut SoftDevice) {
    device.register_kernel(shader_path::CULL_CAMERA, Arc::new(cull::CameraCullKernel));
    device.register_kernel(shader_path::CULL_SHADOW, Arc::new(cull::ShadowCullKernel));

    device.register_kernel(shader_path::BITONIC_ARGS, Arc::new(bitonic::BitonicArgsKernel));
    device.register_kernel(shader_path::BITONIC_PRESORT, Arc::new(bitonic::BitonicPresortKernel));
    device.register_kernel(shader_path::BITONIC_OUTER, Arc::new(bitonic::BitonicOuterKernel));
    device.register_kernel(shader_path::BITONIC_INNER, Arc::new(bitonic::BitonicInnerKernel));

    device.register_kernel(shader_path::GRAB_ARGS, Arc::new(grab::GrabArgsKernel));
    device.register_kernel(shader_path::GRAB_GATHER, Arc::new(grab::GrabGatherKernel));
}

// sort buffer 的访问

/// sort buffer 中可以容纳的条目数量
#[inline]
fn sort_capacity(ctx: &SoftKernelContext<'_>, slot: u32) -> u32 {
    ((ctx.binding_size(slot) - COUNTER_HEADER_SIZE) / SORT_ENTRY_SIZE) as u32
}

/// 有效的条目数量，被容量截断
#[inline]
fn sort_count(ctx: &SoftKernelContext<'_>, slot: u32) -> u32 {
    let count: u32 = ctx.load(slot, 0);
    count.min(sort_capacity(ctx, slot))
}

#[inline]
fn load_entry(ctx: &SoftKernelContext<'_>, slot: u32, idx: u32) -> GpuSortEntry {
    ctx.load(slot, COUNTER_HEADER_SIZE + idx as u64 * SORT_ENTRY_SIZE)
}

#[inline]
fn store_entry(ctx: &mut SoftKernelContext<'_>, slot: u32, idx: u32, entry: GpuSortEntry) {
    ctx.store(slot, COUNTER_HEADER_SIZE + idx as u64 * SORT_ENTRY_SIZE, entry);
}

/// 计数加一并写入条目，超出容量的条目被丢弃
fn append_entry(ctx: &mut SoftKernelContext<'_>, slot: u32, entry: GpuSortEntry) {
    let capacity = sort_capacity(ctx, slot);
    let idx = ctx.atomic_add(slot, 0, 1);
    if idx < capacity {
        store_entry(ctx, slot, idx, entry);
    }
}
