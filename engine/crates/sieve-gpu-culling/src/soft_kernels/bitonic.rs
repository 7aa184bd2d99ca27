use sieve_gfx::soft::kernel::{SoftKernel, SoftKernelContext};

use crate::gpu_types::{BitonicArgsParams, BitonicParams, DISPATCH_ARGS_SIZE, GpuDispatchArgs, GpuSortEntry};
use crate::pipelines::{BITONIC_GROUP_SIZE, BITONIC_WINDOW};
use crate::soft_kernels::{load_entry, sort_count, store_entry};

/// 在 `t` 的第 `log2(bit)` 位插入一个 0
#[inline]
fn insert_one_bit(t: u32, bit: u32) -> u32 {
    let low = t & (bit - 1);
    ((t - low) << 1) | low
}

/// 和 `i1` 比较的元素；`k == 2j` 时比较对称位置，其余情况比较相距 j 的元素
#[inline]
fn partner(i1: u32, k: u32, j: u32) -> u32 {
    if k == 2 * j { i1 ^ (k - 1) } else { i1 ^ j }
}

/// - slot 0: sort buffer（只读计数）
/// - slot 1: dispatch 参数
///
/// 每个线程负责一次迭代
pub struct BitonicArgsKernel;

impl SoftKernel for BitonicArgsKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, _group_id: [u32; 3]) {
        let params: BitonicArgsParams = ctx.push_constants();
        let count = sort_count(ctx, 0);
        let window = BITONIC_WINDOW as u64;
        let aligned = (count as u64).next_multiple_of(window);
        let padded = aligned.next_power_of_two();

        // presort 和 inner 每个窗口一个 group，outer 需要覆盖补齐到 2 的幂之后的所有元素对
        let window_groups = (aligned / window) as u32;
        let outer_groups = (padded / window) as u32;

        let group_size = ctx.group_size()[0];
        for gi in 0..group_size.min(params.max_iterations) {
            let k = window << gi;
            let active = k <= padded;
            let groups = |n: u32| GpuDispatchArgs { x: if active { n } else { 0 }, y: 1, z: 1 };

            let mut offset = DISPATCH_ARGS_SIZE * (gi * (gi + 1) / 2) as u64;
            let mut j = k / 2;
            while j >= window {
                ctx.store(1, offset, groups(outer_groups));
                offset += DISPATCH_ARGS_SIZE;
                j /= 2;
            }
            ctx.store(1, offset, groups(window_groups));
        }
    }
}

/// 在一个窗口内执行 `k` 从 `k_begin` 到 `k_end`，`j` 一直到 1 的所有步骤
///
/// 窗口外的位置视为空条目，只写回 count 之内的元素
fn sort_window(
    ctx: &mut SoftKernelContext<'_>,
    group_id: u32,
    k_steps: impl Iterator<Item = u32>,
    descending: bool,
    first_j: impl Fn(u32) -> u32,
) {
    let count = sort_count(ctx, 0);
    let base = group_id * BITONIC_WINDOW;

    // group shared memory
    let mut window: Vec<GpuSortEntry> = (0..BITONIC_WINDOW)
        .map(|i| if base + i < count { load_entry(ctx, 0, base + i) } else { GpuSortEntry::SENTINEL })
        .collect();

    for k in k_steps {
        let mut j = first_j(k);
        while j > 0 {
            // 一轮 GroupMemoryBarrier 之间，每个线程处理一对元素
            for t in 0..BITONIC_GROUP_SIZE {
                let i1 = insert_one_bit(t, j) as usize;
                let i2 = partner(i1 as u32, k, j) as usize;
                if window[i2].comes_before(&window[i1], descending) {
                    window.swap(i1, i2);
                }
            }
            j /= 2;
        }
    }

    for (i, entry) in window.into_iter().enumerate() {
        let idx = base + i as u32;
        if idx >= count {
            break;
        }
        store_entry(ctx, 0, idx, entry);
    }
}

/// 每个窗口独立排序（k = 2 .. 2048）
pub struct BitonicPresortKernel;

impl SoftKernel for BitonicPresortKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
        let params: BitonicParams = ctx.push_constants();
        let k_steps = (1..=BITONIC_WINDOW.trailing_zeros()).map(|shift| 1 << shift);
        sort_window(ctx, group_id[0], k_steps, params.descending != 0, |k| k / 2);
    }
}

/// 给定的 k，在窗口内完成 j = 1024 .. 1 的步骤
pub struct BitonicInnerKernel;

impl SoftKernel for BitonicInnerKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
        let params: BitonicParams = ctx.push_constants();
        sort_window(ctx, group_id[0], std::iter::once(params.k), params.descending != 0, |_| BITONIC_WINDOW / 2);
    }
}

/// 跨窗口的一步，j >= 2048，每个线程直接在 buffer 中比较交换一对元素
pub struct BitonicOuterKernel;

impl SoftKernel for BitonicOuterKernel {
    fn run_group(&self, ctx: &mut SoftKernelContext<'_>, group_id: [u32; 3]) {
        let params: BitonicParams = ctx.push_constants();
        let count = sort_count(ctx, 0);
        let descending = params.descending != 0;
        let group_size = ctx.group_size()[0];

        for local in 0..group_size {
            let t = group_id[0] * group_size + local;
            let i1 = insert_one_bit(t, params.j);
            let i2 = partner(i1, params.k, params.j);
            // count 之后都是空条目，不需要交换
            if i2 >= count {
                continue;
            }

            let a = load_entry(ctx, 0, i1);
            let b = load_entry(ctx, 0, i2);
            if b.comes_before(&a, descending) {
                store_entry(ctx, 0, i1, b);
                store_entry(ctx, 0, i2, a);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_one_bit() {
        assert_eq!(insert_one_bit(0b101, 0b10), 0b1001);
        assert_eq!(insert_one_bit(3, 1), 6);
        assert_eq!(insert_one_bit(1023, 2048), 1023);
        assert_eq!(insert_one_bit(2048, 2048), 4096);
    }

    #[test]
    fn test_partner() {
        // 对称比较
        assert_eq!(partner(0, 8, 4), 7);
        assert_eq!(partner(2, 8, 4), 5);
        // half cleaner
        assert_eq!(partner(1, 8, 2), 3);
    }
}
