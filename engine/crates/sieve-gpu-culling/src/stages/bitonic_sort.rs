//! GPU 上的 bitonic 排序
//!
//! sort buffer 的元素数量只有 GPU 知道，所以所有排序都通过 indirect dispatch 完成：
//! 先由参数生成 kernel 根据计数写入每一步的 dispatch 参数，再按照容量录制所有可能的步骤，
//! 多余的步骤 group 数量为 0。
//!
//! 参数 buffer 的布局：第 `i` 次迭代（`k = 2048 << i`）从第 `i * (i + 1) / 2` 条记录开始，
//! 依次是 `j = k/2 .. 2048` 的 outer 排序，最后是一条 inner 排序。
//! 第 0 次迭代只有一条记录，即 pre-sort。

use ash::vk;

use sieve_gfx::commands::barrier::GfxBufferBarrier;
use sieve_gfx::commands::command_buffer::{GfxBinding, GfxCommandBuffer};
use sieve_gfx::handles::GfxBufferHandle;
use sieve_render_graph::{RenderGraphBuilder, RgBufferDesc, RgBufferHandle, RgBufferState, RgPassKind};

use crate::gpu_types::{BitonicArgsParams, BitonicParams, DISPATCH_ARGS_SIZE};
use crate::pipelines::{BITONIC_ARGS_GROUP_SIZE, BITONIC_WINDOW, CullingPipelines};
use crate::visibility_bucket::SortDirection;

#[derive(Clone, Copy)]
struct BitonicArgsPassData {
    sort: RgBufferHandle,
    args: RgBufferHandle,
}

#[derive(Clone, Copy)]
struct BitonicSortPassData {
    args: RgBufferHandle,
    sort: RgBufferHandle,
}

pub struct BitonicSort;

impl BitonicSort {
    /// 参数生成 kernel 需要处理的迭代次数
    pub fn iteration_count(capacity: u32) -> u32 {
        let padded = capacity.max(BITONIC_WINDOW).next_power_of_two();
        let iterations = (padded.trailing_zeros() - 10).max(2);
        assert!(
            iterations <= BITONIC_ARGS_GROUP_SIZE,
            "bitonic sort capacity {} needs {} iterations, at most {} are supported",
            capacity,
            iterations,
            BITONIC_ARGS_GROUP_SIZE
        );
        iterations
    }

    #[inline]
    pub fn args_record_count(capacity: u32) -> u32 {
        let iterations = Self::iteration_count(capacity);
        iterations * (iterations + 1) / 2
    }

    #[inline]
    pub fn args_buffer_size(capacity: u32) -> vk::DeviceSize {
        Self::args_record_count(capacity) as vk::DeviceSize * DISPATCH_ARGS_SIZE
    }

    /// 添加参数生成和排序两个 pass，返回排序后的 sort buffer
    pub fn add_passes(
        graph: &mut RenderGraphBuilder<'_>,
        pipelines: &CullingPipelines,
        bucket_name: &str,
        sort: RgBufferHandle,
        capacity: u32,
        direction: SortDirection,
    ) -> RgBufferHandle {
        let args_pass = pipelines.bitonic_args;
        let max_iterations = Self::iteration_count(capacity);
        let args_data = graph.add_pass(
            format!("{bucket_name}/bitonic-args"),
            RgPassKind::Compute,
            |builder| {
                let args = builder.create_buffer(
                    format!("{bucket_name}/bitonic-args"),
                    RgBufferDesc::new_indirect(Self::args_buffer_size(capacity)),
                );
                BitonicArgsPassData {
                    sort: builder.read_buffer(sort, RgBufferState::STORAGE_READ_COMPUTE),
                    args: builder.write_buffer(args, RgBufferState::STORAGE_WRITE_COMPUTE),
                }
            },
            move |data, ctx| {
                args_pass.exec(
                    ctx.cmd,
                    &[GfxBinding::read(0, ctx.buffer(data.sort)), GfxBinding::write(1, ctx.buffer(data.args))],
                    &BitonicArgsParams { max_iterations, _padding: Default::default() },
                    [1, 1, 1],
                );
            },
        );

        let pipelines = *pipelines;
        let descending = (direction == SortDirection::Descending) as u32;
        let sort_data = graph.add_pass(
            format!("{bucket_name}/bitonic-sort"),
            RgPassKind::Compute,
            |builder| BitonicSortPassData {
                args: builder.read_buffer(args_data.args, RgBufferState::INDIRECT_BUFFER),
                sort: builder.read_write_buffer(args_data.sort, RgBufferState::STORAGE_READ_WRITE_COMPUTE),
            },
            move |data, ctx| {
                record_sort_dispatches(
                    ctx.cmd,
                    &pipelines,
                    ctx.buffer(data.args),
                    ctx.buffer(data.sort),
                    capacity,
                    descending,
                );
            },
        );

        sort_data.sort
    }
}

/// 一次排序需要录制的所有 dispatch：(k, j, 参数偏移)，j 为 0 表示 inner 排序
///
/// k 为 2048 时是 pre-sort
pub fn sort_steps(capacity: u32) -> Vec<(u32, u32, vk::DeviceSize)> {
    let mut steps = vec![(BITONIC_WINDOW, 0, 0)];
    let mut offset = DISPATCH_ARGS_SIZE;
    let max_k = capacity.max(BITONIC_WINDOW).next_power_of_two();

    let mut k = BITONIC_WINDOW * 2;
    while k <= max_k {
        let mut j = k / 2;
        while j >= BITONIC_WINDOW {
            steps.push((k, j, offset));
            offset += DISPATCH_ARGS_SIZE;
            j /= 2;
        }
        steps.push((k, 0, offset));
        offset += DISPATCH_ARGS_SIZE;
        k *= 2;
    }
    steps
}

fn record_sort_dispatches(
    cmd: &GfxCommandBuffer,
    pipelines: &CullingPipelines,
    args_buffer: GfxBufferHandle,
    sort_buffer: GfxBufferHandle,
    capacity: u32,
    descending: u32,
) {
    let bindings = [GfxBinding::read_write(0, sort_buffer)];
    let hazard_barrier = GfxBufferBarrier::new()
        .buffer(sort_buffer, 0, vk::WHOLE_SIZE)
        .src_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE)
        .dst_mask(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        );

    for (step_idx, (k, j, offset)) in sort_steps(capacity).into_iter().enumerate() {
        if step_idx > 0 {
            cmd.buffer_memory_barrier(&[hazard_barrier]);
        }

        let params = BitonicParams { k, j, descending, _padding: 0 };
        let pass = if k == BITONIC_WINDOW {
            &pipelines.bitonic_presort
        } else if j == 0 {
            &pipelines.bitonic_inner
        } else {
            &pipelines.bitonic_outer
        };
        pass.exec_indirect(cmd, &bindings, &params, args_buffer, offset);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use sieve_gfx::device::GfxDevice;
    use sieve_gfx::resources::buffer::GfxBufferDesc;
    use sieve_gfx::soft::device::SoftDevice;
    use sieve_render_graph::RgTransientPool;

    use super::*;
    use crate::gpu_types::{COUNTER_HEADER_SIZE, GpuCounterHeader, GpuSortEntry, SORT_ENTRY_SIZE};
    use crate::soft_kernels::register_soft_kernels;

    #[test]
    fn test_iteration_count() {
        assert_eq!(BitonicSort::iteration_count(1), 2);
        assert_eq!(BitonicSort::iteration_count(2048), 2);
        assert_eq!(BitonicSort::iteration_count(2049), 2);
        assert_eq!(BitonicSort::iteration_count(4096), 2);
        assert_eq!(BitonicSort::iteration_count(8192), 3);
        assert_eq!(BitonicSort::iteration_count(10000), 4);
        assert_eq!(BitonicSort::args_record_count(8192), 6);
    }

    #[test]
    fn test_sort_steps_offsets() {
        let steps = sort_steps(8192);
        let expected = vec![
            (2048, 0, 0),
            (4096, 2048, 12),
            (4096, 0, 24),
            (8192, 4096, 36),
            (8192, 2048, 48),
            (8192, 0, 60),
        ];
        assert_eq!(steps, expected);
        assert_eq!(steps.len() as u32, BitonicSort::args_record_count(8192));

        assert_eq!(sort_steps(100), vec![(2048, 0, 0)]);
    }

    /// 排序 `count` 个随机条目，返回排序结果以及输入
    fn run_sort(
        count: u32,
        capacity: u32,
        direction: SortDirection,
        rng: &mut StdRng,
    ) -> (Vec<GpuSortEntry>, Vec<GpuSortEntry>, Vec<GpuSortEntry>) {
        let mut device = SoftDevice::new();
        register_soft_kernels(&mut device);
        let pipelines = CullingPipelines::new(&mut device);
        let mut pool = RgTransientPool::new(2);

        let size = COUNTER_HEADER_SIZE + SORT_ENTRY_SIZE * capacity as vk::DeviceSize;
        let sort_buffer = device.create_buffer(&GfxBufferDesc::new_indirect(size), "sort");

        // 小范围的 key 保证有重复值
        let input: Vec<GpuSortEntry> =
            (0..count).map(|i| GpuSortEntry { key: rng.gen_range(0..count.max(1) * 2), payload: i }).collect();
        // count 之后的区域填充无效值，排序不能修改它们
        let tail: Vec<GpuSortEntry> =
            (count..capacity).map(|i| GpuSortEntry { key: 7, payload: 0xdead_0000 | i }).collect();
        device.poke_buffer(sort_buffer, 0, bytemuck::bytes_of(&GpuCounterHeader { count, _padding: [0; 3] }));
        device.poke_buffer(sort_buffer, COUNTER_HEADER_SIZE, bytemuck::cast_slice(&input));
        device.poke_buffer(
            sort_buffer,
            COUNTER_HEADER_SIZE + SORT_ENTRY_SIZE * count as vk::DeviceSize,
            bytemuck::cast_slice(&tail),
        );

        let mut graph = RenderGraphBuilder::new();
        let sort = graph.import_buffer("sort", sort_buffer, RgBufferState::UNDEFINED);
        BitonicSort::add_passes(&mut graph, &pipelines, "test", sort, capacity, direction);
        let compiled = graph.compile();

        let cmd = GfxCommandBuffer::new("bitonic");
        compiled.execute(&cmd, &mut pool, &mut device);
        device.submit(cmd);

        let output: Vec<GpuSortEntry> = device.read_pod_slice(sort_buffer, COUNTER_HEADER_SIZE, capacity as usize);
        (output, input, tail)
    }

    #[test]
    fn test_sort_many_counts() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let capacity = 8192;
        for count in [0, 1, 2, 3, 100, 2047, 2048, 2049, 5000, 8192] {
            for direction in [SortDirection::Ascending, SortDirection::Descending] {
                let (output, input, tail) = run_sort(count, capacity, direction, &mut rng);
                let sorted = &output[..count as usize];

                // 有序
                for pair in sorted.windows(2) {
                    match direction {
                        SortDirection::Ascending => assert!(pair[0].key <= pair[1].key, "count {count}: {pair:?}"),
                        SortDirection::Descending => assert!(pair[0].key >= pair[1].key, "count {count}: {pair:?}"),
                    }
                }

                // 元素集合不变
                let mut expected = input.clone();
                expected.sort_by_key(|e| (e.key, e.payload));
                let mut actual = sorted.to_vec();
                actual.sort_by_key(|e| (e.key, e.payload));
                assert_eq!(actual, expected, "count {count} {direction:?}");

                // count 之后的区域没有被修改
                assert_eq!(&output[count as usize..], tail.as_slice(), "count {count} {direction:?}");
            }
        }
    }

    #[test]
    fn test_sentinels_move_to_tail() {
        let mut device = SoftDevice::new();
        register_soft_kernels(&mut device);
        let pipelines = CullingPipelines::new(&mut device);
        let mut pool = RgTransientPool::new(2);

        let capacity = 64;
        let entries = [
            GpuSortEntry::SENTINEL,
            GpuSortEntry { key: 5, payload: 0 },
            GpuSortEntry::SENTINEL,
            GpuSortEntry { key: 1, payload: 1 },
            GpuSortEntry { key: u32::MAX, payload: 2 },
        ];
        let size = COUNTER_HEADER_SIZE + SORT_ENTRY_SIZE * capacity;
        let sort_buffer = device.create_buffer(&GfxBufferDesc::new_indirect(size), "sort");
        device.poke_buffer(sort_buffer, 0, bytemuck::bytes_of(&GpuCounterHeader { count: 5, _padding: [0; 3] }));
        device.poke_buffer(sort_buffer, COUNTER_HEADER_SIZE, bytemuck::cast_slice(&entries));

        let mut graph = RenderGraphBuilder::new();
        let sort = graph.import_buffer("sort", sort_buffer, RgBufferState::UNDEFINED);
        BitonicSort::add_passes(&mut graph, &pipelines, "test", sort, capacity as u32, SortDirection::Descending);
        let cmd = GfxCommandBuffer::new("bitonic");
        graph.compile().execute(&cmd, &mut pool, &mut device);
        device.submit(cmd);

        let output: Vec<GpuSortEntry> = device.read_pod_slice(sort_buffer, COUNTER_HEADER_SIZE, 5);
        assert_eq!(output[..3].iter().map(|e| e.payload).collect::<Vec<_>>(), vec![2, 0, 1]);
        assert!(output[3].is_sentinel());
        assert!(output[4].is_sentinel());
    }

    #[test]
    fn test_one_dispatch_per_step() {
        let mut device = SoftDevice::new();
        register_soft_kernels(&mut device);
        let pipelines = CullingPipelines::new(&mut device);
        let cmd = GfxCommandBuffer::new("count");
        let args = device.create_buffer(&GfxBufferDesc::new_indirect(BitonicSort::args_buffer_size(8192)), "args");
        let sort = device.create_buffer(&GfxBufferDesc::new_indirect(16 + 8 * 8192), "sort");
        record_sort_dispatches(&cmd, &pipelines, args, sort, 8192, 0);
        assert_eq!(cmd.dispatch_count(), 6);
        assert_eq!(cmd.barrier_batch_count(), 5);
    }
}
