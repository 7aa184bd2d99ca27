//! GPU 驱动的可见性剔除
//!
//! 每帧向 RenderGraph 中添加：
//! 1. reset：上传场景数据，清零所有 bucket 的计数
//! 2. cull：相机视锥一次 dispatch（输出 opaque / transparent），每个阴影 bucket 一次 dispatch
//! 3. 每个 bucket 的 bitonic 排序
//! 4. 每个 bucket 的压缩，得到 indirect draw 参数
//!
//! 整个过程没有 CPU 回读，下游 pass 使用 `draw_indexed_indirect_count` 消费结果。

use std::collections::HashMap;

use sieve_gfx::device::GfxDevice;
use sieve_gfx::frame_counter::FrameCounter;
use sieve_gfx::handles::GfxBufferHandle;
use sieve_render_graph::{CompiledGraph, RenderGraphBuilder, RgBufferHandle, RgBufferState, RgPassContext};

use crate::draw_call_buffers::{DrawCallBufferCache, ReconcileReport};
use crate::gpu_types::{COUNTER_HEADER_SIZE, INDIRECT_DRAW_STRIDE};
use crate::pipelines::CullingPipelines;
use crate::scene_view::FrameRenderData;
use crate::settings::CullingSettings;
use crate::stages::bitonic_sort::BitonicSort;
use crate::stages::cull::{add_camera_cull_pass, add_shadow_cull_pass};
use crate::stages::grab::add_grab_passes;
use crate::stages::upload::PerDrawUpload;
use crate::stages::{BucketBufferHandles, SceneBufferHandles};
use crate::visibility_bucket::VisibilityBucket;

/// 一个 bucket 在本帧 graph 中的输出
#[derive(Clone, Copy, Debug)]
pub struct BucketDrawHandles {
    pub bucket: VisibilityBucket,
    /// 排序后的索引列表：计数 + `GpuSortEntry[capacity]`
    pub indirect_index_buffer: RgBufferHandle,
    /// 压缩后的 draw 参数：计数 + `GpuIndirectDrawRecord[capacity]`
    pub indirect_sort_buffer: RgBufferHandle,
    pub capacity: u32,
}

impl BucketDrawHandles {
    /// 在下游 pass 中录制这个 bucket 的 indirect draw
    ///
    /// pass 需要以 `RgBufferState::INDIRECT_BUFFER` 读取 `indirect_sort_buffer`
    pub fn record_draw(&self, ctx: &RgPassContext<'_>) {
        let buffer = ctx.buffer(self.indirect_sort_buffer);
        ctx.cmd.draw_indexed_indirect_count(
            buffer,
            COUNTER_HEADER_SIZE,
            buffer,
            0,
            self.capacity,
            INDIRECT_DRAW_STRIDE,
        );
    }
}

/// `GpuCulling::build_frame` 的结果
pub struct CullingOutputs {
    /// reset 之后的场景数据
    pub scene: SceneBufferHandles,
    /// 顺序：opaque、transparent、按 slot 排列的阴影 bucket
    pub buckets: Vec<BucketDrawHandles>,
    pub report: ReconcileReport,

    /// 本帧导入的物理 buffer，帧结束时记录它们的最终状态
    imported: Vec<(GfxBufferHandle, RgBufferHandle)>,
}

impl CullingOutputs {
    #[inline]
    pub fn bucket(&self, bucket: &VisibilityBucket) -> Option<&BucketDrawHandles> {
        self.buckets.iter().find(|b| b.bucket == *bucket)
    }

    #[inline]
    pub fn opaque(&self) -> &BucketDrawHandles {
        &self.buckets[0]
    }

    #[inline]
    pub fn transparent(&self) -> &BucketDrawHandles {
        &self.buckets[1]
    }

    #[inline]
    pub fn shadow_buckets(&self) -> &[BucketDrawHandles] {
        &self.buckets[2..]
    }
}

pub struct GpuCulling {
    settings: CullingSettings,
    pipelines: CullingPipelines,
    upload: PerDrawUpload,
    draw_call_buffers: DrawCallBufferCache,

    /// 导入的 buffer 在上一帧结束时的状态
    resource_states: HashMap<GfxBufferHandle, RgBufferState>,
}

// new & init
impl GpuCulling {
    pub fn new(device: &mut dyn GfxDevice, settings: &CullingSettings) -> Self {
        let pipelines = CullingPipelines::new(device);
        let upload = PerDrawUpload::new(device, settings.max_draws, settings.max_shadow_views());
        let draw_call_buffers = DrawCallBufferCache::new(
            device,
            settings.max_draws,
            settings.max_spot_shadows,
            settings.max_directional_lights,
            settings.max_cascades,
        );

        log::info!(
            "gpu culling created: max_draws {}, max shadow views {}",
            settings.max_draws,
            settings.max_shadow_views()
        );

        Self {
            settings: settings.clone(),
            pipelines,
            upload,
            draw_call_buffers,
            resource_states: HashMap::new(),
        }
    }
}
// destroy
impl GpuCulling {
    pub fn destroy(self, device: &mut dyn GfxDevice) {
        self.upload.destroy(device);
        self.draw_call_buffers.destroy(device);
    }
}
// getters
impl GpuCulling {
    #[inline]
    pub fn settings(&self) -> &CullingSettings {
        &self.settings
    }

    #[inline]
    pub fn draw_call_buffers(&self) -> &DrawCallBufferCache {
        &self.draw_call_buffers
    }

    #[inline]
    pub fn upload(&self) -> &PerDrawUpload {
        &self.upload
    }
}
// update
impl GpuCulling {
    /// 为本帧添加剔除管线的所有 pass
    ///
    /// 没有 drawable 时只添加 reset pass，所有计数为 0
    pub fn build_frame(
        &mut self,
        device: &mut dyn GfxDevice,
        frame: &FrameRenderData<'_>,
        frame_counter: &FrameCounter,
        graph: &mut RenderGraphBuilder<'_>,
    ) -> CullingOutputs {
        let _span = tracy_client::span!("GpuCulling::build_frame");

        let report = self.draw_call_buffers.reconcile(device, frame.shadow_lights, frame_counter.frame_id());

        let mut imported = Vec::new();
        let scene = SceneBufferHandles {
            per_draw: self.import_buffer(graph, &mut imported, "per-draw", self.upload.per_draw_buffer()),
            material: self.import_buffer(graph, &mut imported, "material", self.upload.material_buffer()),
            frame_uniforms: self.import_buffer(
                graph,
                &mut imported,
                "frame-uniforms",
                self.upload.frame_uniforms_buffer(),
            ),
            shadow_views: self.import_buffer(graph, &mut imported, "shadow-views", self.upload.shadow_view_buffer()),
        };

        // (bucket, slot_index, 导入的句柄)
        let bucket_infos = self
            .draw_call_buffers
            .all_buffers()
            .into_iter()
            .map(|buffer| {
                let handles = BucketBufferHandles {
                    sort: self.import_buffer(
                        graph,
                        &mut imported,
                        &format!("{}-sort", buffer.debug_name()),
                        buffer.sort_buffer(),
                    ),
                    indirect: self.import_buffer(
                        graph,
                        &mut imported,
                        &format!("{}-indirect", buffer.debug_name()),
                        buffer.indirect_buffer(),
                    ),
                };
                (buffer.bucket(), buffer.slot_index(), handles)
            })
            .collect::<Vec<_>>();
        let bucket_handles = bucket_infos.iter().map(|(_, _, handles)| *handles).collect::<Vec<_>>();

        let (scene, bucket_handles) = self.upload.add_reset_pass(
            device,
            graph,
            frame,
            frame_counter.frame_label(),
            scene,
            &bucket_handles,
        );

        let capacity = self.draw_call_buffers.capacity();
        let draw_count = frame.drawables.len() as u32;
        let mut outputs = CullingOutputs {
            scene,
            buckets: bucket_infos
                .iter()
                .zip(&bucket_handles)
                .map(|((bucket, _, _), handles)| BucketDrawHandles {
                    bucket: *bucket,
                    indirect_index_buffer: handles.sort,
                    indirect_sort_buffer: handles.indirect,
                    capacity,
                })
                .collect(),
            report,
            imported,
        };
        if draw_count == 0 {
            return outputs;
        }

        // cull
        let (opaque, transparent) = add_camera_cull_pass(
            graph,
            &self.pipelines,
            draw_count,
            scene,
            outputs.buckets[0].indirect_index_buffer,
            outputs.buckets[1].indirect_index_buffer,
        );
        outputs.buckets[0].indirect_index_buffer = opaque;
        outputs.buckets[1].indirect_index_buffer = transparent;
        for (output, (bucket, slot_index, _)) in outputs.buckets.iter_mut().zip(&bucket_infos).skip(2) {
            output.indirect_index_buffer = add_shadow_cull_pass(
                graph,
                &self.pipelines,
                &bucket.to_string(),
                draw_count,
                *slot_index,
                scene,
                output.indirect_index_buffer,
            );
        }

        // sort & grab，按 bucket 依次声明，临时的参数 buffer 可以在 bucket 之间复用
        for output in &mut outputs.buckets {
            let bucket_name = output.bucket.to_string();
            output.indirect_index_buffer = BitonicSort::add_passes(
                graph,
                &self.pipelines,
                &bucket_name,
                output.indirect_index_buffer,
                capacity,
                output.bucket.sort_direction(),
            );
            output.indirect_sort_buffer = add_grab_passes(
                graph,
                &self.pipelines,
                &bucket_name,
                capacity,
                output.indirect_index_buffer,
                scene.per_draw,
                output.indirect_sort_buffer,
            );
        }

        outputs
    }

    /// 以上一帧结束时的状态导入
    fn import_buffer(
        &self,
        graph: &mut RenderGraphBuilder<'_>,
        imported: &mut Vec<(GfxBufferHandle, RgBufferHandle)>,
        name: &str,
        buffer: GfxBufferHandle,
    ) -> RgBufferHandle {
        let state = self.resource_states.get(&buffer).copied().unwrap_or(RgBufferState::UNDEFINED);
        let handle = graph.import_buffer(name, buffer, state);
        imported.push((buffer, handle));
        handle
    }

    /// 帧结束：记录导入 buffer 的最终状态，销毁已经不再使用的 draw call buffer
    pub fn end_frame(
        &mut self,
        device: &mut dyn GfxDevice,
        compiled: &CompiledGraph<'_>,
        outputs: &CullingOutputs,
        frame_counter: &FrameCounter,
    ) {
        for (buffer, handle) in &outputs.imported {
            self.resource_states.insert(*buffer, compiled.final_buffer_state(*handle));
        }

        for buffer in self.draw_call_buffers.collect_retired(device, frame_counter) {
            self.resource_states.remove(&buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use glam::{Mat4, Vec3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use sieve_gfx::commands::command_buffer::GfxCommandBuffer;
    use sieve_gfx::resources::buffer::GfxBufferView;
    use sieve_gfx::soft::device::SoftDevice;
    use sieve_render_graph::{RgPassKind, RgTransientPool};

    use super::*;
    use crate::draw_call_buffers::{BucketStatus, DrawCallCommandBuffer};
    use crate::frustum::Frustum;
    use crate::gpu_types::{GpuIndirectDrawRecord, GpuSortEntry};
    use crate::scene_view::{Aabb, Camera, Drawable, MaterialProperties, ShadowLight};
    use crate::soft_kernels::register_soft_kernels;
    use crate::stages::upload::build_per_draw_record;
    use crate::visibility_bucket::LightId;

    struct Harness {
        device: SoftDevice,
        culling: GpuCulling,
        pool: RgTransientPool,
        frame_counter: FrameCounter,
    }

    impl Harness {
        fn new() -> Self {
            sieve_crate_tools::init_log::init_test_log();
            let settings = CullingSettings { max_draws: 512, ..Default::default() };
            let mut device = SoftDevice::new();
            register_soft_kernels(&mut device);
            let culling = GpuCulling::new(&mut device, &settings);
            Self {
                device,
                culling,
                pool: RgTransientPool::new(settings.transient_idle_frames),
                frame_counter: FrameCounter::new(0),
            }
        }

        /// 执行一帧，每个 bucket 额外添加一个消费 indirect draw 的 pass
        fn run_frame(&mut self, frame: &FrameRenderData<'_>) -> ReconcileReport {
            let mut graph = RenderGraphBuilder::new();
            let outputs = self.culling.build_frame(&mut self.device, frame, &self.frame_counter, &mut graph);
            for bucket in outputs.buckets.clone() {
                graph.add_pass(
                    format!("{}/draw", bucket.bucket),
                    RgPassKind::Graphics,
                    |builder| {
                        builder.read_buffer(bucket.indirect_sort_buffer, RgBufferState::INDIRECT_BUFFER);
                        bucket
                    },
                    |bucket, ctx| bucket.record_draw(ctx),
                );
            }
            let compiled = graph.compile();

            let cmd = GfxCommandBuffer::new(&self.frame_counter.frame_name());
            cmd.begin();
            compiled.execute(&cmd, &mut self.pool, &mut self.device);
            cmd.end();
            self.device.submit(cmd);

            self.culling.end_frame(&mut self.device, &compiled, &outputs, &self.frame_counter);
            self.pool.end_frame(&mut self.device);
            self.frame_counter.next_frame();
            outputs.report
        }

        /// (sort 计数, indirect 计数)
        fn counters(&self, buffer: &DrawCallCommandBuffer) -> (u32, u32) {
            (self.device.read_pod(buffer.sort_buffer(), 0), self.device.read_pod(buffer.indirect_buffer(), 0))
        }

        fn all_counters(&self) -> Vec<(u32, u32)> {
            self.culling.draw_call_buffers().all_buffers().into_iter().map(|b| self.counters(b)).collect()
        }

        fn sorted_entries(&self, buffer: &DrawCallCommandBuffer) -> Vec<GpuSortEntry> {
            let (count, _) = self.counters(buffer);
            self.device.read_pod_slice(buffer.sort_buffer(), COUNTER_HEADER_SIZE, count as usize)
        }

        fn draw_records(&self, buffer: &DrawCallCommandBuffer) -> Vec<GpuIndirectDrawRecord> {
            let (_, count) = self.counters(buffer);
            self.device.read_pod_slice(buffer.indirect_buffer(), COUNTER_HEADER_SIZE, count as usize)
        }
    }

    fn cube(position: Vec3, transparent: bool, first_index: u64) -> Drawable {
        let transform = Mat4::from_translation(position);
        Drawable {
            transform,
            prev_transform: transform,
            local_bounds: Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            index_view: GfxBufferView::new(Default::default(), first_index * 4, 36 * 4, 4),
            vertex_view: GfxBufferView::new(Default::default(), 0, 24 * 32, 32),
            material: MaterialProperties::default(),
            transparent,
            casts_shadow: true,
        }
    }

    fn camera() -> Camera {
        Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, 60_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0)
    }

    fn cascade(center: Vec3, half_size: f32) -> Mat4 {
        let direction = Vec3::new(0.3, -1.0, 0.2).normalize();
        let view = Mat4::look_at_rh(center - direction * 50.0, center, Vec3::Z);
        let projection = Mat4::orthographic_rh(-half_size, half_size, -half_size, half_size, 0.1, 100.0);
        projection * view
    }

    fn lights() -> Vec<ShadowLight> {
        vec![
            ShadowLight::spot(LightId(1), Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 40_f32.to_radians(), 30.0),
            ShadowLight::directional(
                LightId(2),
                Vec3::new(0.3, -1.0, 0.2),
                vec![cascade(Vec3::ZERO, 5.0), cascade(Vec3::ZERO, 20.0)],
            ),
        ]
    }

    fn random_scene(rng: &mut StdRng, count: usize) -> Vec<Drawable> {
        (0..count)
            .map(|i| {
                let position = Vec3::new(
                    rng.gen_range(-30.0..30.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-40.0..15.0),
                );
                let mut drawable = cube(position, rng.gen_bool(0.3), i as u64 * 36);
                drawable.casts_shadow = rng.gen_bool(0.8);
                drawable
            })
            .collect()
    }

    #[test]
    fn test_zero_drawables() {
        let mut harness = Harness::new();
        let mut rng = StdRng::seed_from_u64(1);
        let drawables = random_scene(&mut rng, 100);
        let lights = lights();
        harness.run_frame(&FrameRenderData { drawables: &drawables, camera: camera(), shadow_lights: &lights });
        assert!(harness.all_counters().iter().any(|&(sort, _)| sort > 0));

        harness.device.take_stats();
        harness.run_frame(&FrameRenderData { drawables: &[], camera: camera(), shadow_lights: &lights });
        assert!(harness.all_counters().iter().all(|&c| c == (0, 0)));

        let stats = harness.device.stats();
        assert_eq!(stats.total_dispatches(), 0);
        assert!(stats.draw_calls.iter().all(|d| d.count == 0));
    }

    #[test]
    fn test_drawable_outside_every_frustum() {
        let mut harness = Harness::new();
        let drawables = [cube(Vec3::new(500.0, 500.0, 500.0), false, 0)];
        let lights = lights();
        harness.run_frame(&FrameRenderData { drawables: &drawables, camera: camera(), shadow_lights: &lights });

        assert!(harness.all_counters().iter().all(|&c| c == (0, 0)));
        let stats = harness.device.stats();
        assert_eq!(stats.dispatch_count(crate::pipelines::shader_path::CULL_SHADOW), 3);
    }

    #[test]
    fn test_inside_camera_only() {
        let mut harness = Harness::new();
        let drawables = [cube(Vec3::ZERO, false, 72)];
        // 光源朝向远离物体的方向
        let lights = [ShadowLight::spot(LightId(9), Vec3::new(0.0, 50.0, 0.0), Vec3::Y, 30_f32.to_radians(), 20.0)];
        harness.run_frame(&FrameRenderData { drawables: &drawables, camera: camera(), shadow_lights: &lights });

        let cache = harness.culling.draw_call_buffers();
        assert_eq!(harness.counters(cache.opaque()), (1, 1));
        assert_eq!(harness.counters(cache.transparent()), (0, 0));
        assert_eq!(harness.counters(cache.spot_light(LightId(9)).unwrap()), (0, 0));

        let records = harness.draw_records(cache.opaque());
        assert_eq!(
            records[0],
            GpuIndirectDrawRecord {
                index_count: 36,
                instance_count: 1,
                first_index: 72,
                vertex_offset: 0,
                first_instance: 0,
                draw_index: 0,
            }
        );

        // 下游的 draw 读取到相同的参数
        let draw_calls = &harness.device.stats().draw_calls;
        let opaque_draw = &draw_calls[0];
        assert_eq!(opaque_draw.count, 1);
        assert_eq!(opaque_draw.commands[0].first_index, 72);
    }

    #[test]
    fn test_grab_matches_cull() {
        let mut harness = Harness::new();
        let mut rng = StdRng::seed_from_u64(42);
        let drawables = random_scene(&mut rng, 400);
        let lights = lights();
        let camera = camera();
        harness.run_frame(&FrameRenderData { drawables: &drawables, camera, shadow_lights: &lights });

        let records: Vec<_> =
            drawables.iter().enumerate().map(|(i, d)| build_per_draw_record(i as u32, d)).collect();
        let visible = |frustum: &Frustum, filter: &dyn Fn(usize) -> bool| -> HashSet<u32> {
            records
                .iter()
                .enumerate()
                .filter(|(i, r)| filter(*i) && frustum.intersects_aabb(r.aabb_center, r.aabb_extent))
                .map(|(i, _)| i as u32)
                .collect()
        };

        let camera_frustum = Frustum::from_view_projection(camera.view_projection());
        let spot_frustum = match &lights[0].kind {
            crate::scene_view::ShadowLightKind::Spot { view_projection, .. } => {
                Frustum::for_spot_light(*view_projection)
            }
            _ => unreachable!(),
        };
        let cache = harness.culling.draw_call_buffers();
        let expectations = [
            (cache.opaque(), visible(&camera_frustum, &|i: usize| !drawables[i].transparent)),
            (cache.transparent(), visible(&camera_frustum, &|i: usize| drawables[i].transparent)),
            (cache.spot_light(LightId(1)).unwrap(), visible(&spot_frustum, &|i: usize| drawables[i].casts_shadow)),
            (
                &cache.cascades(LightId(2)).unwrap()[0],
                visible(&Frustum::for_cascade(cascade(Vec3::ZERO, 5.0)), &|i: usize| drawables[i].casts_shadow),
            ),
            (
                &cache.cascades(LightId(2)).unwrap()[1],
                visible(&Frustum::for_cascade(cascade(Vec3::ZERO, 20.0)), &|i: usize| drawables[i].casts_shadow),
            ),
        ];

        for (buffer, expected) in expectations {
            let (sort_count, draw_count) = harness.counters(buffer);
            assert_eq!(sort_count, draw_count, "{}", buffer.debug_name());
            assert_eq!(sort_count as usize, expected.len(), "{}", buffer.debug_name());
            assert!(!expected.is_empty(), "{} should see part of the scene", buffer.debug_name());

            let entries = harness.sorted_entries(buffer);
            let draws = harness.draw_records(buffer);
            for (entry, draw) in entries.iter().zip(&draws) {
                assert!(expected.contains(&entry.payload));
                assert_eq!(draw.draw_index, entry.payload);
                assert_eq!(draw.first_instance, entry.payload);
                assert_eq!(draw.index_count, records[entry.payload as usize].index_count);
                assert_eq!(draw.first_index, records[entry.payload as usize].first_index);
            }

            let descending = buffer.bucket().sort_direction() == crate::visibility_bucket::SortDirection::Descending;
            for pair in entries.windows(2) {
                assert!(!pair[1].comes_before(&pair[0], descending), "{}: {pair:?}", buffer.debug_name());
            }
        }
    }

    #[test]
    fn test_repeated_frame_is_idempotent() {
        let mut harness = Harness::new();
        let mut rng = StdRng::seed_from_u64(3);
        let drawables = random_scene(&mut rng, 200);
        let lights = lights();
        let frame = FrameRenderData { drawables: &drawables, camera: camera(), shadow_lights: &lights };

        let snapshot = |harness: &Harness| -> Vec<Vec<u8>> {
            let culling = &harness.culling;
            let mut buffers = vec![
                culling.upload().per_draw_buffer(),
                culling.upload().material_buffer(),
                culling.upload().frame_uniforms_buffer(),
                culling.upload().shadow_view_buffer(),
            ];
            for bucket in culling.draw_call_buffers().all_buffers() {
                buffers.push(bucket.sort_buffer());
                buffers.push(bucket.indirect_buffer());
            }
            buffers.into_iter().map(|b| harness.device.read_buffer(b).to_vec()).collect()
        };

        harness.run_frame(&frame);
        let first = snapshot(&harness);
        let report = harness.run_frame(&frame);
        assert!(report.is_unchanged());
        assert_eq!(snapshot(&harness), first);
    }

    #[test]
    fn test_light_lifecycle() {
        let mut harness = Harness::new();
        let drawables = [cube(Vec3::ZERO, false, 0), cube(Vec3::new(2.0, 0.0, 0.0), true, 36)];
        let all_lights = lights();

        let report = harness.run_frame(&FrameRenderData {
            drawables: &drawables,
            camera: camera(),
            shadow_lights: &all_lights,
        });
        assert_eq!(report.allocated.len(), 3);
        let cache = harness.culling.draw_call_buffers();
        let spot_sort = cache.spot_light(LightId(1)).unwrap().sort_buffer();
        let cascade_sort = cache.cascades(LightId(2)).unwrap()[0].sort_buffer();
        assert!(harness.counters(cache.spot_light(LightId(1)).unwrap()).0 > 0);

        // 方向光消失：spot light 复用，cascade 释放但延迟销毁
        let report = harness.run_frame(&FrameRenderData {
            drawables: &drawables,
            camera: camera(),
            shadow_lights: &all_lights[..1],
        });
        assert_eq!(report.reused, vec![VisibilityBucket::SpotShadow { light: LightId(1) }]);
        assert_eq!(report.released.len(), 2);
        let cache = harness.culling.draw_call_buffers();
        assert_eq!(cache.spot_light(LightId(1)).unwrap().sort_buffer(), spot_sort);
        assert_eq!(
            cache.status(&VisibilityBucket::Cascade { light: LightId(2), cascade: 0 }),
            Some(BucketStatus::Stale)
        );
        assert!(harness.device.buffer_exists(cascade_sort));

        for _ in 0..FrameCounter::fif_count() {
            harness.run_frame(&FrameRenderData {
                drawables: &drawables,
                camera: camera(),
                shadow_lights: &all_lights[..1],
            });
        }
        assert!(!harness.device.buffer_exists(cascade_sort));
        assert_eq!(harness.culling.draw_call_buffers().retired_count(), 0);

        // 相同的 id 重新出现：新的 buffer
        let report = harness.run_frame(&FrameRenderData {
            drawables: &[],
            camera: camera(),
            shadow_lights: &all_lights,
        });
        assert_eq!(report.allocated.len(), 2);
        let cache = harness.culling.draw_call_buffers();
        for buffer in cache.cascades(LightId(2)).unwrap() {
            assert_eq!(harness.counters(buffer), (0, 0));
            assert_eq!(cache.status(&buffer.bucket()), Some(BucketStatus::Allocated));
        }
    }

    #[test]
    #[should_panic(expected = "drawable count 513 exceeds max_draws 512")]
    fn test_too_many_drawables() {
        let mut harness = Harness::new();
        let drawables: Vec<_> = (0..513).map(|i| cube(Vec3::ZERO, false, i * 36)).collect();
        harness.run_frame(&FrameRenderData { drawables: &drawables, camera: camera(), shadow_lights: &[] });
    }

    #[test]
    fn test_transient_args_are_aliased() {
        let mut harness = Harness::new();
        let drawables = [cube(Vec3::ZERO, false, 0)];
        let lights = lights();
        let frame = FrameRenderData { drawables: &drawables, camera: camera(), shadow_lights: &lights };

        let mut graph = RenderGraphBuilder::new();
        let outputs = harness.culling.build_frame(&mut harness.device, &frame, &harness.frame_counter, &mut graph);
        let compiled = graph.compile();
        // 5 个 bucket，每个 bucket 两个参数 buffer，生命周期互不重叠
        assert_eq!(outputs.buckets.len(), 5);
        assert_eq!(compiled.alias_plan().slot_count(), 1);

        let names = compiled.ordered_pass_names();
        assert_eq!(names[0], "reset");
        assert_eq!(names[1], "cull-camera");
    }
}
