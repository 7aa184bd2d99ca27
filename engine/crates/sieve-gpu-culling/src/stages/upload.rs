//! Per-Draw 上传
//!
//! 把每帧的场景快照转换为 GPU 格式写入 stage buffer（每个 in-flight 帧一组），
//! 然后由 reset pass 拷贝到 device local buffer，同时把所有 bucket 的计数清零。

use ash::vk;

use sieve_gfx::device::GfxDevice;
use sieve_gfx::frame_counter::{FrameCounter, FrameLabel};
use sieve_gfx::handles::GfxBufferHandle;
use sieve_gfx::resources::buffer::GfxBufferDesc;
use sieve_render_graph::{RenderGraphBuilder, RgBufferState, RgPassKind};

use crate::frustum::Frustum;
use crate::gpu_types::{
    COUNTER_HEADER_SIZE, GpuFrameUniforms, GpuMaterialProperties, GpuPerDrawRecord, GpuShadowView,
    PER_DRAW_RECORD_SIZE, per_draw_flags, shadow_view_kind,
};
use crate::scene_view::{Camera, Drawable, FrameRenderData, MaterialProperties, ShadowLight, ShadowLightKind};
use crate::stages::{BucketBufferHandles, SceneBufferHandles};

/// 一个 drawable 对应的 per-draw record
pub fn build_per_draw_record(draw_index: u32, drawable: &Drawable) -> GpuPerDrawRecord {
    let (aabb_center, aabb_extent) = drawable.local_bounds.transformed(&drawable.transform);

    let mut flags = 0;
    if drawable.transparent {
        flags |= per_draw_flags::TRANSPARENT;
    }
    if drawable.casts_shadow {
        flags |= per_draw_flags::CASTS_SHADOW;
    }

    let first_vertex = drawable.vertex_view.first_element();
    let vertex_offset = i32::try_from(first_vertex)
        .unwrap_or_else(|_| panic!("vertex offset {} of drawable {} exceeds i32", first_vertex, draw_index));

    GpuPerDrawRecord {
        transform: drawable.transform,
        prev_transform: drawable.prev_transform,
        aabb_center,
        index_count: drawable.index_view.element_count(),
        aabb_extent,
        first_index: drawable.index_view.first_element(),
        vertex_offset,
        // 每个 drawable 一条材质记录，索引相同
        material_index: draw_index,
        flags,
        draw_index,
        _padding: Default::default(),
    }
}

pub fn build_material_record(material: &MaterialProperties) -> GpuMaterialProperties {
    GpuMaterialProperties {
        base_color: material.base_color,
        emissive: material.emissive.extend(0.0),
        metallic: material.metallic,
        roughness: material.roughness,
        alpha_cutoff: material.alpha_cutoff,
        opacity: material.opacity,
        texture_indices: [
            material.base_color_texture,
            material.normal_texture,
            material.metallic_roughness_texture,
            material.emissive_texture,
        ],
        flags: material.double_sided as u32,
        _padding: Default::default(),
    }
}

pub fn build_frame_uniforms(camera: &Camera, draw_count: u32, shadow_view_count: u32) -> GpuFrameUniforms {
    let view_projection = camera.view_projection();
    GpuFrameUniforms {
        view: camera.view,
        projection: camera.projection,
        view_projection,
        camera_position: camera.position.extend(1.0),
        frustum_planes: Frustum::from_view_projection(view_projection).padded_planes(),
        draw_count,
        shadow_view_count,
        _padding: Default::default(),
    }
}

/// 按光源顺序展开的 shadow view，方向光的每个 cascade 一个
pub fn build_shadow_views(lights: &[ShadowLight]) -> Vec<GpuShadowView> {
    let mut views = Vec::new();
    for light in lights {
        match &light.kind {
            ShadowLightKind::Spot { position, view_projection } => {
                let frustum = Frustum::for_spot_light(*view_projection);
                views.push(GpuShadowView {
                    view_projection: *view_projection,
                    origin: position.extend(1.0),
                    planes: frustum.padded_planes(),
                    plane_count: frustum.plane_count(),
                    kind: shadow_view_kind::SPOT,
                    _padding: Default::default(),
                });
            }
            ShadowLightKind::Directional { direction, cascades } => {
                for cascade in cascades {
                    let frustum = Frustum::for_cascade(*cascade);
                    views.push(GpuShadowView {
                        view_projection: *cascade,
                        origin: direction.extend(0.0),
                        planes: frustum.padded_planes(),
                        plane_count: frustum.plane_count(),
                        kind: shadow_view_kind::CASCADE,
                        _padding: Default::default(),
                    });
                }
            }
        }
    }
    views
}

/// 一个 in-flight 帧使用的 stage buffer
struct UploadStageBuffers {
    per_draw: GfxBufferHandle,
    material: GfxBufferHandle,
    frame_uniforms: GfxBufferHandle,
    shadow_views: GfxBufferHandle,
}

impl UploadStageBuffers {
    fn new(device: &mut dyn GfxDevice, frame_label: FrameLabel, max_draws: u32, max_shadow_views: u32) -> Self {
        let max_draws = max_draws as vk::DeviceSize;
        let max_shadow_views = max_shadow_views.max(1) as vk::DeviceSize;
        Self {
            per_draw: device.create_buffer(
                &GfxBufferDesc::new_stage_buffer(max_draws * PER_DRAW_RECORD_SIZE),
                &format!("per-draw stage buffer-{frame_label}"),
            ),
            material: device.create_buffer(
                &GfxBufferDesc::new_stage_buffer(max_draws * size_of::<GpuMaterialProperties>() as vk::DeviceSize),
                &format!("material stage buffer-{frame_label}"),
            ),
            frame_uniforms: device.create_buffer(
                &GfxBufferDesc::new_stage_buffer(size_of::<GpuFrameUniforms>() as vk::DeviceSize),
                &format!("frame uniforms stage buffer-{frame_label}"),
            ),
            shadow_views: device.create_buffer(
                &GfxBufferDesc::new_stage_buffer(max_shadow_views * size_of::<GpuShadowView>() as vk::DeviceSize),
                &format!("shadow view stage buffer-{frame_label}"),
            ),
        }
    }

    fn destroy(self, device: &mut dyn GfxDevice) {
        device.destroy_buffer(self.per_draw);
        device.destroy_buffer(self.material);
        device.destroy_buffer(self.frame_uniforms);
        device.destroy_buffer(self.shadow_views);
    }
}

#[derive(Clone)]
struct ResetPassData {
    scene: SceneBufferHandles,
    buckets: Vec<BucketBufferHandles>,
}

/// 场景数据的上传
pub struct PerDrawUpload {
    stage_buffers: [UploadStageBuffers; FrameCounter::fif_count()],

    per_draw_buffer: GfxBufferHandle,
    material_buffer: GfxBufferHandle,
    frame_uniforms_buffer: GfxBufferHandle,
    shadow_view_buffer: GfxBufferHandle,

    max_draws: u32,
    max_shadow_views: u32,
}

// new & init
impl PerDrawUpload {
    pub fn new(device: &mut dyn GfxDevice, max_draws: u32, max_shadow_views: u32) -> Self {
        let stage_buffers =
            FrameCounter::frame_labels().map(|label| UploadStageBuffers::new(device, label, max_draws, max_shadow_views));

        let draws = max_draws as vk::DeviceSize;
        let per_draw_buffer =
            device.create_buffer(&GfxBufferDesc::new_ssbo(draws * PER_DRAW_RECORD_SIZE), "per-draw buffer");
        let material_buffer = device.create_buffer(
            &GfxBufferDesc::new_ssbo(draws * size_of::<GpuMaterialProperties>() as vk::DeviceSize),
            "material buffer",
        );
        let frame_uniforms_buffer = device.create_buffer(
            &GfxBufferDesc::new(
                size_of::<GpuFrameUniforms>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER
                    | vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST,
            ),
            "frame uniforms buffer",
        );
        let shadow_view_buffer = device.create_buffer(
            &GfxBufferDesc::new_ssbo(
                max_shadow_views.max(1) as vk::DeviceSize * size_of::<GpuShadowView>() as vk::DeviceSize,
            ),
            "shadow view buffer",
        );

        Self {
            stage_buffers,
            per_draw_buffer,
            material_buffer,
            frame_uniforms_buffer,
            shadow_view_buffer,
            max_draws,
            max_shadow_views,
        }
    }
}
// destroy
impl PerDrawUpload {
    pub fn destroy(self, device: &mut dyn GfxDevice) {
        for stage in self.stage_buffers {
            stage.destroy(device);
        }
        device.destroy_buffer(self.per_draw_buffer);
        device.destroy_buffer(self.material_buffer);
        device.destroy_buffer(self.frame_uniforms_buffer);
        device.destroy_buffer(self.shadow_view_buffer);
    }
}
// getters
impl PerDrawUpload {
    #[inline]
    pub fn per_draw_buffer(&self) -> GfxBufferHandle {
        self.per_draw_buffer
    }
    #[inline]
    pub fn material_buffer(&self) -> GfxBufferHandle {
        self.material_buffer
    }
    #[inline]
    pub fn frame_uniforms_buffer(&self) -> GfxBufferHandle {
        self.frame_uniforms_buffer
    }
    #[inline]
    pub fn shadow_view_buffer(&self) -> GfxBufferHandle {
        self.shadow_view_buffer
    }
}
// tools
impl PerDrawUpload {
    /// 写入本帧的 stage buffer，并添加 reset pass
    ///
    /// reset pass 写入所有场景 buffer 以及每个 bucket 的两个计数，返回写入后的句柄。
    /// 之后的 pass 通过读取这些句柄保证拷贝先于剔除执行。
    ///
    /// # Panics
    /// drawable 数量超过 `max_draws`，或者 shadow view 数量超过容量
    pub fn add_reset_pass(
        &self,
        device: &mut dyn GfxDevice,
        graph: &mut RenderGraphBuilder<'_>,
        frame: &FrameRenderData<'_>,
        frame_label: FrameLabel,
        scene: SceneBufferHandles,
        buckets: &[BucketBufferHandles],
    ) -> (SceneBufferHandles, Vec<BucketBufferHandles>) {
        let _span = tracy_client::span!("PerDrawUpload::add_reset_pass");

        let draw_count = frame.drawables.len();
        if draw_count > self.max_draws as usize {
            panic!("drawable count {} exceeds max_draws {}", draw_count, self.max_draws);
        }
        let shadow_views = build_shadow_views(frame.shadow_lights);
        if shadow_views.len() > self.max_shadow_views as usize {
            panic!("shadow view count {} exceeds capacity {}", shadow_views.len(), self.max_shadow_views);
        }

        let crt_stage_buffers = &self.stage_buffers[*frame_label];

        let per_draw_records: Vec<GpuPerDrawRecord> = frame
            .drawables
            .iter()
            .enumerate()
            .map(|(idx, drawable)| build_per_draw_record(idx as u32, drawable))
            .collect();
        let material_records: Vec<GpuMaterialProperties> =
            frame.drawables.iter().map(|drawable| build_material_record(&drawable.material)).collect();
        let frame_uniforms = build_frame_uniforms(&frame.camera, draw_count as u32, shadow_views.len() as u32);

        device.write_buffer(crt_stage_buffers.per_draw, 0, bytemuck::cast_slice(&per_draw_records));
        device.write_buffer(crt_stage_buffers.material, 0, bytemuck::cast_slice(&material_records));
        device.write_buffer(crt_stage_buffers.frame_uniforms, 0, bytemuck::bytes_of(&frame_uniforms));
        device.write_buffer(crt_stage_buffers.shadow_views, 0, bytemuck::cast_slice(&shadow_views));

        // (src, 大小)，为 0 时不拷贝
        let per_draw_copy = (crt_stage_buffers.per_draw, draw_count as vk::DeviceSize * PER_DRAW_RECORD_SIZE);
        let material_copy = (
            crt_stage_buffers.material,
            (material_records.len() * size_of::<GpuMaterialProperties>()) as vk::DeviceSize,
        );
        let frame_uniforms_copy =
            (crt_stage_buffers.frame_uniforms, size_of::<GpuFrameUniforms>() as vk::DeviceSize);
        let shadow_views_copy =
            (crt_stage_buffers.shadow_views, (shadow_views.len() * size_of::<GpuShadowView>()) as vk::DeviceSize);

        let data = graph.add_pass(
            "reset",
            RgPassKind::Copy,
            |builder| ResetPassData {
                scene: SceneBufferHandles {
                    per_draw: builder.write_buffer(scene.per_draw, RgBufferState::TRANSFER_DST),
                    material: builder.write_buffer(scene.material, RgBufferState::TRANSFER_DST),
                    frame_uniforms: builder.write_buffer(scene.frame_uniforms, RgBufferState::TRANSFER_DST),
                    shadow_views: builder.write_buffer(scene.shadow_views, RgBufferState::TRANSFER_DST),
                },
                buckets: buckets
                    .iter()
                    .map(|bucket| BucketBufferHandles {
                        sort: builder.write_buffer(bucket.sort, RgBufferState::TRANSFER_DST),
                        indirect: builder.write_buffer(bucket.indirect, RgBufferState::TRANSFER_DST),
                    })
                    .collect(),
            },
            move |data, ctx| {
                let copies = [
                    (per_draw_copy, data.scene.per_draw),
                    (material_copy, data.scene.material),
                    (frame_uniforms_copy, data.scene.frame_uniforms),
                    (shadow_views_copy, data.scene.shadow_views),
                ];
                for ((src, size), dst) in copies {
                    if size > 0 {
                        ctx.cmd.copy_buffer(
                            src,
                            ctx.buffer(dst),
                            &[vk::BufferCopy { src_offset: 0, dst_offset: 0, size }],
                        );
                    }
                }

                for bucket in &data.buckets {
                    ctx.cmd.fill_buffer(ctx.buffer(bucket.sort), 0, COUNTER_HEADER_SIZE, 0);
                    ctx.cmd.fill_buffer(ctx.buffer(bucket.indirect), 0, COUNTER_HEADER_SIZE, 0);
                }
            },
        );

        (data.scene, data.buckets)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3, Vec4};

    use sieve_gfx::commands::command_buffer::GfxCommandBuffer;
    use sieve_gfx::resources::buffer::GfxBufferView;
    use sieve_gfx::soft::device::SoftDevice;
    use sieve_render_graph::RgTransientPool;

    use super::*;
    use crate::scene_view::Aabb;

    fn drawable(x: f32, index_offset: u64) -> Drawable {
        let transform = Mat4::from_translation(Vec3::new(x, 0.0, -5.0)) * Mat4::from_scale(Vec3::splat(2.0));
        Drawable {
            transform,
            prev_transform: transform,
            local_bounds: Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            index_view: GfxBufferView::new(Default::default(), index_offset * 4, 36 * 4, 4),
            vertex_view: GfxBufferView::new(Default::default(), 8 * 32, 24 * 32, 32),
            material: MaterialProperties { roughness: x, ..Default::default() },
            transparent: x < 0.0,
            casts_shadow: true,
        }
    }

    #[test]
    fn test_per_draw_record_fields() {
        let record = build_per_draw_record(3, &drawable(-1.0, 100));
        assert_eq!(record.aabb_center, Vec3::new(-1.0, 0.0, -5.0));
        assert_eq!(record.aabb_extent, Vec3::ONE);
        assert_eq!(record.index_count, 36);
        assert_eq!(record.first_index, 100);
        assert_eq!(record.vertex_offset, 8);
        assert_eq!(record.draw_index, 3);
        assert_eq!(record.material_index, 3);
        assert_eq!(record.flags, per_draw_flags::TRANSPARENT | per_draw_flags::CASTS_SHADOW);
    }

    #[test]
    #[should_panic(expected = "vertex offset 3000000000 of drawable 7 exceeds i32")]
    fn test_vertex_offset_overflow_panics() {
        let mut drawable = drawable(1.0, 0);
        drawable.vertex_view = GfxBufferView::new(Default::default(), 3_000_000_000, 4, 1);
        build_per_draw_record(7, &drawable);
    }

    #[test]
    fn test_upload_by_position() {
        let mut device = SoftDevice::new();
        let upload = PerDrawUpload::new(&mut device, 16, 4);
        let mut pool = RgTransientPool::new(2);

        let drawables: Vec<Drawable> = (0..5).map(|i| drawable(i as f32, i * 36)).collect();
        let camera = Camera::look_at(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 100.0);
        let frame = FrameRenderData { drawables: &drawables, camera, shadow_lights: &[] };

        let mut graph = RenderGraphBuilder::new();
        let scene = SceneBufferHandles {
            per_draw: graph.import_buffer("per-draw", upload.per_draw_buffer(), RgBufferState::UNDEFINED),
            material: graph.import_buffer("material", upload.material_buffer(), RgBufferState::UNDEFINED),
            frame_uniforms: graph.import_buffer(
                "frame-uniforms",
                upload.frame_uniforms_buffer(),
                RgBufferState::UNDEFINED,
            ),
            shadow_views: graph.import_buffer("shadow-views", upload.shadow_view_buffer(), RgBufferState::UNDEFINED),
        };
        upload.add_reset_pass(&mut device, &mut graph, &frame, FrameLabel::A, scene, &[]);
        let compiled = graph.compile();

        let cmd = GfxCommandBuffer::new("upload");
        compiled.execute(&cmd, &mut pool, &mut device);
        device.submit(cmd);

        let records: Vec<GpuPerDrawRecord> = device.read_pod_slice(upload.per_draw_buffer(), 0, 5);
        let materials: Vec<GpuMaterialProperties> = device.read_pod_slice(upload.material_buffer(), 0, 5);
        for (i, drawable) in drawables.iter().enumerate() {
            assert_eq!(records[i], build_per_draw_record(i as u32, drawable));
            assert_eq!(materials[i].roughness, i as f32);
        }

        let uniforms: GpuFrameUniforms = device.read_pod(upload.frame_uniforms_buffer(), 0);
        assert_eq!(uniforms.draw_count, 5);
        assert_eq!(uniforms.shadow_view_count, 0);
        assert_eq!(uniforms.camera_position, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    #[should_panic(expected = "drawable count 3 exceeds max_draws 2")]
    fn test_capacity_overflow_panics() {
        let mut device = SoftDevice::new();
        let upload = PerDrawUpload::new(&mut device, 2, 1);
        let drawables: Vec<Drawable> = (0..3).map(|i| drawable(i as f32, 0)).collect();
        let camera = Camera::look_at(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 100.0);
        let frame = FrameRenderData { drawables: &drawables, camera, shadow_lights: &[] };

        let mut graph = RenderGraphBuilder::new();
        let scene = SceneBufferHandles {
            per_draw: graph.import_buffer("per-draw", upload.per_draw_buffer(), RgBufferState::UNDEFINED),
            material: graph.import_buffer("material", upload.material_buffer(), RgBufferState::UNDEFINED),
            frame_uniforms: graph.import_buffer(
                "frame-uniforms",
                upload.frame_uniforms_buffer(),
                RgBufferState::UNDEFINED,
            ),
            shadow_views: graph.import_buffer("shadow-views", upload.shadow_view_buffer(), RgBufferState::UNDEFINED),
        };
        upload.add_reset_pass(&mut device, &mut graph, &frame, FrameLabel::A, scene, &[]);
    }
}
