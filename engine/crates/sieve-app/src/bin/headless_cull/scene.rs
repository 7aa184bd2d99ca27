use glam::{Mat4, Quat, Vec3, Vec4};
use rand::Rng;

use sieve_gfx::handles::GfxBufferHandle;
use sieve_gfx::resources::buffer::GfxBufferView;
use sieve_gpu_culling::scene_view::ShadowLightKind;
use sieve_gpu_culling::{Aabb, Camera, Drawable, LightId, MaterialProperties, ShadowLight};

/// 所有 mesh 共享的 index / vertex buffer 中，每种 mesh 的 (index 数量, vertex 数量)
const MESHES: [(u64, u64); 3] = [(36, 24), (2880, 561), (6, 4)];

/// 随机摆放的物体，整个场景共享一个大的 index buffer 和 vertex buffer
pub struct ProceduralScene {
    pub drawables: Vec<Drawable>,
    /// 每个物体的旋转速度（弧度 / 帧）
    spins: Vec<f32>,
}

impl ProceduralScene {
    pub fn new(rng: &mut impl Rng, count: usize, index_buffer: GfxBufferHandle, vertex_buffer: GfxBufferHandle) -> Self {
        let mut mesh_offsets = Vec::with_capacity(MESHES.len());
        let (mut index_offset, mut vertex_offset) = (0, 0);
        for (index_count, vertex_count) in MESHES {
            mesh_offsets.push((index_offset, vertex_offset, index_count, vertex_count));
            index_offset += index_count;
            vertex_offset += vertex_count;
        }

        let drawables = (0..count)
            .map(|_| {
                let (first_index, first_vertex, index_count, vertex_count) =
                    mesh_offsets[rng.gen_range(0..mesh_offsets.len())];
                let transform = Mat4::from_scale_rotation_translation(
                    Vec3::splat(rng.gen_range(0.5..2.0)),
                    Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU)),
                    Vec3::new(rng.gen_range(-60.0..60.0), rng.gen_range(0.0..8.0), rng.gen_range(-60.0..60.0)),
                );
                let transparent = rng.gen_bool(0.2);
                Drawable {
                    transform,
                    prev_transform: transform,
                    local_bounds: Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
                    index_view: GfxBufferView::new(index_buffer, first_index * 4, index_count * 4, 4),
                    vertex_view: GfxBufferView::new(vertex_buffer, first_vertex * 32, vertex_count * 32, 32),
                    material: MaterialProperties {
                        base_color: Vec4::new(
                            rng.gen_range(0.0..1.0),
                            rng.gen_range(0.0..1.0),
                            rng.gen_range(0.0..1.0),
                            1.0,
                        ),
                        roughness: rng.gen_range(0.1..1.0),
                        opacity: if transparent { 0.5 } else { 1.0 },
                        ..Default::default()
                    },
                    transparent,
                    casts_shadow: !transparent,
                }
            })
            .collect();
        let spins = (0..count).map(|_| rng.gen_range(-0.05..0.05)).collect();

        Self { drawables, spins }
    }

    /// 旋转所有物体，记录上一帧的 transform
    pub fn update(&mut self) {
        for (drawable, spin) in self.drawables.iter_mut().zip(&self.spins) {
            drawable.prev_transform = drawable.transform;
            drawable.transform *= Mat4::from_rotation_y(*spin);
        }
    }
}

/// 绕场景中心旋转的相机
pub fn orbit_camera(frame_idx: u64) -> Camera {
    let angle = frame_idx as f32 * 0.2;
    let eye = Vec3::new(angle.cos() * 40.0, 15.0, angle.sin() * 40.0);
    Camera::look_at(eye, Vec3::ZERO, 60_f32.to_radians(), 16.0 / 9.0, 0.1, 200.0)
}

/// 覆盖 `[-half_size, half_size]` 范围的 cascade
fn cascade(direction: Vec3, half_size: f32) -> Mat4 {
    let view = Mat4::look_at_rh(-direction * 100.0, Vec3::ZERO, Vec3::Z);
    let projection = Mat4::orthographic_rh(-half_size, half_size, -half_size, half_size, 0.1, 300.0);
    projection * view
}

pub fn sun(id: LightId, cascade_count: usize) -> ShadowLight {
    let direction = Vec3::new(0.4, -1.0, 0.3).normalize();
    let cascades = (0..cascade_count).map(|i| cascade(direction, 10.0 * 2_f32.powi(i as i32))).collect();
    ShadowLight::directional(id, direction, cascades)
}

pub fn lamp(id: LightId, position: Vec3) -> ShadowLight {
    ShadowLight::spot(id, position, Vec3::NEG_Y, 35_f32.to_radians(), 25.0)
}

pub fn describe(light: &ShadowLight) -> String {
    match &light.kind {
        ShadowLightKind::Directional { cascades, .. } => format!("{} (directional, {} cascades)", light.id, cascades.len()),
        ShadowLightKind::Spot { position, .. } => format!("{} (spot at {position})", light.id),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_procedural_scene_layout() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut scene = ProceduralScene::new(&mut rng, 64, GfxBufferHandle::default(), GfxBufferHandle::default());
        assert_eq!(scene.drawables.len(), 64);

        for drawable in &scene.drawables {
            // 每个物体都指向 MESHES 中某个 mesh 的起始位置
            let index_count = drawable.index_view.element_count() as u64;
            assert!(MESHES.iter().any(|(count, _)| *count == index_count));
            assert_eq!(drawable.casts_shadow, !drawable.transparent);
            assert!((0.0..1.0).contains(&drawable.material.base_color.x));
        }

        let before = scene.drawables[0].transform;
        scene.update();
        assert_eq!(scene.drawables[0].prev_transform, before);
    }
}
