//! 每帧输入的场景快照
//!
//! 由调用者在每帧构建并显式传入，剔除管线不持有任何场景状态。

use glam::{Mat4, Vec3, Vec4};

use sieve_gfx::resources::buffer::GfxBufferView;

use crate::visibility_bucket::LightId;

/// 模型空间的包围盒
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// 变换后的包围盒，返回 (center, extent)
    pub fn transformed(&self, transform: &Mat4) -> (Vec3, Vec3) {
        let center = transform.transform_point3(self.center());
        let extent = self.extent();
        // |M| * extent
        let world_extent = transform.x_axis.truncate().abs() * extent.x
            + transform.y_axis.truncate().abs() * extent.y
            + transform.z_axis.truncate().abs() * extent.z;
        (center, world_extent)
    }
}

/// 纹理没有绑定时的 bindless 索引
pub const INVALID_TEXTURE_INDEX: u32 = u32::MAX;

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialProperties {
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
    pub opacity: f32,

    pub base_color_texture: u32,
    pub normal_texture: u32,
    pub metallic_roughness_texture: u32,
    pub emissive_texture: u32,

    pub double_sided: bool,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            metallic: 0.0,
            roughness: 0.5,
            alpha_cutoff: 0.5,
            opacity: 1.0,
            base_color_texture: INVALID_TEXTURE_INDEX,
            normal_texture: INVALID_TEXTURE_INDEX,
            metallic_roughness_texture: INVALID_TEXTURE_INDEX,
            emissive_texture: INVALID_TEXTURE_INDEX,
            double_sided: false,
        }
    }
}

/// 一个可以绘制的物体
#[derive(Clone, Debug)]
pub struct Drawable {
    pub transform: Mat4,
    /// 上一帧的 transform，用于 motion vector
    pub prev_transform: Mat4,
    pub local_bounds: Aabb,

    pub index_view: GfxBufferView,
    pub vertex_view: GfxBufferView,
    pub material: MaterialProperties,

    pub transparent: bool,
    pub casts_shadow: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl Camera {
    /// 右手坐标系，深度范围 0..1
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_radians: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y_radians, aspect, z_near, z_far),
            position: eye,
        }
    }

    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShadowLightKind {
    /// 每个 cascade 一个 view-projection 矩阵
    Directional { direction: Vec3, cascades: Vec<Mat4> },
    Spot { position: Vec3, view_projection: Mat4 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShadowLight {
    pub id: LightId,
    pub kind: ShadowLightKind,
}

impl ShadowLight {
    pub fn spot(id: LightId, position: Vec3, direction: Vec3, outer_angle_radians: f32, range: f32) -> Self {
        let up = if direction.normalize().dot(Vec3::Y).abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(position, position + direction, up);
        let projection = Mat4::perspective_rh(outer_angle_radians * 2.0, 1.0, 0.05, range);
        Self { id, kind: ShadowLightKind::Spot { position, view_projection: projection * view } }
    }

    pub fn directional(id: LightId, direction: Vec3, cascades: Vec<Mat4>) -> Self {
        Self { id, kind: ShadowLightKind::Directional { direction: direction.normalize(), cascades } }
    }

    /// 该光源需要的 shadow view 数量
    #[inline]
    pub fn view_count(&self) -> usize {
        match &self.kind {
            ShadowLightKind::Directional { cascades, .. } => cascades.len(),
            ShadowLightKind::Spot { .. } => 1,
        }
    }
}

/// 一帧的场景快照
#[derive(Clone, Copy, Debug)]
pub struct FrameRenderData<'a> {
    pub drawables: &'a [Drawable],
    pub camera: Camera,
    pub shadow_lights: &'a [ShadowLight],
}
