//! 视锥平面和 AABB 测试
//!
//! 平面从 view-projection 矩阵中提取（深度范围 0..1），法线指向视锥内部，并已经归一化。
//! host 端构建 shader 使用的平面，soft kernel 也使用这里的测试函数。

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrustumPlane {
    Left,
    Right,
    Bottom,
    Top,
    Near,
    Far,
}

/// 最多 6 个平面的视锥
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
    count: usize,
}

// new & init
impl Frustum {
    /// camera 使用完整的 6 个平面
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        Self::with_planes(
            view_projection,
            &[
                FrustumPlane::Left,
                FrustumPlane::Right,
                FrustumPlane::Bottom,
                FrustumPlane::Top,
                FrustumPlane::Near,
                FrustumPlane::Far,
            ],
        )
    }

    /// spot light 不需要近平面
    pub fn for_spot_light(view_projection: Mat4) -> Self {
        Self::with_planes(
            view_projection,
            &[FrustumPlane::Left, FrustumPlane::Right, FrustumPlane::Bottom, FrustumPlane::Top, FrustumPlane::Far],
        )
    }

    /// cascade 只使用四个侧面，光源方向上的物体都可能投射阴影
    pub fn for_cascade(view_projection: Mat4) -> Self {
        Self::with_planes(
            view_projection,
            &[FrustumPlane::Left, FrustumPlane::Right, FrustumPlane::Bottom, FrustumPlane::Top],
        )
    }

    pub fn with_planes(view_projection: Mat4, which: &[FrustumPlane]) -> Self {
        assert!(which.len() <= 6, "a frustum has at most 6 planes");
        let mut planes = [Vec4::ZERO; 6];
        for (dst, &plane) in planes.iter_mut().zip(which) {
            *dst = extract_plane(view_projection, plane);
        }
        Self { planes, count: which.len() }
    }
}
// getters
impl Frustum {
    #[inline]
    pub fn planes(&self) -> &[Vec4] {
        &self.planes[..self.count]
    }

    /// 补齐到 6 个平面，多出来的平面为 0
    #[inline]
    pub fn padded_planes(&self) -> [Vec4; 6] {
        self.planes
    }

    #[inline]
    pub fn plane_count(&self) -> u32 {
        self.count as u32
    }
}
// tools
impl Frustum {
    /// AABB 完全位于任意一个平面之外时返回 false
    pub fn intersects_aabb(&self, center: Vec3, extent: Vec3) -> bool {
        planes_intersect_aabb(self.planes(), center, extent)
    }
}

fn extract_plane(m: Mat4, plane: FrustumPlane) -> Vec4 {
    let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
    let p = match plane {
        FrustumPlane::Left => r3 + r0,
        FrustumPlane::Right => r3 - r0,
        FrustumPlane::Bottom => r3 + r1,
        FrustumPlane::Top => r3 - r1,
        FrustumPlane::Near => r2,
        FrustumPlane::Far => r3 - r2,
    };
    let len = p.xyz().length();
    if len > 0.0 { p / len } else { p }
}

/// AABB 是否完全位于平面的负侧
#[inline]
pub fn aabb_outside_plane(plane: Vec4, center: Vec3, extent: Vec3) -> bool {
    let n = plane.xyz();
    n.dot(center) + plane.w + extent.dot(n.abs()) < 0.0
}

#[inline]
pub fn planes_intersect_aabb(planes: &[Vec4], center: Vec3, extent: Vec3) -> bool {
    !planes.iter().any(|&plane| aabb_outside_plane(plane, center, extent))
}

/// 将距离编码为保持顺序的 u32，可以直接作为 sort key 比较
#[inline]
pub fn distance_sort_key(distance: f32) -> u32 {
    let bits = distance.to_bits();
    if bits & 0x8000_0000 != 0 { !bits } else { bits | 0x8000_0000 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_view_projection() -> Mat4 {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let projection = Mat4::perspective_rh(60_f32.to_radians(), 1.0, 0.1, 100.0);
        projection * view
    }

    #[test]
    fn test_camera_frustum_aabb() {
        let frustum = Frustum::from_view_projection(camera_view_projection());
        assert_eq!(frustum.plane_count(), 6);

        // 正前方
        assert!(frustum.intersects_aabb(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE));
        // 身后
        assert!(!frustum.intersects_aabb(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE));
        // 远平面之外
        assert!(!frustum.intersects_aabb(Vec3::new(0.0, 0.0, -200.0), Vec3::ONE));
        // 跨越左平面
        assert!(frustum.intersects_aabb(Vec3::new(-6.0, 0.0, -10.0), Vec3::splat(1.0)));
        assert!(!frustum.intersects_aabb(Vec3::new(-20.0, 0.0, -10.0), Vec3::splat(1.0)));
    }

    #[test]
    fn test_cascade_ignores_depth() {
        let light_view = Mat4::look_at_rh(Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, Vec3::Z);
        let light_projection = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 1.0, 20.0);
        let view_projection = light_projection * light_view;

        // 光源背后的物体超出了近平面，但依然可以投射阴影
        let center = Vec3::new(0.0, 80.0, 0.0);
        assert!(!Frustum::from_view_projection(view_projection).intersects_aabb(center, Vec3::ONE));
        assert!(Frustum::for_cascade(view_projection).intersects_aabb(center, Vec3::ONE));
        assert!(!Frustum::for_cascade(view_projection).intersects_aabb(Vec3::new(30.0, 0.0, 0.0), Vec3::ONE));
    }

    #[test]
    fn test_sort_key_preserves_order() {
        let values = [-100.0_f32, -1.5, -0.0, 0.0, 0.25, 1.0, 3.5, 1.0e6];
        let keys: Vec<u32> = values.iter().map(|&v| distance_sort_key(v)).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert!(distance_sort_key(-1.0) < distance_sort_key(1.0));
    }
}
