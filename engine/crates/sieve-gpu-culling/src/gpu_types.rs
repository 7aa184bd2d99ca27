//! 和 shader 共享的数据布局
//!
//! 所有结构体都是 `#[repr(C)]` 的 Pod 类型，布局和 shader 中的 std430 声明一致。

use glam::{Mat4, Vec3, Vec4};

/// `GpuPerDrawRecord::flags`
pub mod per_draw_flags {
    pub const TRANSPARENT: u32 = 1 << 0;
    pub const CASTS_SHADOW: u32 = 1 << 1;
}

/// `GpuShadowView::kind`
pub mod shadow_view_kind {
    /// sort key 是到光源位置的距离
    pub const SPOT: u32 = 0;
    /// sort key 是沿光源方向的深度
    pub const CASCADE: u32 = 1;
}

/// 每个 drawable 一条，剔除和压缩都从这里读取数据
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPerDrawRecord {
    pub transform: Mat4,
    pub prev_transform: Mat4,

    /// 世界空间 AABB
    pub aabb_center: Vec3,
    pub index_count: u32,
    pub aabb_extent: Vec3,
    pub first_index: u32,

    pub vertex_offset: i32,
    pub material_index: u32,
    pub flags: u32,
    pub draw_index: u32,

    pub _padding: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMaterialProperties {
    pub base_color: Vec4,
    /// w 无效
    pub emissive: Vec4,

    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
    pub opacity: f32,

    /// base color, normal, metallic-roughness, emissive 的 bindless 索引
    pub texture_indices: [u32; 4],

    pub flags: u32,
    pub _padding: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuFrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// w 无效
    pub camera_position: Vec4,
    pub frustum_planes: [Vec4; 6],

    pub draw_count: u32,
    pub shadow_view_count: u32,
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowView {
    pub view_projection: Mat4,
    /// spot: 光源位置；cascade: 光源方向（单位向量）
    pub origin: Vec4,
    pub planes: [Vec4; 6],

    pub plane_count: u32,
    pub kind: u32,
    pub _padding: [u32; 2],
}

/// 待排序的条目
///
/// `payload` 是 per-draw record 的索引，`u32::MAX` 表示空条目
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSortEntry {
    pub key: u32,
    pub payload: u32,
}

impl GpuSortEntry {
    pub const SENTINEL: Self = Self { key: u32::MAX, payload: u32::MAX };

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.payload == u32::MAX
    }

    /// 在排序结果中 `self` 是否应该排在 `other` 之前
    ///
    /// 空条目在两种方向下都排在所有有效条目之后
    #[inline]
    pub fn comes_before(&self, other: &Self, descending: bool) -> bool {
        match (self.is_sentinel(), other.is_sentinel()) {
            (true, _) => false,
            (false, true) => true,
            (false, false) => {
                if descending {
                    self.key > other.key
                } else {
                    self.key < other.key
                }
            }
        }
    }
}

/// 压缩后的 indirect draw 参数
///
/// 前 20 字节和 `VkDrawIndexedIndirectCommand` 一致
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuIndirectDrawRecord {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
    pub draw_index: u32,
}

/// indirect dispatch 的参数
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDispatchArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// 计数 buffer 的头部，位于 buffer 起始处
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCounterHeader {
    pub count: u32,
    pub _padding: [u32; 3],
}

pub const COUNTER_HEADER_SIZE: u64 = size_of::<GpuCounterHeader>() as u64;
pub const SORT_ENTRY_SIZE: u64 = size_of::<GpuSortEntry>() as u64;
pub const INDIRECT_DRAW_STRIDE: u32 = size_of::<GpuIndirectDrawRecord>() as u32;
pub const DISPATCH_ARGS_SIZE: u64 = size_of::<GpuDispatchArgs>() as u64;
pub const PER_DRAW_RECORD_SIZE: u64 = size_of::<GpuPerDrawRecord>() as u64;

const _: () = assert!(size_of::<GpuPerDrawRecord>() == 192);
const _: () = assert!(size_of::<GpuMaterialProperties>() == 80);
const _: () = assert!(size_of::<GpuFrameUniforms>() == 320);
const _: () = assert!(size_of::<GpuShadowView>() == 192);
const _: () = assert!(size_of::<GpuIndirectDrawRecord>() == 24);
const _: () = assert!(size_of::<GpuDispatchArgs>() == 12);
const _: () = assert!(size_of::<GpuCounterHeader>() == 16);

// push constants

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullParams {
    pub draw_count: u32,
    /// shadow view 的索引，camera 剔除时无效
    pub view_index: u32,
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BitonicArgsParams {
    pub max_iterations: u32,
    pub _padding: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BitonicParams {
    pub k: u32,
    pub j: u32,
    /// 0 升序，1 降序
    pub descending: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GrabParams {
    pub max_draw_count: u32,
    pub _padding: [u32; 3],
}
