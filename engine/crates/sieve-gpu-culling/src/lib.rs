//! Sieve GPU Culling - GPU 驱动的可见性剔除
//!
//! 每帧的流程全部在 GPU 上完成，以 RenderGraph pass 的形式调度：
//!
//! - **upload / reset**: 场景快照写入 stage buffer，拷贝到 device local buffer，清零计数
//! - **cull**: 相机视锥和每个阴影视锥的剔除，结果追加到各个 bucket
//! - **bitonic sort**: 按距离排序，透明物体从远到近
//! - **grab**: 压缩为 `VkDrawIndexedIndirectCommand` 兼容的 draw 参数
//!
//! 阴影 bucket 的 buffer 由 [`draw_call_buffers::DrawCallBufferCache`] 以光源 id 为 key 管理。
//! [`soft_kernels`] 提供所有 shader 在 soft 后端上的实现。

pub mod draw_call_buffers;
pub mod frustum;
pub mod gpu_culling;
pub mod gpu_types;
pub mod pipelines;
pub mod scene_view;
pub mod settings;
pub mod soft_kernels;
pub mod stages;
pub mod visibility_bucket;

pub use gpu_culling::{BucketDrawHandles, CullingOutputs, GpuCulling};
pub use scene_view::{Aabb, Camera, Drawable, FrameRenderData, MaterialProperties, ShadowLight};
pub use settings::CullingSettings;
pub use visibility_bucket::{LightId, VisibilityBucket};
