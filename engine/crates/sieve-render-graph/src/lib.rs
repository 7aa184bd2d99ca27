//! Sieve RenderGraph - 声明式的每帧调度
//!
//! 提供自动依赖分析、barrier 生成以及临时资源复用的渲染图抽象。
//!
//! # 核心概念
//!
//! - **RgBufferHandle / RgImageHandle**: 带版本号的虚拟资源句柄，每次声明写入版本加一
//! - **RgBufferState / RgImageState**: 资源状态描述，包含 stage、access、layout
//! - **RgPassKind**: Pass 的类型，封闭枚举
//! - **RenderGraphBuilder**: 注册资源和 Pass，`add_pass` 的 setup 闭包返回 Pass 自己的数据
//! - **CompiledGraph**: 编译结果，包含执行顺序、预计算的 barriers 以及临时资源的复用计划
//! - **RgTransientPool**: 跨帧复用临时资源的物理分配
//!
//! # 使用示例
//!
//! ```ignore
//! let mut builder = RenderGraphBuilder::new();
//! let input = builder.import_buffer("input", input_buffer, RgBufferState::UNDEFINED);
//!
//! #[derive(Clone, Copy)]
//! struct BlurData {
//!     input: RgBufferHandle,
//!     output: RgBufferHandle,
//! }
//! let blur = builder.add_pass(
//!     "blur",
//!     RgPassKind::Compute,
//!     |builder| {
//!         let output = builder.create_buffer("blur-output", RgBufferDesc::new_ssbo(1024));
//!         BlurData {
//!             input: builder.read_buffer(input, RgBufferState::STORAGE_READ_COMPUTE),
//!             output: builder.write_buffer(output, RgBufferState::STORAGE_WRITE_COMPUTE),
//!         }
//!     },
//!     move |data, ctx| {
//!         blur_pass.exec(ctx.cmd, &[GfxBinding::read(0, ctx.buffer(data.input))], [4, 1, 1]);
//!     },
//! );
//!
//! let graph = builder.compile();
//! graph.execute(&cmd, &mut transient_pool, &mut device);
//! ```

mod barrier;
mod buffer_resource;
mod compute_pass;
mod executor;
mod graph;
mod image_resource;
mod pass;
mod resource_handle;
mod resource_registry;
mod resource_state;
mod transient_pool;

pub use barrier::{PassBarriers, RgBufferBarrierDesc, RgImageBarrierDesc};
pub use buffer_resource::{RgBufferDesc, RgBufferResource, RgBufferSource};
pub use compute_pass::ComputePass;
pub use executor::{CompiledGraph, RenderGraphBuilder};
pub use graph::{DependencyAnalyzer, DependencyEdge, DependencyGraph, RgResourceId};
pub use image_resource::{RgImageDesc, RgImageResource, RgImageSource};
pub use pass::{RgPassBuilder, RgPassContext, RgPassKind};
pub use resource_handle::{RgBufferHandle, RgBufferId, RgImageHandle, RgImageId};
pub use resource_registry::RgResourceRegistry;
pub use resource_state::{RgBufferState, RgImageState};
pub use transient_pool::{RgAliasPlan, RgTransientPool};
