//! RenderGraph 构建器和执行器
//!
//! 提供 `RenderGraphBuilder` 用于构建渲染图，
//! `CompiledGraph` 用于保存编译结果并录制命令。

use ash::vk;
use itertools::Itertools;
use slotmap::SecondaryMap;

use sieve_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use sieve_gfx::commands::command_buffer::GfxCommandBuffer;
use sieve_gfx::device::GfxDevice;
use sieve_gfx::handles::{GfxBufferHandle, GfxImageHandle};

use crate::barrier::{PassBarriers, RgTrackedBufferState, RgTrackedImageState};
use crate::buffer_resource::{RgBufferDesc, RgBufferResource};
use crate::graph::{DependencyAnalyzer, DependencyGraph, RgResourceId};
use crate::image_resource::{RgImageResource, RgImageSource};
use crate::pass::{RgPassBuilder, RgPassContext, RgPassKind, RgPassNode};
use crate::resource_handle::{RgBufferHandle, RgBufferId, RgImageHandle, RgImageId};
use crate::resource_registry::RgResourceRegistry;
use crate::resource_state::{RgBufferState, RgImageState};
use crate::transient_pool::{RgAliasPlan, RgTransientPool};

/// Pass 执行器 trait
///
/// 由 `add_pass` 把 setup 返回的数据和 execute 闭包打包成的对象实现
pub(crate) trait RgPassExecutor {
    fn execute(&self, ctx: &RgPassContext<'_>);
}

struct RgClosurePass<D, E> {
    data: D,
    execute: E,
}

impl<D, E> RgPassExecutor for RgClosurePass<D, E>
where
    E: Fn(&D, &RgPassContext<'_>),
{
    #[inline]
    fn execute(&self, ctx: &RgPassContext<'_>) {
        (self.execute)(&self.data, ctx)
    }
}

/// RenderGraph 构建器
///
/// # 使用流程
///
/// 1. 创建 builder: `RenderGraphBuilder::new()`
/// 2. 导入外部资源: `builder.import_buffer(...)`
/// 3. 添加 Pass: `builder.add_pass("name", kind, setup, execute)`
/// 4. 编译: `builder.compile()`
/// 5. 执行: `compiled.execute(...)`
///
/// # 生命周期
///
/// `'a` 是 Pass 的 execute 闭包可以借用的外部资源的生命周期。
pub struct RenderGraphBuilder<'a> {
    resources: RgResourceRegistry,

    /// Pass 节点列表（按添加顺序）
    passes: Vec<RgPassNode<'a>>,
}

impl Default for RenderGraphBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> RenderGraphBuilder<'a> {
    pub fn new() -> Self {
        Self { resources: RgResourceRegistry::new(), passes: Vec::new() }
    }

    /// 导入外部缓冲区资源，graph 不负责其生命周期
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        buffer_handle: GfxBufferHandle,
        initial_state: RgBufferState,
    ) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::imported(name, buffer_handle, initial_state))
    }

    /// 导入外部图像资源
    ///
    /// `initial_state` 的 layout 需要和图像真实的 layout 一致
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        image_handle: GfxImageHandle,
        format: vk::Format,
        initial_state: RgImageState,
    ) -> RgImageHandle {
        self.resources.register_image(RgImageResource::imported(name, image_handle, format, initial_state))
    }

    /// 添加 Pass
    ///
    /// `setup` 立即执行，声明资源依赖并返回 Pass 的数据 `D`；
    /// `execute` 在执行阶段拿到同一份数据。返回值是 `D` 的拷贝，供后续 Pass 使用其中的句柄。
    pub fn add_pass<D, S, E>(&mut self, name: impl Into<String>, kind: RgPassKind, setup: S, execute: E) -> D
    where
        D: Clone + 'a,
        S: FnOnce(&mut RgPassBuilder<'_>) -> D,
        E: Fn(&D, &RgPassContext<'_>) + 'a,
    {
        let name = name.into();
        let mut builder = RgPassBuilder::new(name.clone(), &mut self.resources);
        let data = setup(&mut builder);

        let RgPassBuilder { image_reads, image_writes, buffer_reads, buffer_writes, .. } = builder;
        let pass_data = data.clone();
        self.passes.push(RgPassNode {
            name,
            kind,
            image_reads,
            image_writes,
            buffer_reads,
            buffer_writes,
            executor: Box::new(RgClosurePass { data: pass_data, execute }),
        });

        data
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// 编译渲染图
    ///
    /// 执行依赖分析、拓扑排序、临时资源复用计划以及 barrier 计算。
    ///
    /// # Panics
    /// 如果检测到循环依赖
    pub fn compile(self) -> CompiledGraph<'a> {
        let _span = tracy_client::span!("RenderGraphBuilder::compile");

        let reads = self
            .passes
            .iter()
            .map(|p| {
                let buffers = p.buffer_reads.iter().map(|(h, _)| RgResourceId::Buffer(h.id));
                let images = p.image_reads.iter().map(|(h, _)| RgResourceId::Image(h.id));
                buffers.chain(images).collect_vec()
            })
            .collect_vec();
        let writes = self
            .passes
            .iter()
            .map(|p| {
                let buffers = p.buffer_writes.iter().map(|(h, _)| RgResourceId::Buffer(h.id));
                let images = p.image_writes.iter().map(|(h, _)| RgResourceId::Image(h.id));
                buffers.chain(images).collect_vec()
            })
            .collect_vec();

        let dep_graph = DependencyAnalyzer::analyze(&reads, &writes);

        let execution_order = dep_graph.topological_sort().unwrap_or_else(|cycle| {
            let cycle_names = cycle.iter().map(|&i| &self.passes[i].name).collect_vec();
            panic!("RenderGraph: Cycle detected involving passes: {:?}", cycle_names);
        });

        let alias_plan = RgAliasPlan::build(&self.transient_buffer_lifetimes(&execution_order));
        let (barriers, final_buffer_states, final_image_states) =
            self.compute_barriers(&execution_order, &alias_plan);

        CompiledGraph {
            resources: self.resources,
            passes: self.passes,
            execution_order,
            barriers,
            alias_plan,
            final_buffer_states,
            final_image_states,
            dep_graph,
        }
    }

    /// 每个 Pass 按声明顺序合并后的 buffer 使用（同一资源既读又写时使用写入状态）
    fn merged_buffer_usage(pass: &RgPassNode<'_>) -> Vec<(RgBufferId, RgBufferState)> {
        let mut usage: Vec<(RgBufferId, RgBufferState)> = Vec::new();
        for (handle, state) in &pass.buffer_reads {
            if !usage.iter().any(|(id, _)| *id == handle.id) {
                usage.push((handle.id, *state));
            }
        }
        for (handle, state) in &pass.buffer_writes {
            match usage.iter_mut().find(|(id, _)| *id == handle.id) {
                Some(entry) => entry.1 = *state,
                None => usage.push((handle.id, *state)),
            }
        }
        usage
    }

    fn merged_image_usage(pass: &RgPassNode<'_>) -> Vec<(RgImageId, RgImageState)> {
        let mut usage: Vec<(RgImageId, RgImageState)> = Vec::new();
        for (handle, state) in &pass.image_reads {
            if !usage.iter().any(|(id, _)| *id == handle.id) {
                usage.push((handle.id, *state));
            }
        }
        for (handle, state) in &pass.image_writes {
            match usage.iter_mut().find(|(id, _)| *id == handle.id) {
                Some(entry) => entry.1 = *state,
                None => usage.push((handle.id, *state)),
            }
        }
        usage
    }

    /// 临时 buffer 在执行顺序中的生命周期
    fn transient_buffer_lifetimes(&self, execution_order: &[usize]) -> Vec<(RgBufferId, RgBufferDesc, usize, usize)> {
        let mut lifetimes: SecondaryMap<RgBufferId, (usize, usize)> = SecondaryMap::new();
        for (position, &pass_idx) in execution_order.iter().enumerate() {
            for (id, _) in Self::merged_buffer_usage(&self.passes[pass_idx]) {
                match lifetimes.get_mut(id) {
                    Some((_, last)) => *last = position,
                    None => {
                        lifetimes.insert(id, (position, position));
                    }
                }
            }
        }

        self.resources
            .iter_buffers()
            .filter_map(|(id, resource)| {
                let desc = resource.transient_desc()?;
                match lifetimes.get(id) {
                    Some(&(first, last)) => Some((id, desc.clone(), first, last)),
                    None => {
                        log::warn!("RenderGraph: transient buffer <{}> is never used", resource.name);
                        None
                    }
                }
            })
            .collect()
    }

    /// 计算每个 Pass 需要的 barriers
    ///
    /// 按执行顺序模拟资源的状态变化。复用物理 buffer 的临时资源，
    /// 初始状态是同一个 slot 中前一个占用者最后的状态。
    #[allow(clippy::type_complexity)]
    fn compute_barriers(
        &self,
        execution_order: &[usize],
        alias_plan: &RgAliasPlan,
    ) -> (Vec<PassBarriers>, SecondaryMap<RgBufferId, RgBufferState>, SecondaryMap<RgImageId, RgImageState>) {
        let mut barriers = vec![PassBarriers::new(); self.passes.len()];

        let mut buffer_states: SecondaryMap<RgBufferId, RgTrackedBufferState> = SecondaryMap::new();
        let mut image_states: SecondaryMap<RgImageId, RgTrackedImageState> = SecondaryMap::new();

        for (id, res) in self.resources.iter_buffers() {
            if !res.is_transient() {
                buffer_states.insert(id, RgTrackedBufferState::new(res.initial_state));
            }
        }
        for (id, res) in self.resources.iter_images() {
            image_states.insert(id, RgTrackedImageState::new(res.initial_state));
        }

        for &pass_idx in execution_order {
            let pass = &self.passes[pass_idx];
            let pass_barriers = &mut barriers[pass_idx];

            for (id, required) in Self::merged_buffer_usage(pass) {
                if !buffer_states.contains_key(id) {
                    // 第一次使用的临时资源
                    let inherited = alias_plan.predecessor_of(id).and_then(|prev| buffer_states.get(prev).copied());
                    let tracked = inherited.unwrap_or_else(|| RgTrackedBufferState::new(RgBufferState::UNDEFINED));
                    buffer_states.insert(id, tracked);
                }
                let tracked = &mut buffer_states[id];
                if let Some(barrier) = tracked.transition(id, required) {
                    pass_barriers.add_buffer_barrier(barrier);
                }
            }

            for (id, required) in Self::merged_image_usage(pass) {
                let aspect = self.resources.get_image(id).map(|r| r.infer_aspect()).unwrap_or(vk::ImageAspectFlags::COLOR);
                let tracked = &mut image_states[id];
                if let Some(barrier) = tracked.transition(id, required, aspect) {
                    pass_barriers.add_image_barrier(barrier);
                }
            }
        }

        let final_buffer_states = buffer_states.iter().map(|(id, tracked)| (id, tracked.current)).collect();
        let final_image_states = image_states.iter().map(|(id, tracked)| (id, tracked.current)).collect();
        (barriers, final_buffer_states, final_image_states)
    }
}

/// 编译后的渲染图
///
/// 包含执行顺序、预计算的 barriers 以及临时资源的复用计划。
pub struct CompiledGraph<'a> {
    resources: RgResourceRegistry,
    passes: Vec<RgPassNode<'a>>,
    /// 执行顺序（拓扑排序后）
    execution_order: Vec<usize>,
    /// 每个 Pass 的 barriers（按 pass 索引）
    barriers: Vec<PassBarriers>,
    alias_plan: RgAliasPlan,
    final_buffer_states: SecondaryMap<RgBufferId, RgBufferState>,
    final_image_states: SecondaryMap<RgImageId, RgImageState>,
    dep_graph: DependencyGraph,
}

// getters
impl CompiledGraph<'_> {
    #[inline]
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn pass_name(&self, index: usize) -> &str {
        &self.passes[index].name
    }

    #[inline]
    pub fn pass_kind(&self, index: usize) -> RgPassKind {
        self.passes[index].kind
    }

    /// 按执行顺序排列的 Pass 名称
    pub fn ordered_pass_names(&self) -> Vec<&str> {
        self.execution_order.iter().map(|&i| self.passes[i].name.as_str()).collect()
    }

    #[inline]
    pub fn pass_barriers(&self, index: usize) -> &PassBarriers {
        &self.barriers[index]
    }

    /// 按名称查找 Pass 的 barriers
    pub fn pass_barriers_by_name(&self, name: &str) -> Option<&PassBarriers> {
        self.passes.iter().position(|p| p.name == name).map(|i| &self.barriers[i])
    }

    #[inline]
    pub fn alias_plan(&self) -> &RgAliasPlan {
        &self.alias_plan
    }

    #[inline]
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dep_graph
    }

    /// graph 执行完毕后资源所处的状态，用于下一帧导入
    pub fn final_buffer_state(&self, handle: RgBufferHandle) -> RgBufferState {
        self.final_buffer_states.get(handle.id).copied().unwrap_or_else(|| {
            self.resources.get_buffer(handle.id).map(|r| r.initial_state).unwrap_or(RgBufferState::UNDEFINED)
        })
    }

    pub fn final_image_state(&self, handle: RgImageHandle) -> RgImageState {
        self.final_image_states.get(handle.id).copied().unwrap_or(RgImageState::UNDEFINED)
    }
}
// 执行
impl CompiledGraph<'_> {
    /// 执行渲染图：分配临时资源，按顺序录制 barrier 和每个 Pass 的命令
    ///
    /// 临时资源在 `transient_pool.end_frame` 之前一直有效
    pub fn execute(&self, cmd: &GfxCommandBuffer, transient_pool: &mut RgTransientPool, device: &mut dyn GfxDevice) {
        let _span = tracy_client::span!("CompiledGraph::execute");

        let mut buffer_handles: SecondaryMap<RgBufferId, GfxBufferHandle> = SecondaryMap::new();
        let mut image_handles: SecondaryMap<RgImageId, GfxImageHandle> = SecondaryMap::new();

        // 每个 slot 分配一个物理 buffer，slot 内的占用者共享
        for slot in &self.alias_plan.slots {
            let name = slot.occupants.iter().map(|&id| self.resources.buffer_name(id)).join("|");
            let physical = transient_pool.acquire_buffer(device, &slot.desc, &name);
            for &id in &slot.occupants {
                buffer_handles.insert(id, physical);
            }
        }
        for (id, resource) in self.resources.iter_buffers() {
            if let Some(handle) = resource.imported_handle() {
                buffer_handles.insert(id, handle);
            }
        }
        for (id, resource) in self.resources.iter_images() {
            let handle = match &resource.source {
                RgImageSource::Imported { image_handle, .. } => *image_handle,
                RgImageSource::Transient { desc } => {
                    transient_pool.acquire_image(device, desc, &resource.name)
                }
            };
            image_handles.insert(id, handle);
        }

        for &pass_idx in &self.execution_order {
            let pass = &self.passes[pass_idx];
            self.record_barriers(cmd, &self.barriers[pass_idx], &buffer_handles, &image_handles);

            cmd.begin_label(&pass.name, pass.kind.label_color());
            let ctx = RgPassContext {
                cmd,
                pass_name: &pass.name,
                buffer_handles: &buffer_handles,
                image_handles: &image_handles,
            };
            pass.executor.execute(&ctx);
            cmd.end_label();
        }
    }

    /// 一个 Pass 的所有 barrier 作为一次 pipeline barrier 录制
    fn record_barriers(
        &self,
        cmd: &GfxCommandBuffer,
        pass_barriers: &PassBarriers,
        buffer_handles: &SecondaryMap<RgBufferId, GfxBufferHandle>,
        image_handles: &SecondaryMap<RgImageId, GfxImageHandle>,
    ) {
        if !pass_barriers.has_barriers() {
            return;
        }

        let buffer_barriers: Vec<GfxBufferBarrier> = pass_barriers
            .buffer_barriers
            .iter()
            .filter_map(|desc| buffer_handles.get(desc.resource).map(|&buffer| desc.to_gfx_barrier(buffer)))
            .collect();
        let image_barriers: Vec<GfxImageBarrier> = pass_barriers
            .image_barriers
            .iter()
            .filter_map(|desc| image_handles.get(desc.resource).map(|&image| desc.to_gfx_barrier(image)))
            .collect();

        cmd.pipeline_barrier(&buffer_barriers, &image_barriers);
    }
}
// 调试方法
impl CompiledGraph<'_> {
    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 Pass 的执行顺序、读写信息、barrier，以及临时资源的复用情况
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            self.passes.len(),
            self.ordered_pass_names().join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, &pass_idx) in self.execution_order.iter().enumerate() {
            let pass = &self.passes[pass_idx];
            let barriers = &self.barriers[pass_idx];

            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] {} Pass: \"{}\"", order + 1, self.execution_order.len(), pass.kind, pass.name);
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            if !pass.buffer_reads.is_empty() {
                log::info!("│ Buffer Reads:");
                for (handle, state) in &pass.buffer_reads {
                    log::info!(
                        "│   📖 \"{}\" {:?} (stage: {}, access: {})",
                        self.resources.buffer_name(handle.id),
                        handle,
                        format_pipeline_stage(state.stage),
                        format_access_flags(state.access)
                    );
                }
            }
            if !pass.buffer_writes.is_empty() {
                log::info!("│ Buffer Writes:");
                for (handle, state) in &pass.buffer_writes {
                    log::info!(
                        "│   ✏️  \"{}\" {:?} (stage: {}, access: {})",
                        self.resources.buffer_name(handle.id),
                        handle,
                        format_pipeline_stage(state.stage),
                        format_access_flags(state.access)
                    );
                }
            }
            if !pass.image_reads.is_empty() {
                log::info!("│ Image Reads:");
                for (handle, state) in &pass.image_reads {
                    log::info!("│   📖 \"{}\" @ {:?}", self.resources.image_name(handle.id), state.layout);
                }
            }
            if !pass.image_writes.is_empty() {
                log::info!("│ Image Writes:");
                for (handle, state) in &pass.image_writes {
                    log::info!("│   ✏️  \"{}\" @ {:?}", self.resources.image_name(handle.id), state.layout);
                }
            }

            if barriers.has_barriers() {
                log::info!("├─────────────────────────────────────────────────────────────────┤");
                log::info!(
                    "│ Barriers: {} image, {} buffer",
                    barriers.image_barrier_count(),
                    barriers.buffer_barrier_count()
                );
                for barrier in &barriers.buffer_barriers {
                    log::info!("│   🔒 Buffer \"{}\":", self.resources.buffer_name(barrier.resource));
                    log::info!(
                        "│       Stage:  {} → {}",
                        format_pipeline_stage(barrier.src_state.stage),
                        format_pipeline_stage(barrier.dst_state.stage)
                    );
                    log::info!(
                        "│       Access: {} → {}",
                        format_access_flags(barrier.src_state.src_access()),
                        format_access_flags(barrier.dst_state.access)
                    );
                }
                for barrier in &barriers.image_barriers {
                    log::info!("│   🔒 Image \"{}\":", self.resources.image_name(barrier.resource));
                    log::info!("│       Layout: {:?} → {:?}", barrier.src_state.layout, barrier.dst_state.layout);
                    log::info!(
                        "│       Stage:  {} → {}",
                        format_pipeline_stage(barrier.src_state.stage),
                        format_pipeline_stage(barrier.dst_state.stage)
                    );
                }
            } else {
                log::info!("│ No barriers required");
            }

            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        if self.alias_plan.slot_count() > 0 {
            log::info!("");
            log::info!("Transient buffers: {} physical slot(s)", self.alias_plan.slot_count());
            for (idx, slot) in self.alias_plan.slots.iter().enumerate() {
                log::info!(
                    "  slot {}: {} bytes <- [{}]",
                    idx,
                    slot.desc.size,
                    slot.occupants.iter().map(|&id| self.resources.buffer_name(id)).join(", ")
                );
            }
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }
}

/// 格式化 PipelineStageFlags2 为可读字符串
fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::INDEX_INPUT, "INDEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];
    let stages = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }
    const NAMES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    ];
    let flags = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if flags.is_empty() { format!("{:?}", access) } else { flags.join(" | ") }
}
