use std::collections::HashMap;

use ash::vk;

/// 一次 `draw_indexed_indirect_count` 实际执行的 draw
#[derive(Clone, Debug)]
pub struct SoftDrawCall {
    /// 从 count buffer 中读取并被 max_draw_count 截断后的数量
    pub count: u32,
    pub commands: Vec<vk::DrawIndexedIndirectCommand>,
}

/// soft 后端的执行统计
#[derive(Clone, Debug, Default)]
pub struct SoftStats {
    /// 每个 pipeline（以 shader 路径区分）被 dispatch 的次数
    pub dispatches: HashMap<String, u32>,
    /// 实际执行的 workgroup 数量
    pub executed_groups: u64,
    /// group 数量为 0 的 dispatch
    pub empty_dispatches: u32,
    pub barrier_batches: u32,
    pub submits: u32,
    pub draw_calls: Vec<SoftDrawCall>,
}

impl SoftStats {
    #[inline]
    pub fn dispatch_count(&self, shader_path: &str) -> u32 {
        self.dispatches.get(shader_path).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total_dispatches(&self) -> u32 {
        self.dispatches.values().sum()
    }
}
