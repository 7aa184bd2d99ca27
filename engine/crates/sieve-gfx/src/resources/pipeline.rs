/// compute pipeline 的创建信息
///
/// shader 的编译不在本仓库内，后端根据 `shader_path` 找到对应的实现。
#[derive(Clone, Debug)]
pub struct GfxComputePipelineDesc {
    /// shader 路径，同时作为 pipeline 的调试名称
    pub shader_path: String,
    /// 入口函数
    pub entry_point: String,
    /// workgroup 大小，需要和 shader 中的声明一致
    pub group_size: [u32; 3],
    /// push constant 的大小（字节）
    pub push_constant_size: u32,
}

impl GfxComputePipelineDesc {
    pub fn new(shader_path: impl Into<String>, group_size: [u32; 3], push_constant_size: u32) -> Self {
        Self { shader_path: shader_path.into(), entry_point: "main".to_string(), group_size, push_constant_size }
    }
}
