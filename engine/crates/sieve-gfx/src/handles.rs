use slotmap::new_key_type;

new_key_type! {
    /// 物理 buffer 句柄，由 `GfxDevice` 分配
    pub struct GfxBufferHandle;
    /// 物理 image 句柄
    pub struct GfxImageHandle;
    /// compute pipeline 句柄
    pub struct GfxPipelineHandle;
}
