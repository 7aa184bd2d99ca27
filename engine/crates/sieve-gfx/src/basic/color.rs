/// debug label 的颜色
pub struct LabelColor;

impl LabelColor {
    pub const COLOR_PASS: [f32; 4] = [0.4, 0.7, 1.0, 1.0];
    pub const COLOR_COMPUTE: [f32; 4] = [0.9, 0.6, 0.2, 1.0];
    pub const COLOR_COPY: [f32; 4] = [0.5, 0.5, 0.5, 1.0];
    pub const COLOR_STAGE: [f32; 4] = [0.3, 0.9, 0.4, 1.0];
}
