use std::path::Path;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

/// `max_draws` 的上限，bitonic 排序的容量需要向上取到 2 的幂
pub const MAX_DRAWS_LIMIT: u32 = 1 << 24;

/// 剔除管线的容量配置
///
/// 所有容量都是静态的，超出时直接 panic。可以从 TOML 文件中加载，缺省的字段使用默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingSettings {
    /// 每帧最多的 drawable 数量，同时也是每个 bucket 的容量
    pub max_draws: u32,
    /// 最多同时投射阴影的 spot light 数量
    pub max_spot_shadows: u32,
    /// 最多同时投射阴影的方向光数量
    pub max_directional_lights: u32,
    /// 每个方向光最多的 cascade 数量
    pub max_cascades: u32,
    /// RenderGraph 临时资源空闲超过该帧数后被销毁
    pub transient_idle_frames: u32,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            max_draws: 4096,
            max_spot_shadows: 8,
            max_directional_lights: 2,
            max_cascades: 4,
            transient_idle_frames: 3,
        }
    }
}

// new & init
impl CullingSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read culling settings: {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid culling settings: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(content).context("failed to parse culling settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_draws > 0, "max_draws must be greater than 0");
        ensure!(
            self.max_draws <= MAX_DRAWS_LIMIT,
            "max_draws {} exceeds the limit {}",
            self.max_draws,
            MAX_DRAWS_LIMIT
        );
        ensure!(self.max_cascades > 0, "max_cascades must be greater than 0");
        Ok(())
    }
}
// getters
impl CullingSettings {
    /// shadow view buffer 的容量
    #[inline]
    pub fn max_shadow_views(&self) -> u32 {
        self.max_spot_shadows + self.max_directional_lights * self.max_cascades
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings = CullingSettings::from_toml_str("max_draws = 1024\nmax_cascades = 2\n").unwrap();
        assert_eq!(settings.max_draws, 1024);
        assert_eq!(settings.max_cascades, 2);
        assert_eq!(settings.max_spot_shadows, CullingSettings::default().max_spot_shadows);
        assert_eq!(settings.max_shadow_views(), 8 + 2 * 2);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = CullingSettings::from_toml_str("max_draws = 0").unwrap_err();
        assert!(format!("{err:#}").contains("max_draws must be greater than 0"));

        let err = CullingSettings::from_toml_str("max_draws = 3000000000").unwrap_err();
        assert!(format!("{err:#}").contains("max_draws 3000000000 exceeds the limit 16777216"));

        assert!(CullingSettings::from_toml_str("max_draws = \"many\"").is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = CullingSettings::load(Path::new("/nonexistent/culling.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read culling settings"));
    }
}
