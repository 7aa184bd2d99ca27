use std::fmt;

/// 光源的稳定标识，在光源存在期间保持不变
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u64);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "light#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// 每个 bucket 对应一组 draw call buffer，一帧中只有一条 cull -> sort -> grab 链写入
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisibilityBucket {
    Opaque,
    Transparent,
    Cascade { light: LightId, cascade: u32 },
    SpotShadow { light: LightId },
}

impl VisibilityBucket {
    /// 透明物体从远到近绘制，其余从近到远
    #[inline]
    pub fn sort_direction(&self) -> SortDirection {
        match self {
            Self::Transparent => SortDirection::Descending,
            _ => SortDirection::Ascending,
        }
    }

    #[inline]
    pub fn is_shadow(&self) -> bool {
        matches!(self, Self::Cascade { .. } | Self::SpotShadow { .. })
    }

    #[inline]
    pub fn light(&self) -> Option<LightId> {
        match self {
            Self::Cascade { light, .. } | Self::SpotShadow { light } => Some(*light),
            _ => None,
        }
    }
}

impl fmt::Display for VisibilityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque => f.write_str("opaque"),
            Self::Transparent => f.write_str("transparent"),
            Self::Cascade { light, cascade } => write!(f, "{light}-cascade{cascade}"),
            Self::SpotShadow { light } => write!(f, "{light}-spot"),
        }
    }
}
