//! Pass 定义和构建器
//!
//! Pass 由 `RenderGraphBuilder::add_pass` 创建：setup 闭包通过 `RgPassBuilder`
//! 声明资源依赖并返回 Pass 自己的数据，execute 闭包在执行阶段拿到这份数据。

use std::fmt;

use slotmap::SecondaryMap;

use sieve_gfx::basic::color::LabelColor;
use sieve_gfx::commands::command_buffer::GfxCommandBuffer;
use sieve_gfx::handles::{GfxBufferHandle, GfxImageHandle};

use crate::buffer_resource::{RgBufferDesc, RgBufferResource};
use crate::executor::RgPassExecutor;
use crate::image_resource::{RgImageDesc, RgImageResource};
use crate::resource_handle::{RgBufferHandle, RgBufferId, RgImageHandle, RgImageId};
use crate::resource_registry::RgResourceRegistry;
use crate::resource_state::{RgBufferState, RgImageState};

/// Pass 的类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassKind {
    Compute,
    Graphics,
    Copy,
    Resolve,
}

impl RgPassKind {
    #[inline]
    pub fn label_color(self) -> [f32; 4] {
        match self {
            Self::Compute => LabelColor::COLOR_COMPUTE,
            Self::Graphics => LabelColor::COLOR_PASS,
            Self::Copy | Self::Resolve => LabelColor::COLOR_COPY,
        }
    }
}

impl fmt::Display for RgPassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compute => "compute",
            Self::Graphics => "graphics",
            Self::Copy => "copy",
            Self::Resolve => "resolve",
        };
        f.write_str(name)
    }
}

/// Pass 执行时的上下文
///
/// 提供命令缓冲区以及虚拟句柄到物理资源的映射。
pub struct RgPassContext<'a> {
    pub cmd: &'a GfxCommandBuffer,

    pub(crate) pass_name: &'a str,
    pub(crate) buffer_handles: &'a SecondaryMap<RgBufferId, GfxBufferHandle>,
    pub(crate) image_handles: &'a SecondaryMap<RgImageId, GfxImageHandle>,
}

impl RgPassContext<'_> {
    /// 获取缓冲区的物理句柄
    #[inline]
    pub fn buffer(&self, handle: RgBufferHandle) -> GfxBufferHandle {
        *self
            .buffer_handles
            .get(handle.id)
            .unwrap_or_else(|| panic!("[{}] buffer {:?} is not part of this graph", self.pass_name, handle))
    }

    /// 获取图像的物理句柄
    #[inline]
    pub fn image(&self, handle: RgImageHandle) -> GfxImageHandle {
        *self
            .image_handles
            .get(handle.id)
            .unwrap_or_else(|| panic!("[{}] image {:?} is not part of this graph", self.pass_name, handle))
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }
}

/// Pass 构建器
///
/// 在 setup 闭包中使用，声明 Pass 的资源依赖。读写都需要持有资源的当前版本，
/// 写入后返回新版本的句柄。
pub struct RgPassBuilder<'r> {
    pub(crate) name: String,

    pub(crate) image_reads: Vec<(RgImageHandle, RgImageState)>,
    pub(crate) image_writes: Vec<(RgImageHandle, RgImageState)>,
    pub(crate) buffer_reads: Vec<(RgBufferHandle, RgBufferState)>,
    pub(crate) buffer_writes: Vec<(RgBufferHandle, RgBufferState)>,

    /// 资源注册表引用（用于版本校验和创建临时资源）
    pub(crate) resources: &'r mut RgResourceRegistry,
}

impl<'r> RgPassBuilder<'r> {
    pub(crate) fn new(name: String, resources: &'r mut RgResourceRegistry) -> Self {
        Self {
            name,
            image_reads: Vec::new(),
            image_writes: Vec::new(),
            buffer_reads: Vec::new(),
            buffer_writes: Vec::new(),
            resources,
        }
    }

    /// 声明读取缓冲区
    ///
    /// # Panics
    /// - 句柄不是当前版本
    /// - 读取一个还没有被任何 Pass 写入过的临时缓冲区
    pub fn read_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        let resource = self.resources.checked_buffer_mut(handle, &self.name);
        if resource.is_transient() && resource.version == 0 {
            panic!("[{}] reads transient buffer <{}> before any pass writes it", self.name, resource.name);
        }
        self.buffer_reads.push((handle, state));
        handle
    }

    /// 声明写入缓冲区，返回新版本的句柄
    pub fn write_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        let resource = self.resources.checked_buffer_mut(handle, &self.name);
        resource.version += 1;
        self.buffer_writes.push((handle, state));
        handle.next_version()
    }

    /// 声明读写缓冲区（同时读取和写入），例如原地排序
    ///
    /// Pass 独占该资源：排在上一次写入之后，状态不变时也会插入 hazard barrier
    pub fn read_write_buffer(&mut self, handle: RgBufferHandle, state: RgBufferState) -> RgBufferHandle {
        self.read_buffer(handle, state);
        self.write_buffer(handle, state)
    }

    /// 创建临时缓冲区，在执行阶段从 `RgTransientPool` 中分配
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgBufferHandle {
        self.resources.register_buffer(RgBufferResource::transient(name, desc))
    }

    /// 声明读取图像
    pub fn read_image(&mut self, handle: RgImageHandle, state: RgImageState) -> RgImageHandle {
        let resource = self.resources.checked_image_mut(handle, &self.name);
        if resource.is_transient() && resource.version == 0 {
            panic!("[{}] reads transient image <{}> before any pass writes it", self.name, resource.name);
        }
        self.image_reads.push((handle, state));
        handle
    }

    /// 声明写入图像，返回新版本的句柄
    pub fn write_image(&mut self, handle: RgImageHandle, state: RgImageState) -> RgImageHandle {
        let resource = self.resources.checked_image_mut(handle, &self.name);
        resource.version += 1;
        self.image_writes.push((handle, state));
        handle.next_version()
    }

    /// 创建临时图像
    pub fn create_image(&mut self, name: impl Into<String>, desc: RgImageDesc) -> RgImageHandle {
        self.resources.register_image(RgImageResource::transient(name, desc))
    }
}

/// Pass 节点数据（编译后使用）
pub struct RgPassNode<'a> {
    pub name: String,
    pub kind: RgPassKind,

    pub image_reads: Vec<(RgImageHandle, RgImageState)>,
    pub image_writes: Vec<(RgImageHandle, RgImageState)>,
    pub buffer_reads: Vec<(RgBufferHandle, RgBufferState)>,
    pub buffer_writes: Vec<(RgBufferHandle, RgBufferState)>,

    /// 执行回调，已经捕获了 setup 返回的数据
    pub(crate) executor: Box<dyn RgPassExecutor + 'a>,
}
