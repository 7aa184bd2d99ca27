use std::collections::HashMap;

use ash::vk;

use crate::commands::barrier::has_write_access;
use crate::handles::GfxBufferHandle;

/// 跟踪还没有被 barrier 保护的写操作
///
/// 粒度是整个 buffer。一个命令访问（读或写）了一个被之前的命令写过、
/// 且中间没有 src access 带写 bit 的 barrier 的 buffer，就是一次 hazard。
#[derive(Default)]
pub struct SoftHazardTracker {
    /// buffer -> 最后一次未同步写入它的命令
    pending_writes: HashMap<GfxBufferHandle, String>,
}

impl SoftHazardTracker {
    /// 检查命令对 buffer 的访问，发生 hazard 时 panic
    pub fn check_access(&self, buffer: GfxBufferHandle, buffer_name: &str, command: &str) {
        if let Some(writer) = self.pending_writes.get(&buffer) {
            panic!("missing barrier: <{command}> accesses buffer <{buffer_name}> written by <{writer}>");
        }
    }

    #[inline]
    pub fn record_write(&mut self, buffer: GfxBufferHandle, command: &str) {
        self.pending_writes.insert(buffer, command.to_string());
    }

    /// barrier 的 src access 带写 bit 时，之前的写入对后续命令可见
    #[inline]
    pub fn apply_barrier(&mut self, buffer: GfxBufferHandle, src_access: vk::AccessFlags2) {
        if has_write_access(src_access) {
            self.pending_writes.remove(&buffer);
        }
    }

    /// 提交结束时等待队列空闲，所有写入都已可见
    #[inline]
    pub fn flush(&mut self) {
        self.pending_writes.clear();
    }

    #[inline]
    pub fn forget(&mut self, buffer: GfxBufferHandle) {
        self.pending_writes.remove(&buffer);
    }
}
