//! 外部协作服务接口
//!
//! 页映射原语, vendor 缓冲队列与 gralloc 锁服务的抽象边界.
//! 平台侧在进程初始化时提供实现; 本层只消费这些接口.

use alloc::sync::Arc;

use axerrno::AxResult;
use spin::Once;

use crate::handle::{BufferHandle, NativeHandle};
use crate::types::{GrallocUsage, LockRect, YCbCrLayout};

/// 页映射原语 (mmap/munmap 的抽象)
pub trait PageMapper: Send + Sync {
    /// 将 fd 指向的缓冲区映射进进程地址空间, None 表示失败
    fn map(&self, size: usize, fd: i32) -> Option<usize>;

    /// 解除映射, 失败返回 false
    fn unmap(&self, addr: usize, size: usize) -> bool;

    /// 关闭描述符
    fn close(&self, fd: i32);
}

/// Vendor 缓冲队列服务
///
/// 所有操作在 OS 层面原子. 队列被消费端废弃后, 每个操作都必须
/// 返回 `AxError::BrokenPipe`; 调用方据此立即放弃而非重试.
pub trait BufferQueue: Send + Sync {
    fn set_usage(&self, usage: GrallocUsage) -> AxResult<()>;

    fn set_buffer_count(&self, count: usize) -> AxResult<()>;

    fn set_buffers_geometry(&self, width: u32, height: u32, format: u32) -> AxResult<()>;

    /// 借出一个缓冲区, 返回 handle 与 stride
    fn dequeue_buffer(&self) -> AxResult<(BufferHandle, u32)>;

    /// 队列级锁定 (区别于 gralloc 像素锁)
    fn lock_buffer(&self, handle: &BufferHandle) -> AxResult<()>;

    /// 归还已填充的缓冲区给消费端
    fn enqueue_buffer(&self, handle: &BufferHandle) -> AxResult<()>;

    /// 未使用即归还
    fn cancel_buffer(&self, handle: &BufferHandle) -> AxResult<()>;

    fn min_undequeued_buffer_count(&self) -> AxResult<usize>;
}

/// Gralloc 锁服务
///
/// 锁定期间平面地址归服务所有, 本层不负责解除映射.
pub trait GrallocHal: Send + Sync {
    /// 单平面锁定, 返回 CPU 地址
    fn lock(
        &self,
        handle: &dyn NativeHandle,
        usage: GrallocUsage,
        rect: LockRect,
    ) -> AxResult<usize>;

    /// 平面格式锁定, 返回逐平面地址布局
    fn lock_ycbcr(
        &self,
        handle: &dyn NativeHandle,
        usage: GrallocUsage,
        rect: LockRect,
    ) -> AxResult<YCbCrLayout>;

    fn unlock(&self, handle: &dyn NativeHandle) -> AxResult<()>;
}

/// 绑定到 stream locker 的输出流描述
pub trait StreamOps: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn usage(&self) -> GrallocUsage;
    fn format(&self) -> u32;
}

/// 进程级共享的 gralloc 服务句柄, 进程生命周期内不释放
static GRALLOC_HAL: Once<Arc<dyn GrallocHal>> = Once::new();

/// 安装进程级 gralloc 服务
///
/// 只允许初始化一次; 已安装时忽略新句柄并返回 false.
pub fn set_gralloc_hal(hal: Arc<dyn GrallocHal>) -> bool {
    let mut installed = false;
    GRALLOC_HAL.call_once(|| {
        installed = true;
        hal
    });
    if !installed {
        warn!("gralloc service already installed, ignoring new handle");
    }
    installed
}

/// 获取进程级 gralloc 服务
pub fn gralloc_hal() -> Option<Arc<dyn GrallocHal>> {
    GRALLOC_HAL.get().cloned()
}
