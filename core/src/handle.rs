//! Native handle 与缓冲区对象

use alloc::sync::Arc;

use downcast_rs::{impl_downcast, DowncastSync};

use crate::types::{BufferGeometry, GrallocUsage, MAX_PLANES};

/// 缓冲队列服务流转的不透明 native handle
///
/// 具体类型在服务边界处降级为 [`PrivateHandle`] 一次性校验,
/// 之后不再信任动态类型.
pub trait NativeHandle: DowncastSync + core::fmt::Debug {
    /// 有效的平面 fd 数量
    fn fd_count(&self) -> usize;
}
impl_downcast!(sync NativeHandle);

/// 共享缓冲区句柄
///
/// dequeue 借出, enqueue/cancel 归还; 本层从不持有所有权.
pub type BufferHandle = Arc<dyn NativeHandle>;

/// 私有缓冲区元数据
///
/// 逐平面 fd (未使用的为 -1), 映射基地址与几何信息.
#[derive(Debug, Clone)]
pub struct PrivateHandle {
    pub fds: [i32; MAX_PLANES],
    /// 映射基地址, 0 表示未映射
    pub base: usize,
    pub offset: usize,
    /// 缓冲区字节大小
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: u32,
    pub usage: GrallocUsage,
}

impl PrivateHandle {
    /// 单平面缓冲区的元数据
    pub fn single_plane(fd: i32, base: usize, size: usize, geometry: &BufferGeometry) -> Self {
        Self {
            fds: [fd, -1, -1],
            base,
            offset: 0,
            size,
            width: geometry.width,
            height: geometry.height,
            stride: geometry.stride,
            format: geometry.format,
            usage: geometry.usage,
        }
    }

    pub fn plane_fds(&self) -> [i32; MAX_PLANES] {
        self.fds
    }
}

impl NativeHandle for PrivateHandle {
    fn fd_count(&self) -> usize {
        self.fds.iter().filter(|fd| **fd >= 0).count()
    }
}

/// Graphic buffer 对象
///
/// 包装私有元数据, 由池分配器按槽位缓存复用.
#[derive(Debug, Clone)]
pub struct GraphicBuffer {
    width: u32,
    height: u32,
    stride: u32,
    format: u32,
    usage: GrallocUsage,
    handle: Arc<PrivateHandle>,
}

impl GraphicBuffer {
    /// 以元数据自身携带的几何信息构造 buffer 对象
    pub fn wrap(handle: Arc<PrivateHandle>) -> Self {
        Self {
            width: handle.width,
            height: handle.height,
            stride: handle.stride,
            format: handle.format,
            usage: handle.usage,
            handle,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> u32 {
        self.format
    }

    pub fn usage(&self) -> GrallocUsage {
        self.usage
    }

    pub fn private_handle(&self) -> &Arc<PrivateHandle> {
        &self.handle
    }
}
