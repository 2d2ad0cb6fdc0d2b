//! 缓冲分配 shim 基础层
//!
//! 共享数据结构, 错误类型, native handle 模型与外部协作服务接口.
//! 具体的分配器组件在 `cambuf-api` 中实现.

#![no_std]

extern crate alloc;

#[macro_use]
extern crate log;

mod error;
mod handle;
mod services;
mod sync;
mod time;
mod types;

pub use error::{ShimError, ShimResult};
pub use handle::{BufferHandle, GraphicBuffer, NativeHandle, PrivateHandle};
pub use services::{
    gralloc_hal, set_gralloc_hal, BufferQueue, GrallocHal, PageMapper, StreamOps,
};
pub use sync::{StreamMutex, Unlocked};
pub use time::{OpTimer, TickSource, SERVICE_WARN_DURATION_US};
pub use types::{
    BufferGeometry, GrallocUsage, LockRect, PixelFormat, YCbCrLayout, MAX_FRAME_SLOTS, MAX_PLANES,
};
