//! 相机缓冲区分配组件
//!
//! 四个相互独立的分配器, 共享 `cambuf-core` 的类型与服务接口:
//!
//! - [`DmaBufAllocator`]: 单个 fd 的页映射, 单发无重试
//! - [`GraphicBufferPool`]: 槽位索引的 graphic buffer 缓存池
//! - [`QueueAllocator`]: 缓冲队列 dequeue/lock/enqueue/cancel 协调
//! - [`StreamLocker`]: 已出队流缓冲区的像素锁定与平面提取

#![no_std]

extern crate alloc;

#[macro_use]
extern crate log;

mod dma;
mod plane;
mod pool;
mod queue;
mod stream;

pub use dma::DmaBufAllocator;
pub use plane::{fill_by_count, fill_by_format};
pub use pool::GraphicBufferPool;
pub use queue::{QueueAllocator, DEQUEUE_RETRY_LIMIT};
pub use stream::StreamLocker;
