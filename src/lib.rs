//! Camera buffer allocation shim
//!
//! 相机 pipeline 与平台缓冲分配子系统之间的硬件抽象层:
//! 一侧是 fd 引用的 DMA 内存分配 (ION 风格), 另一侧是
//! dequeue/enqueue 协议的显示缓冲队列 (gralloc 风格).
//!
//! 组件划分:
//!
//! - [`DmaBufAllocator`]: 单个 fd 的页映射/解除映射
//! - [`GraphicBufferPool`]: 按槽位索引缓存 graphic buffer 对象
//! - [`QueueAllocator`]: 经由 vendor 缓冲队列 dequeue 并锁定缓冲区
//! - [`StreamLocker`]: 锁定已出队的流缓冲区并提取逐平面描述符
//!
//! 外部协作服务 (页映射原语, 缓冲队列, gralloc 锁服务) 以 trait
//! 形式消费, 由平台侧在进程初始化时绑定.

#![no_std]

pub use cambuf_api::*;
pub use cambuf_core::*;
