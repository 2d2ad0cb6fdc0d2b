//! 队列后端 gralloc 分配器
//!
//! 协调 vendor 缓冲队列与 gralloc 锁服务: dequeue 一个缓冲区,
//! 为 CPU 访问加像素锁, 按像素格式提取逐平面描述符, 并提供
//! enqueue/cancel 把控制权交还队列.

use alloc::sync::Arc;

use axerrno::AxError;
use cambuf_core::{
    gralloc_hal, BufferHandle, BufferQueue, GrallocHal, GrallocUsage, LockRect, OpTimer,
    PixelFormat, PrivateHandle, ShimError, ShimResult, StreamMutex, TickSource, Unlocked,
    YCbCrLayout, MAX_PLANES,
};

use crate::plane::fill_by_format;

/// dequeue 瞬时失败的最大重试次数
pub const DEQUEUE_RETRY_LIMIT: usize = 5;

/// 经由缓冲队列分配预览缓冲区的分配器
///
/// 队列的所有变更操作由调用方经单个 [`StreamMutex`] 串行化;
/// 阻塞的服务调用期间该锁被临时让出.
pub struct QueueAllocator {
    queue: Option<Arc<dyn BufferQueue>>,
    gralloc: Option<Arc<dyn GrallocHal>>,
    usage: GrallocUsage,
    format: u32,
    width: u32,
    height: u32,
    min_undequeued_margin: usize,
    clock: Option<Arc<dyn TickSource>>,
}

impl QueueAllocator {
    /// 使用进程级 gralloc 服务创建
    pub fn new() -> Self {
        let gralloc = gralloc_hal();
        if gralloc.is_none() {
            error!("loading gralloc service failed");
        }
        Self::with_optional_gralloc(gralloc)
    }

    /// 注入指定的 gralloc 服务
    pub fn with_gralloc(gralloc: Arc<dyn GrallocHal>) -> Self {
        Self::with_optional_gralloc(Some(gralloc))
    }

    fn with_optional_gralloc(gralloc: Option<Arc<dyn GrallocHal>>) -> Self {
        Self {
            queue: None,
            gralloc,
            usage: GrallocUsage::USAGE_FOR_CAMERA,
            format: 0,
            width: 0,
            height: 0,
            min_undequeued_margin: 0,
            clock: None,
        }
    }

    /// 绑定时钟源, 开启服务调用耗时观测
    pub fn set_tick_source(&mut self, clock: Arc<dyn TickSource>) {
        self.clock = Some(clock);
    }

    /// 绑定缓冲队列并完成初始配置
    ///
    /// 负的未出队余量按 0 处理.
    pub fn init(
        &mut self,
        queue: Arc<dyn BufferQueue>,
        buffer_count: usize,
        min_undequeued_margin: isize,
        usage: GrallocUsage,
    ) -> ShimResult<()> {
        self.queue = Some(queue);
        self.min_undequeued_margin = min_undequeued_margin.max(0) as usize;

        self.set_buffer_count(buffer_count)?;

        let queue = self.bound_queue()?;
        if queue.set_usage(usage).is_err() {
            error!("init: set_usage failed");
            return Err(ShimError::InvalidOperation);
        }
        self.usage = usage;
        self.format = 0;

        if self.gralloc.is_none() {
            self.gralloc = gralloc_hal();
            if self.gralloc.is_none() {
                error!("loading gralloc service failed");
            }
        }
        Ok(())
    }

    fn bound_queue(&self) -> ShimResult<&Arc<dyn BufferQueue>> {
        self.queue.as_ref().ok_or_else(|| {
            error!("buffer queue is not bound");
            ShimError::InvalidOperation
        })
    }

    fn bound_gralloc(&self) -> ShimResult<&Arc<dyn GrallocHal>> {
        self.gralloc.as_ref().ok_or_else(|| {
            error!("gralloc service is not available");
            ShimError::InvalidOperation
        })
    }

    pub fn set_buffer_count(&self, count: usize) -> ShimResult<()> {
        let queue = self.bound_queue()?;
        if queue.set_buffer_count(count).is_err() {
            error!("set_buffer_count failed, count={}", count);
            return Err(ShimError::InvalidOperation);
        }
        Ok(())
    }

    /// 配置队列缓冲区几何并记录像素格式用于平面提取
    pub fn set_buffers_geometry(&mut self, width: u32, height: u32, format: u32) -> ShimResult<()> {
        let queue = self.bound_queue()?;
        if queue.set_buffers_geometry(width, height, format).is_err() {
            error!("set_buffers_geometry failed");
            return Err(ShimError::InvalidOperation);
        }
        self.width = width;
        self.height = height;
        self.format = format;
        Ok(())
    }

    pub fn usage(&self) -> GrallocUsage {
        self.usage
    }

    pub fn queue(&self) -> Option<&Arc<dyn BufferQueue>> {
        self.queue.as_ref()
    }

    /// 服务要求的最小未出队缓冲数, 低于 2 时叠加配置的余量
    pub fn min_undequeued_buffer_count(&self) -> ShimResult<usize> {
        let queue = self.bound_queue()?;
        let count = queue.min_undequeued_buffer_count().map_err(|e| {
            error!("min_undequeued_buffer_count failed: {:?}", e);
            ShimError::InvalidOperation
        })?;
        Ok(if count < 2 {
            count + self.min_undequeued_margin
        } else {
            count
        })
    }

    /// dequeue 并锁定一个缓冲区, 填充逐平面 fd 与地址
    ///
    /// 瞬时的 dequeue 失败最多重试 [`DEQUEUE_RETRY_LIMIT`] 次;
    /// 队列废弃立即失败不再重试. 像素锁失败时把缓冲区 cancel
    /// 回队列. 失败时不保证输出数组已填充.
    pub fn alloc(
        &self,
        fds: &mut [i32; MAX_PLANES],
        addrs: &mut [usize; MAX_PLANES],
        stride: &mut u32,
        is_locked: &mut bool,
    ) -> ShimResult<BufferHandle> {
        let queue = self.bound_queue()?;
        let clock = self.clock.as_deref();

        let mut acquired = None;
        let mut layout = YCbCrLayout::default();
        let mut last_err = ShimError::InvalidOperation;

        for retry in (1..=DEQUEUE_RETRY_LIMIT).rev() {
            let timer = OpTimer::start(clock);
            let dequeued = queue.dequeue_buffer();
            timer.warn_if_slow("dequeue_buffer");

            let (handle, buf_stride) = match dequeued {
                Err(AxError::BrokenPipe) => {
                    warn!("buffer queue is abandoned");
                    return Err(ShimError::QueueAbandoned);
                }
                Err(e) => {
                    error!("dequeue_buffer failed ({:?}), retry({})", e, retry);
                    last_err = ShimError::InvalidOperation;
                    continue;
                }
                Ok(pair) => pair,
            };

            let timer = OpTimer::start(clock);
            if let Err(e) = queue.lock_buffer(&handle) {
                error!("lock_buffer failed ({:?}), but go on to the next step", e);
            }
            timer.warn_if_slow("lock_buffer");

            if !*is_locked {
                let gralloc = self.bound_gralloc()?;
                let rect = LockRect::with_size(self.width, self.height);

                let timer = OpTimer::start(clock);
                let locked =
                    gralloc.lock_ycbcr(handle.as_ref(), GrallocUsage::LOCK_FOR_CAMERA, rect);
                timer.warn_if_slow("lock_ycbcr");

                match locked {
                    Ok(l) => {
                        layout = l;
                        *is_locked = true;
                    }
                    Err(e) => {
                        error!("lock_ycbcr failed ({:?})", e);
                        if queue.cancel_buffer(&handle).is_err() {
                            error!("cancel_buffer failed");
                        }
                        return Err(ShimError::InvalidOperation);
                    }
                }
            }

            acquired = Some((handle, buf_stride));
            break;
        }

        let (handle, buf_stride) = acquired.ok_or(last_err)?;

        let private = handle
            .clone()
            .downcast_arc::<PrivateHandle>()
            .map_err(|_| {
                error!("dequeued handle is not a private handle");
                ShimError::InvalidOperation
            })?;

        let format = PixelFormat::try_from(self.format)
            .unwrap_or_else(|_| panic!("invalid pixel format {:#x}", self.format));
        fill_by_format(format, private.plane_fds(), &layout, fds, addrs);

        *stride = buf_stride;
        Ok(handle)
    }

    /// 在让出外部锁的前提下执行 [`Self::alloc`]
    pub fn dequeue_buffer(
        &self,
        fds: &mut [i32; MAX_PLANES],
        addrs: &mut [usize; MAX_PLANES],
        is_locked: &mut bool,
        lock: &dyn StreamMutex,
    ) -> ShimResult<BufferHandle> {
        let mut stride = 0;
        let ret = {
            let _unlocked = Unlocked::enter(lock);
            self.alloc(fds, addrs, &mut stride, is_locked)
        };
        match ret {
            Err(ShimError::QueueAbandoned) => {
                warn!("buffer queue is abandoned");
                Err(ShimError::QueueAbandoned)
            }
            Err(e) => {
                error!("alloc failed: {}", e);
                Err(ShimError::InvalidOperation)
            }
            Ok(handle) => Ok(handle),
        }
    }

    /// 归还已填充的缓冲区; 阻塞期间让出外部锁
    pub fn enqueue_buffer(&self, handle: &BufferHandle, lock: &dyn StreamMutex) -> ShimResult<()> {
        let queue = self.bound_queue()?;

        let timer = OpTimer::start(self.clock.as_deref());
        let ret = {
            let _unlocked = Unlocked::enter(lock);
            queue.enqueue_buffer(handle)
        };
        timer.warn_if_slow("enqueue_buffer");

        if let Err(e) = ret {
            error!("enqueue_buffer failed: {:?}", e);
            return Err(ShimError::InvalidOperation);
        }
        Ok(())
    }

    /// 未使用即归还; 先解除像素锁, 阻塞期间让出外部锁
    pub fn cancel_buffer(&self, handle: &BufferHandle, lock: &dyn StreamMutex) -> ShimResult<()> {
        let queue = self.bound_queue()?;
        let gralloc = self.bound_gralloc()?;

        if let Err(e) = gralloc.unlock(handle.as_ref()) {
            error!("gralloc unlock failed: {:?}", e);
            return Err(ShimError::InvalidOperation);
        }

        let timer = OpTimer::start(self.clock.as_deref());
        let ret = {
            let _unlocked = Unlocked::enter(lock);
            queue.cancel_buffer(handle)
        };
        timer.warn_if_slow("cancel_buffer");

        if let Err(e) = ret {
            error!("cancel_buffer failed: {:?}", e);
            return Err(ShimError::InvalidOperation);
        }
        Ok(())
    }
}

impl Default for QueueAllocator {
    fn default() -> Self {
        Self::new()
    }
}
