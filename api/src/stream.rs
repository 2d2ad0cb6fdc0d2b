//! 输出流缓冲区锁定
//!
//! 针对已出队的流缓冲区: 按像素格式选择 lock 或 lock_ycbcr,
//! 成功后按平面数提取逐平面描述符.

use alloc::sync::Arc;

use cambuf_core::{
    gralloc_hal, BufferHandle, GrallocHal, LockRect, OpTimer, PixelFormat, PrivateHandle,
    ShimError, ShimResult, StreamOps, TickSource, YCbCrLayout, MAX_PLANES,
};

use crate::plane::fill_by_count;

/// 锁定已出队的流缓冲区并提取逐平面描述符
pub struct StreamLocker {
    stream: Option<Arc<dyn StreamOps>>,
    gralloc: Option<Arc<dyn GrallocHal>>,
    clock: Option<Arc<dyn TickSource>>,
}

impl StreamLocker {
    /// 使用进程级 gralloc 服务创建
    pub fn new() -> Self {
        let gralloc = gralloc_hal();
        if gralloc.is_none() {
            error!("loading gralloc service failed");
        }
        Self {
            stream: None,
            gralloc,
            clock: None,
        }
    }

    /// 注入指定的 gralloc 服务
    pub fn with_gralloc(gralloc: Arc<dyn GrallocHal>) -> Self {
        Self {
            stream: None,
            gralloc: Some(gralloc),
            clock: None,
        }
    }

    /// 绑定输出流描述
    pub fn set_stream(&mut self, stream: Arc<dyn StreamOps>) {
        self.stream = Some(stream);
    }

    pub fn stream(&self) -> Option<&Arc<dyn StreamOps>> {
        self.stream.as_ref()
    }

    /// 绑定时钟源, 开启锁定耗时观测
    pub fn set_tick_source(&mut self, clock: Arc<dyn TickSource>) {
        self.clock = Some(clock);
    }

    /// 锁定缓冲区, 成功后填充输出数组并置位 `is_locked`
    ///
    /// 单平面 RGB/RAW/BLOB/打包 YCbCr 族走普通 lock; 其余格式
    /// 或多平面一律走 lock_ycbcr. 失败时 `is_locked` 不变.
    pub fn lock(
        &self,
        handle: Option<&BufferHandle>,
        fds: &mut [i32; MAX_PLANES],
        addrs: &mut [usize; MAX_PLANES],
        is_locked: &mut bool,
        plane_count: usize,
    ) -> ShimResult<()> {
        let Some(handle) = handle else {
            error!("lock: buffer handle equals null");
            return Err(ShimError::InvalidOperation);
        };
        let Some(stream) = self.stream.as_ref() else {
            error!("lock: stream is not bound");
            return Err(ShimError::InvalidOperation);
        };
        let gralloc = self.gralloc.as_ref().ok_or_else(|| {
            error!("gralloc service is not available");
            ShimError::InvalidOperation
        })?;

        let usage = stream.usage();
        let format = stream.format();
        let rect = LockRect::with_size(stream.width(), stream.height());

        let mut layout = YCbCrLayout::default();
        let mut planar_addr = 0;

        let single_packed =
            PixelFormat::try_from(format).is_ok_and(|f| f.is_single_plane_packed());

        let timer = OpTimer::start(self.clock.as_deref());
        let locked = if single_packed && plane_count == 1 {
            gralloc
                .lock(handle.as_ref(), usage, rect)
                .map(|addr| planar_addr = addr)
        } else {
            gralloc
                .lock_ycbcr(handle.as_ref(), usage, rect)
                .map(|l| layout = l)
        };
        timer.warn_if_slow("gralloc lock");

        if let Err(e) = locked {
            error!("gralloc lock failed ({:?}), format={:#x}", e, format);
            return Err(ShimError::InvalidOperation);
        }

        let private = handle
            .clone()
            .downcast_arc::<PrivateHandle>()
            .map_err(|_| {
                error!("lock: buffer handle is not a private handle");
                ShimError::InvalidOperation
            })?;

        fill_by_count(
            plane_count,
            private.plane_fds(),
            &layout,
            planar_addr,
            fds,
            addrs,
        );
        *is_locked = true;
        Ok(())
    }
}

impl Default for StreamLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use axerrno::{AxError, AxResult};
    use cambuf_core::{BufferGeometry, GrallocUsage, NativeHandle};
    use core::sync::atomic::{AtomicUsize, Ordering};
    use spin::Mutex;

    struct FixedStream {
        format: u32,
    }

    impl StreamOps for FixedStream {
        fn width(&self) -> u32 {
            1280
        }

        fn height(&self) -> u32 {
            720
        }

        fn usage(&self) -> GrallocUsage {
            GrallocUsage::LOCK_FOR_CAMERA
        }

        fn format(&self) -> u32 {
            self.format
        }
    }

    #[derive(Default)]
    struct MockGralloc {
        layout: YCbCrLayout,
        planar_addr: usize,
        fail_lock: bool,
        lock_calls: AtomicUsize,
        lock_ycbcr_calls: AtomicUsize,
        rects: Mutex<Vec<LockRect>>,
    }

    impl GrallocHal for MockGralloc {
        fn lock(
            &self,
            _handle: &dyn NativeHandle,
            _usage: GrallocUsage,
            rect: LockRect,
        ) -> AxResult<usize> {
            self.lock_calls.fetch_add(1, Ordering::Relaxed);
            self.rects.lock().push(rect);
            if self.fail_lock {
                Err(AxError::Unsupported)
            } else {
                Ok(self.planar_addr)
            }
        }

        fn lock_ycbcr(
            &self,
            _handle: &dyn NativeHandle,
            _usage: GrallocUsage,
            rect: LockRect,
        ) -> AxResult<YCbCrLayout> {
            self.lock_ycbcr_calls.fetch_add(1, Ordering::Relaxed);
            self.rects.lock().push(rect);
            if self.fail_lock {
                Err(AxError::Unsupported)
            } else {
                Ok(self.layout)
            }
        }

        fn unlock(&self, _handle: &dyn NativeHandle) -> AxResult<()> {
            Ok(())
        }
    }

    fn handle_with_fds(fds: [i32; MAX_PLANES]) -> BufferHandle {
        let geometry = BufferGeometry {
            width: 1280,
            height: 720,
            stride: 1280,
            format: PixelFormat::Yv12M as u32,
            usage: GrallocUsage::USAGE_FOR_CAMERA,
        };
        let mut handle = PrivateHandle::single_plane(fds[0], 0, 0x10_0000, &geometry);
        handle.fds = fds;
        Arc::new(handle)
    }

    fn locker(gralloc: Arc<MockGralloc>, format: PixelFormat) -> StreamLocker {
        let mut locker = StreamLocker::with_gralloc(gralloc);
        locker.set_stream(Arc::new(FixedStream {
            format: format as u32,
        }));
        locker
    }

    fn sample_layout() -> YCbCrLayout {
        YCbCrLayout {
            y: 0x1000,
            cb: 0x2000,
            cr: 0x3000,
            y_stride: 1280,
            c_stride: 640,
            chroma_step: 1,
        }
    }

    #[test]
    fn missing_handle_is_rejected() {
        let gralloc = Arc::new(MockGralloc::default());
        let locker = locker(gralloc, PixelFormat::Rgb565);

        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        let ret = locker.lock(None, &mut fds, &mut addrs, &mut is_locked, 1);

        assert_eq!(ret.unwrap_err(), ShimError::InvalidOperation);
        assert!(!is_locked);
    }

    #[test]
    fn unbound_stream_is_rejected() {
        let gralloc = Arc::new(MockGralloc::default());
        let locker = StreamLocker::with_gralloc(gralloc);

        let handle = handle_with_fds([10, -1, -1]);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        let ret = locker.lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 1);

        assert_eq!(ret.unwrap_err(), ShimError::InvalidOperation);
    }

    #[test]
    fn packed_single_plane_uses_generic_lock() {
        let gralloc = Arc::new(MockGralloc {
            planar_addr: 0x8000,
            ..MockGralloc::default()
        });
        let locker = locker(gralloc.clone(), PixelFormat::Rgb565);

        let handle = handle_with_fds([10, -1, -1]);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        locker
            .lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 1)
            .unwrap();

        assert_eq!(gralloc.lock_calls.load(Ordering::Relaxed), 1);
        assert_eq!(gralloc.lock_ycbcr_calls.load(Ordering::Relaxed), 0);
        assert_eq!(fds[0], 10);
        assert_eq!(addrs[0], 0x8000);
        assert!(is_locked);

        // 锁定区域来自绑定的流几何
        let rect = gralloc.rects.lock()[0];
        assert_eq!((rect.width, rect.height), (1280, 720));
    }

    #[test]
    fn packed_format_with_multiple_planes_uses_ycbcr_lock() {
        let gralloc = Arc::new(MockGralloc {
            layout: sample_layout(),
            ..MockGralloc::default()
        });
        let locker = locker(gralloc.clone(), PixelFormat::Rgb565);

        let handle = handle_with_fds([10, 11, 12]);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        locker
            .lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 2)
            .unwrap();

        assert_eq!(gralloc.lock_calls.load(Ordering::Relaxed), 0);
        assert_eq!(gralloc.lock_ycbcr_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn planar_format_fills_by_plane_count() {
        let gralloc = Arc::new(MockGralloc {
            layout: sample_layout(),
            ..MockGralloc::default()
        });
        let locker = locker(gralloc.clone(), PixelFormat::Yv12M);

        let handle = handle_with_fds([10, 11, 12]);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        locker
            .lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 3)
            .unwrap();

        assert_eq!(gralloc.lock_ycbcr_calls.load(Ordering::Relaxed), 1);
        assert_eq!(fds, [10, 11, 12]);
        assert_eq!(addrs, [0x1000, 0x2000, 0x3000]);
        assert!(is_locked);
    }

    #[test]
    fn unknown_format_code_falls_back_to_ycbcr_lock() {
        let gralloc = Arc::new(MockGralloc {
            layout: sample_layout(),
            ..MockGralloc::default()
        });
        let mut locker = StreamLocker::with_gralloc(gralloc.clone());
        locker.set_stream(Arc::new(FixedStream { format: 0x777 }));

        let handle = handle_with_fds([10, -1, -1]);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        locker
            .lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 1)
            .unwrap();

        assert_eq!(gralloc.lock_ycbcr_calls.load(Ordering::Relaxed), 1);
        assert_eq!(addrs[0], 0x1000);
    }

    #[test]
    fn lock_failure_leaves_is_locked_clear() {
        let gralloc = Arc::new(MockGralloc {
            fail_lock: true,
            ..MockGralloc::default()
        });
        let locker = locker(gralloc, PixelFormat::Yv12M);

        let handle = handle_with_fds([10, 11, 12]);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        let ret = locker.lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 3);

        assert_eq!(ret.unwrap_err(), ShimError::InvalidOperation);
        assert!(!is_locked);
        assert_eq!(fds, [-1; MAX_PLANES]);
        assert_eq!(addrs, [0; MAX_PLANES]);
    }

    #[test]
    fn foreign_handle_fails_downcast() {
        #[derive(Debug)]
        struct AlienHandle;

        impl NativeHandle for AlienHandle {
            fn fd_count(&self) -> usize {
                0
            }
        }

        let gralloc = Arc::new(MockGralloc {
            layout: sample_layout(),
            ..MockGralloc::default()
        });
        let locker = locker(gralloc, PixelFormat::Yv12M);

        let handle: BufferHandle = Arc::new(AlienHandle);
        let mut fds = [-1; MAX_PLANES];
        let mut addrs = [0; MAX_PLANES];
        let mut is_locked = false;
        let ret = locker.lock(Some(&handle), &mut fds, &mut addrs, &mut is_locked, 3);

        assert_eq!(ret.unwrap_err(), ShimError::InvalidOperation);
        assert!(!is_locked);
    }
}
