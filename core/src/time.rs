//! 服务调用耗时观测

/// 单调时钟源, 微秒粒度
pub trait TickSource: Send + Sync {
    fn now_us(&self) -> u64;
}

/// 队列/gralloc 服务调用超过该时长时输出告警
pub const SERVICE_WARN_DURATION_US: u64 = 30_000;

/// 单次服务调用计时器
///
/// 未绑定时钟源时完全惰性, 不产生任何观测输出.
pub struct OpTimer<'a> {
    clock: Option<&'a dyn TickSource>,
    start: u64,
}

impl<'a> OpTimer<'a> {
    pub fn start(clock: Option<&'a dyn TickSource>) -> Self {
        let start = clock.map_or(0, |c| c.now_us());
        Self { clock, start }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.clock
            .map_or(0, |c| c.now_us().saturating_sub(self.start))
    }

    /// 耗时超限时告警, 仅观测不影响行为
    pub fn warn_if_slow(&self, what: &str) {
        let elapsed = self.elapsed_us();
        if elapsed > SERVICE_WARN_DURATION_US {
            warn!("{} duration {} us", what, elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    struct FakeClock {
        now: AtomicU64,
    }

    impl TickSource for FakeClock {
        fn now_us(&self) -> u64 {
            self.now.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn measures_elapsed_time() {
        let clock = FakeClock {
            now: AtomicU64::new(1_000),
        };
        let timer = OpTimer::start(Some(&clock));
        clock.now.store(43_000, Ordering::Relaxed);

        assert_eq!(timer.elapsed_us(), 42_000);
        // 超限路径只输出日志, 这里确认不会影响控制流
        timer.warn_if_slow("dequeue_buffer");
    }

    #[test]
    fn inert_without_clock() {
        let timer = OpTimer::start(None);
        assert_eq!(timer.elapsed_us(), 0);
        timer.warn_if_slow("enqueue_buffer");
    }
}
