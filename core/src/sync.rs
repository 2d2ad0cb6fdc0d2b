//! 外部锁协作

/// 调用方持有的流互斥量
///
/// 进入本层的调用在持锁状态下发起. 阻塞的队列操作期间通过
/// [`Unlocked`] 临时让出, 让其他线程得以继续提交帧; 返回前
/// 必定重新取得, 保持调用方的加锁纪律.
pub trait StreamMutex {
    /// 重新取得锁
    fn acquire(&self);

    /// 让出锁
    fn release(&self);
}

/// 临时让出外部锁的 RAII guard
pub struct Unlocked<'a> {
    lock: &'a dyn StreamMutex,
}

impl<'a> Unlocked<'a> {
    /// 让出 `lock`, drop 时重新取得
    pub fn enter(lock: &'a dyn StreamMutex) -> Self {
        lock.release();
        Self { lock }
    }
}

impl Drop for Unlocked<'_> {
    fn drop(&mut self) {
        self.lock.acquire();
    }
}
