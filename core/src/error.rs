//! 错误类型定义

use core::fmt;

use axerrno::AxError;

/// 缓冲分配 shim 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimError {
    /// 无效参数 (size/fd/空指针, 入口处拦截)
    InvalidArg,
    /// 页映射原语失败
    MapFailed,
    /// 解除映射原语失败
    UnmapFailed,
    /// 服务调用失败或返回了不一致的状态
    InvalidOperation,
    /// 缓冲队列已被废弃, 后续调用没有意义
    QueueAbandoned,
}

impl fmt::Display for ShimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => write!(f, "Invalid argument"),
            Self::MapFailed => write!(f, "Page mapping failed"),
            Self::UnmapFailed => write!(f, "Page unmapping failed"),
            Self::InvalidOperation => write!(f, "Invalid operation"),
            Self::QueueAbandoned => write!(f, "Buffer queue is abandoned"),
        }
    }
}

impl From<ShimError> for AxError {
    fn from(err: ShimError) -> Self {
        match err {
            ShimError::InvalidArg => AxError::InvalidInput,
            ShimError::MapFailed => AxError::NoMemory,
            ShimError::UnmapFailed => AxError::BadFileDescriptor,
            ShimError::InvalidOperation => AxError::Unsupported,
            ShimError::QueueAbandoned => AxError::BrokenPipe,
        }
    }
}

pub type ShimResult<T> = Result<T, ShimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_conversion() {
        assert_eq!(AxError::from(ShimError::InvalidArg), AxError::InvalidInput);
        assert_eq!(AxError::from(ShimError::QueueAbandoned), AxError::BrokenPipe);
        assert_eq!(AxError::from(ShimError::MapFailed), AxError::NoMemory);
    }
}
