//! 共享数据结构定义

use bitflags::bitflags;
use num_enum::TryFromPrimitive;

/// 每路视频流的最大缓冲槽位数
pub const MAX_FRAME_SLOTS: usize = 32;

/// 单个缓冲区最多的内存平面数
pub const MAX_PLANES: usize = 3;

/// HAL pixel format 代码
///
/// 标准格式之外包含 vendor 的多 fd (`*M`) 变体, 其平面各自持有
/// 独立的描述符.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum PixelFormat {
    Rgba8888 = 0x1,
    Rgbx8888 = 0x2,
    Rgb888 = 0x3,
    Rgb565 = 0x4,
    Bgra8888 = 0x5,
    /// 单 fd 半平面 YCrCb 4:2:0
    YCrCb420Sp = 0x11,
    /// 打包 YCbCr 4:2:2
    YCbCr422I = 0x14,
    Raw16 = 0x20,
    Blob = 0x21,
    RawOpaque = 0x24,
    Argb8888 = 0x100,
    /// 双 fd 半平面 YCbCr 4:2:0
    YCbCr420SpM = 0x105,
    /// 三 fd 平面 YV12
    Yv12M = 0x11C,
    /// 双 fd 半平面 YCrCb 4:2:0
    YCrCb420SpM = 0x11D,
    /// 双 fd 半平面 YCrCb 4:2:0, full range
    YCrCb420SpMFull = 0x11E,
    /// 单 fd 平面 YV12
    Yv12 = 0x3231_5659,
}

impl PixelFormat {
    /// 该格式的内存平面数
    pub fn plane_count(self) -> usize {
        match self {
            Self::Yv12M => 3,
            Self::YCbCr420SpM | Self::YCrCb420SpM | Self::YCrCb420SpMFull => 2,
            _ => 1,
        }
    }

    /// 是否属于单平面 RGB/RAW/BLOB/打包 YCbCr 族
    ///
    /// 这些格式配合 plane_count == 1 时走普通 lock 而非 lock_ycbcr.
    pub fn is_single_plane_packed(self) -> bool {
        matches!(
            self,
            Self::Rgba8888
                | Self::Rgbx8888
                | Self::Rgb888
                | Self::Rgb565
                | Self::Bgra8888
                | Self::Raw16
                | Self::Blob
                | Self::RawOpaque
                | Self::Argb8888
                | Self::YCbCr422I
        )
    }
}

bitflags! {
    /// Gralloc usage 掩码
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GrallocUsage: u32 {
        const SW_READ_OFTEN = 0x3;
        const SW_WRITE_OFTEN = 0x30;
        const HW_TEXTURE = 0x100;
        const HW_COMPOSER = 0x800;
        const EXTERNAL_DISP = 0x2000;
    }
}

impl GrallocUsage {
    /// 相机输出缓冲区的默认 usage
    pub const USAGE_FOR_CAMERA: Self = Self::SW_READ_OFTEN
        .union(Self::SW_WRITE_OFTEN)
        .union(Self::HW_TEXTURE)
        .union(Self::HW_COMPOSER)
        .union(Self::EXTERNAL_DISP);

    /// CPU 像素锁定相机缓冲区的 usage
    pub const LOCK_FOR_CAMERA: Self = Self::SW_READ_OFTEN.union(Self::SW_WRITE_OFTEN);
}

/// 缓冲区几何与用途配置
///
/// 各字段通过 setter 单独设置, 到分配时才做整体校验.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferGeometry {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// 原始 pixel format 代码, 0 表示未配置
    pub format: u32,
    pub usage: GrallocUsage,
}

impl BufferGeometry {
    /// 分配前所有字段必须就绪
    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.format != 0
            && !self.usage.is_empty()
            && self.stride > 0
    }
}

/// lock_ycbcr 返回的逐平面 CPU 地址布局 (0 表示未设置)
#[derive(Debug, Clone, Copy, Default)]
pub struct YCbCrLayout {
    pub y: usize,
    pub cb: usize,
    pub cr: usize,
    pub y_stride: usize,
    pub c_stride: usize,
    pub chroma_step: usize,
}

/// 锁定区域
#[derive(Debug, Clone, Copy, Default)]
pub struct LockRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl LockRect {
    /// 从原点开始的 width x height 区域
    pub const fn with_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }
}
