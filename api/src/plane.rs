//! 逐平面描述符提取
//!
//! n 平面格式依次填充平面 [0, n), 未覆盖的平面保持调用方给定的
//! 默认值. 用显式累积代替按 case 贯穿的写法, 避免后续编辑破坏
//! 填充顺序.

use cambuf_core::{PixelFormat, YCbCrLayout, MAX_PLANES};

/// 按像素格式填充逐平面 (fd, 地址)
pub fn fill_by_format(
    format: PixelFormat,
    plane_fds: [i32; MAX_PLANES],
    layout: &YCbCrLayout,
    fds: &mut [i32; MAX_PLANES],
    addrs: &mut [usize; MAX_PLANES],
) {
    let planes = format.plane_count();
    if planes >= 3 {
        fds[2] = plane_fds[2];
        addrs[2] = layout.cr;
    }
    if planes >= 2 {
        fds[1] = plane_fds[1];
        addrs[1] = chroma_addr(format, layout);
    }
    fds[0] = plane_fds[0];
    addrs[0] = layout.y;
}

/// 第 1 平面的 chroma 地址: CrCb 序的变体取 cr, 其余取 cb
fn chroma_addr(format: PixelFormat, layout: &YCbCrLayout) -> usize {
    match format {
        PixelFormat::YCrCb420SpM | PixelFormat::YCrCb420SpMFull => layout.cr,
        _ => layout.cb,
    }
}

/// 按平面数填充逐平面 (fd, 地址)
///
/// `planar_addr` 非零时优先作为第 0 平面地址 (单平面 lock 的
/// 返回值); 否则取 layout 的 y 地址.
pub fn fill_by_count(
    plane_count: usize,
    plane_fds: [i32; MAX_PLANES],
    layout: &YCbCrLayout,
    planar_addr: usize,
    fds: &mut [i32; MAX_PLANES],
    addrs: &mut [usize; MAX_PLANES],
) {
    if plane_count >= 3 {
        fds[2] = plane_fds[2];
        addrs[2] = layout.cr;
    }
    if plane_count >= 2 {
        fds[1] = plane_fds[1];
        addrs[1] = layout.cb;
    }
    if plane_count >= 1 {
        fds[0] = plane_fds[0];
        addrs[0] = if planar_addr != 0 { planar_addr } else { layout.y };
    }
}
