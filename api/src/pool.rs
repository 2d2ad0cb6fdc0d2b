//! Graphic buffer 槽位池

use alloc::sync::Arc;
use alloc::vec::Vec;

use cambuf_core::{
    BufferGeometry, GraphicBuffer, GrallocUsage, PrivateHandle, ShimResult, MAX_FRAME_SLOTS,
};

/// 槽位状态
///
/// buffer 对象持有私有元数据, 两者生命周期一致.
enum BufferSlot {
    Empty,
    Allocated { buffer: Arc<GraphicBuffer> },
}

/// 以槽位索引缓存 graphic buffer 的池分配器
///
/// 同一索引的重复 alloc 返回缓存对象. 同一索引上的并发
/// alloc/free 由调用方串行化.
pub struct GraphicBufferPool {
    geometry: BufferGeometry,
    slots: Vec<BufferSlot>,
}

impl GraphicBufferPool {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_FRAME_SLOTS);
        slots.resize_with(MAX_FRAME_SLOTS, || BufferSlot::Empty);
        Self {
            geometry: BufferGeometry {
                usage: GrallocUsage::USAGE_FOR_CAMERA,
                ..BufferGeometry::default()
            },
            slots,
        }
    }

    /// 重置几何配置并清空所有槽位
    pub fn init(&mut self) {
        self.geometry = BufferGeometry {
            usage: GrallocUsage::USAGE_FOR_CAMERA,
            ..BufferGeometry::default()
        };
        for slot in &mut self.slots {
            *slot = BufferSlot::Empty;
        }
    }

    pub fn set_size(&mut self, width: u32, height: u32, stride: u32) {
        self.geometry.width = width;
        self.geometry.height = height;
        self.geometry.stride = stride;
    }

    pub fn size(&self) -> (u32, u32, u32) {
        (
            self.geometry.width,
            self.geometry.height,
            self.geometry.stride,
        )
    }

    pub fn set_pixel_format(&mut self, format: u32) {
        self.geometry.format = format;
    }

    pub fn pixel_format(&self) -> u32 {
        self.geometry.format
    }

    pub fn set_usage(&mut self, usage: GrallocUsage) {
        self.geometry.usage = usage;
    }

    pub fn usage(&self) -> GrallocUsage {
        self.geometry.usage
    }

    /// 为槽位构造或复用 graphic buffer
    ///
    /// 越界索引与多平面都是使用错误, 直接断言终止. 参数校验失败
    /// 返回 None (已记录日志), 槽位状态不变.
    pub fn alloc(
        &mut self,
        index: usize,
        plane_count: usize,
        fds: &[i32],
        addrs: &[usize],
        sizes: &[usize],
    ) -> Option<Arc<GraphicBuffer>> {
        assert!(
            index < MAX_FRAME_SLOTS,
            "buffer index out of range ({}/{})",
            index,
            MAX_FRAME_SLOTS
        );

        if let BufferSlot::Allocated { buffer } = &self.slots[index] {
            return Some(buffer.clone());
        }

        if plane_count == 0 {
            error!("alloc: invalid plane count {}", plane_count);
            return None;
        }
        assert!(
            plane_count == 1,
            "plane count {} is not supported",
            plane_count
        );

        if !self.geometry.is_complete() {
            error!(
                "alloc: incomplete geometry, width={}, height={}, format={:#x}, usage={:#x}, stride={}",
                self.geometry.width,
                self.geometry.height,
                self.geometry.format,
                self.geometry.usage.bits(),
                self.geometry.stride
            );
            return None;
        }

        if fds.is_empty() || addrs.is_empty() || sizes.is_empty() {
            error!("alloc: missing plane descriptors for slot {}", index);
            return None;
        }

        let handle = Arc::new(PrivateHandle::single_plane(
            fds[0],
            addrs[0],
            sizes[0],
            &self.geometry,
        ));
        let buffer = Arc::new(GraphicBuffer::wrap(handle));

        debug!(
            "alloc: new graphic buffer at slot {}, fd={}, addr={:#x}, size={}",
            index, fds[0], addrs[0], sizes[0]
        );
        self.slots[index] = BufferSlot::Allocated {
            buffer: buffer.clone(),
        };
        Some(buffer)
    }

    /// 释放槽位; 空槽位为成功的空操作
    pub fn free(&mut self, index: usize) -> ShimResult<()> {
        assert!(
            index < MAX_FRAME_SLOTS,
            "buffer index out of range ({}/{})",
            index,
            MAX_FRAME_SLOTS
        );
        self.slots[index] = BufferSlot::Empty;
        Ok(())
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        assert!(
            index < MAX_FRAME_SLOTS,
            "buffer index out of range ({}/{})",
            index,
            MAX_FRAME_SLOTS
        );
        matches!(self.slots[index], BufferSlot::Allocated { .. })
    }
}

impl Default for GraphicBufferPool {
    fn default() -> Self {
        Self::new()
    }
}
