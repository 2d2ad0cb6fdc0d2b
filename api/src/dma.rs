//! DMA 缓冲区映射分配器

use alloc::sync::Arc;

use cambuf_core::{PageMapper, ShimError, ShimResult};

/// 以单个 fd 为粒度做页映射的分配器
///
/// 无重试逻辑; 失败路径上描述符一并回收.
pub struct DmaBufAllocator {
    mapper: Arc<dyn PageMapper>,
}

impl DmaBufAllocator {
    pub fn new(mapper: Arc<dyn PageMapper>) -> Self {
        Self { mapper }
    }

    /// 将 fd 指向的缓冲区映射进进程地址空间
    pub fn map(&self, size: usize, fd: i32) -> ShimResult<usize> {
        if size == 0 {
            error!("map: size equals zero");
            return Err(ShimError::InvalidArg);
        }
        if fd <= 0 {
            error!("map: invalid fd {}", fd);
            return Err(ShimError::InvalidArg);
        }

        match self.mapper.map(size, fd) {
            Some(addr) => Ok(addr),
            None => {
                error!("map: page mapping failed, size={}, fd={}", size, fd);
                self.mapper.close(fd);
                Err(ShimError::MapFailed)
            }
        }
    }

    /// 解除映射并关闭描述符
    ///
    /// 返回后资源一律视为已释放: 无论成败, `fd` 与 `addr` 都被
    /// 重置为 -1 / 0, 通过了入口校验的描述符必定被关闭.
    pub fn unmap(
        &self,
        size: usize,
        fd: &mut i32,
        addr: &mut usize,
        map_needed: bool,
    ) -> ShimResult<()> {
        let cur_fd = *fd;
        let cur_addr = *addr;

        if cur_fd < 0 {
            error!("unmap: fd {} is lower than zero", cur_fd);
            *fd = -1;
            *addr = 0;
            return Err(ShimError::InvalidArg);
        }

        let mut ret = Ok(());
        if map_needed {
            if cur_addr == 0 {
                error!("unmap: mapped address equals zero");
                ret = Err(ShimError::InvalidArg);
            } else if !self.mapper.unmap(cur_addr, size) {
                error!("unmap: page unmapping failed, addr={:#x}, size={}", cur_addr, size);
                ret = Err(ShimError::UnmapFailed);
            }
        }

        // 前面无论是否失败, 描述符都在此关闭
        self.mapper.close(cur_fd);
        *fd = -1;
        *addr = 0;
        ret
    }
}
