//! 缓冲区池
//! 进程级无锁空闲链表，复用32KiB读写缓冲

use std::sync::OnceLock;

use crossbeam_queue::ArrayQueue;

/// 单个缓冲区大小 (32KiB)
pub const BUFFER_SIZE: usize = 32 * 1024;

/// 池容量：每个活跃会话最多占用两个缓冲 (转发 + 目标排空)
const POOL_CAPACITY: usize = 256;

/// 无锁缓冲区池
///
/// 空闲链表取尽时直接新分配，归还时池满则任其释放，
/// 与运行时负载解耦。
pub struct BufferPool {
    freelist: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    fn new() -> Self {
        Self {
            freelist: ArrayQueue::new(POOL_CAPACITY),
        }
    }

    /// 进程级共享池
    pub fn global() -> &'static BufferPool {
        static POOL: OnceLock<BufferPool> = OnceLock::new();
        POOL.get_or_init(BufferPool::new)
    }

    /// 取出一个缓冲区，池空时新分配
    pub fn acquire(&'static self) -> PooledBuf {
        let buf = self
            .freelist
            .pop()
            .unwrap_or_else(|| vec![0u8; BUFFER_SIZE]);
        PooledBuf {
            buf: Some(buf),
            pool: self,
        }
    }

    fn release(&self, buf: Vec<u8>) {
        // 池满时丢弃，让分配器回收
        let _ = self.freelist.push(buf);
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.freelist.len()
    }
}

/// 池化缓冲区守卫，离开作用域自动归还
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    pool: &'static BufferPool,
}

impl std::ops::Deref for PooledBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer present until drop")
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
