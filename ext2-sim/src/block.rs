//! # 块
//!
//! 从镜像中临时读出的一块数据，记录自己的磁盘地址与逻辑长度。
//! 没有共享的块缓存：每次读都重新从镜像取，改完由调用方写回。
//!
//! 同一段字节有三种解读方式：
//! - 数据：文件内容，见 [`Block::bytes`]
//! - 指针数组：每2字节（大端）一个块地址，见 [`Block::pointer`]
//! - 目录项数组：每8字节一个 [`DirEntry`]，见 [`Block::dir_entries`]
//!
//! 空闲链表节点的解读见 [`FreeNode`](crate::layout::FreeNode)。

use crate::layout::DirEntry;

/// 指针单元的字节数
pub const CELL_SIZE: usize = 2;

#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    addr: u16,
    /// 块内有效字节数
    len: usize,
    data: Box<[u8]>,
}

impl Block {
    pub fn zeroed(addr: u16, block_bytes: usize) -> Self {
        Self {
            addr,
            len: 0,
            data: vec![0; block_bytes].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn addr(&self) -> u16 {
        self.addr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 块内2字节单元的个数
    #[inline]
    pub fn cells(&self) -> usize {
        self.data.len() / CELL_SIZE
    }

    /// 读第 `index` 个指针单元
    pub fn pointer(&self, index: usize) -> u16 {
        debug_assert!(index < self.cells());
        let at = index * CELL_SIZE;
        u16::from_be_bytes([self.data[at], self.data[at + 1]])
    }

    pub fn set_pointer(&mut self, index: usize, addr: u16) {
        debug_assert!(index < self.cells());
        let at = index * CELL_SIZE;
        self.data[at..at + CELL_SIZE].copy_from_slice(&addr.to_be_bytes());
    }

    /// 前 `count` 个指针单元
    pub fn pointers(&self, count: usize) -> impl Iterator<Item = u16> + '_ {
        (0..count.min(self.cells())).map(|index| self.pointer(index))
    }

    /// 按逻辑长度解读出的目录项
    pub fn dir_entries(&self) -> impl Iterator<Item = DirEntry> + '_ {
        self.data[..self.len]
            .chunks_exact(DirEntry::SIZE)
            .map(DirEntry::from_bytes)
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block")
            .field("addr", &self.addr)
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}
