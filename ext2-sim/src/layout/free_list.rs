//! 空闲链表节点
//!
//! 空闲 inode 与空闲块各由一条单链表记录，节点就存放在被管理的空间里：
//! 节点前 `capacity` 个单元依次存放空闲地址（遇到0即止），
//! 最后一个单元存放下一个节点的块号，0 表示链尾。
//!
//! 链表像栈一样使用：超级块中的 tail 是栈顶，只有它可能不满；
//! 分配从 tail 弹出，释放压入 tail。

use core::ops::{Deref, DerefMut, Range};

use crate::block::Block;

/// 空闲链表节点视图
pub struct FreeNode<B> {
    block: B,
    capacity: usize,
}

impl<B: Deref<Target = Block>> FreeNode<B> {
    #[inline]
    pub fn new(block: B, capacity: usize) -> Self {
        debug_assert!(capacity < block.cells());
        Self { block, capacity }
    }

    /// 节点内空闲地址的个数
    pub fn len(&self) -> usize {
        self.block
            .pointers(self.capacity)
            .take_while(|&addr| addr != 0)
            .count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    #[inline]
    pub fn next(&self) -> u16 {
        self.block.pointer(self.capacity)
    }

    pub fn addresses(&self) -> impl Iterator<Item = u16> + '_ {
        self.block
            .pointers(self.capacity)
            .take_while(|&addr| addr != 0)
    }
}

impl<B: DerefMut<Target = Block>> FreeNode<B> {
    /// 压入一个空闲地址，节点已满时返回 `false`
    pub fn push(&mut self, addr: u16) -> bool {
        debug_assert_ne!(addr, 0);
        let len = self.len();
        if len == self.capacity {
            return false;
        }
        self.block.set_pointer(len, addr);
        true
    }

    /// 弹出最后压入的地址
    pub fn pop(&mut self) -> Option<u16> {
        let len = self.len();
        let top = len.checked_sub(1)?;
        let addr = self.block.pointer(top);
        self.block.set_pointer(top, 0);
        Some(addr)
    }

    #[inline]
    pub fn set_next(&mut self, next: u16) {
        self.block.set_pointer(self.capacity, next);
    }
}

/// 建盘时把 `region` 内的块串成一条链表。
///
/// 链表自低地址向高地址链接（`a -> a + 1`），`region` 的最后一块是链底；
/// `addresses` 须按降序给出，从链底开始逐个节点填满，
/// 剩余的零头留给最低的节点（即 tail），因此分配时先拿到最小的地址。
pub fn chain(
    region: Range<u16>,
    addresses: impl IntoIterator<Item = u16>,
    block_bytes: usize,
    capacity: usize,
) -> Vec<Block> {
    let head = region.end.saturating_sub(1);
    let mut addresses = addresses.into_iter();

    region
        .rev()
        .map(|addr| {
            let mut block = Block::zeroed(addr, block_bytes);
            let mut node = FreeNode::new(&mut block, capacity);
            for free in addresses.by_ref().take(capacity) {
                node.push(free);
            }
            node.set_next(if addr == head { 0 } else { addr + 1 });
            block
        })
        .collect()
}
