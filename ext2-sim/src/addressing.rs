//! # 索引树
//!
//! 文件内第 i 个数据块经 [`Geometry::locate`](crate::layout::Geometry::locate)
//! 投影到索引树上，再自顶向下逐级读索引块找到数据块。
//!
//! 写入时缺失的索引块与数据块按需分配；索引块立即写回，
//! 数据块先放进写回缓冲，攒够 [`WRITE_BUFFER_SIZE`] 块或写完时落盘。

use log::trace;

use crate::block::Block;
use crate::layout::DiskInode;
use crate::{Error, FileSystem, Result, MAX_FILE_SIZE, WRITE_BUFFER_SIZE};

/// 待落盘的数据块
struct WriteBack {
    pending: Vec<Block>,
}

impl WriteBack {
    fn new() -> Self {
        Self {
            pending: Vec::with_capacity(WRITE_BUFFER_SIZE),
        }
    }

    fn push(&mut self, fs: &FileSystem, block: Block) -> Result<()> {
        self.pending.push(block);
        if self.pending.len() >= WRITE_BUFFER_SIZE {
            self.flush(fs)?;
        }
        Ok(())
    }

    fn flush(&mut self, fs: &FileSystem) -> Result<()> {
        for block in self.pending.drain(..) {
            fs.write_block(&block)?;
        }
        Ok(())
    }
}

impl FileSystem {
    /// 文件内第 `block_index` 个数据块的地址，不会分配新块
    pub(crate) fn data_block(&self, inode: &DiskInode, block_index: u64) -> Result<u16> {
        let path = self.geometry.locate(block_index)?;
        let mut addr = match path.depth {
            0 => inode.direct[path.slots[0]],
            depth => inode.indirect[depth - 1],
        };

        for &slot in &path.slots[..path.depth] {
            if addr == 0 {
                break;
            }
            addr = self.read_block(addr)?.pointer(slot);
        }

        if addr == 0 {
            return Err(Error::corruption(format!(
                "block {block_index} of a {}-byte file has no address",
                inode.size
            )));
        }
        Ok(addr)
    }

    /// 文件内第 `block_index` 个数据块的地址，沿途缺失的块都会被分配
    pub(crate) fn data_block_or_alloc(
        &mut self,
        inode: &mut DiskInode,
        block_index: u64,
    ) -> Result<u16> {
        let path = self.geometry.locate(block_index)?;
        let root = match path.depth {
            0 => &mut inode.direct[path.slots[0]],
            depth => &mut inode.indirect[depth - 1],
        };
        if *root == 0 {
            *root = self.alloc_data()?;
        }

        let mut addr = *root;
        for &slot in &path.slots[..path.depth] {
            let mut block = self.read_block(addr)?;
            let mut child = block.pointer(slot);
            if child == 0 {
                child = self.alloc_data()?;
                block.set_pointer(slot, child);
                self.write_block(&block)?;
            }
            addr = child;
        }

        Ok(addr)
    }

    /// 把 `buf` 写到第 `ino` 个 inode 的 `offset` 处，必要时扩大文件。
    ///
    /// `offset` 不能越过文件末尾。中途失败时已分配的块仍记在 inode 上，
    /// 但文件大小不变。
    pub(crate) fn write_at(&mut self, ino: u16, offset: usize, buf: &[u8]) -> Result<()> {
        let mut inode = *self.inode(ino)?;
        let size = inode.size as usize;
        if offset > size {
            return Err(Error::CapacityExceeded(format!(
                "write position {offset} is beyond the end of a {size}-byte file"
            )));
        }
        let end = offset
            .checked_add(buf.len())
            .ok_or(Error::Overflow("write end position"))?;
        if end > MAX_FILE_SIZE {
            return Err(Error::CapacityExceeded(format!(
                "{end} bytes exceed the file size limit of {MAX_FILE_SIZE}"
            )));
        }

        let written = self.write_blocks(&mut inode, offset, buf);
        if written.is_ok() {
            inode.size = size.max(end) as u32;
        }
        // 出错时也要保存已挂上的块
        self.store_inode(ino, inode)?;
        written
    }

    fn write_blocks(&mut self, inode: &mut DiskInode, offset: usize, buf: &[u8]) -> Result<()> {
        let block_bytes = self.geometry.block_bytes;
        let end = offset + buf.len();
        let mut write_back = WriteBack::new();

        let mut pos = offset;
        while pos < end {
            let index = pos / block_bytes;
            let start = pos % block_bytes;
            let len = (block_bytes - start).min(end - pos);

            let addr = self.data_block_or_alloc(inode, index as u64)?;
            // 整块覆盖时不必先读
            let mut block = if len == block_bytes {
                Block::zeroed(addr, block_bytes)
            } else {
                self.read_block(addr)?
            };
            let src = pos - offset;
            block.bytes_mut()[start..start + len].copy_from_slice(&buf[src..src + len]);
            trace!("block {index} of inode at {addr}: {len} bytes at {start}");
            write_back.push(self, block)?;

            pos += len;
        }

        write_back.flush(self)
    }

    /// 按顺序读出文件的全部数据块，每块的逻辑长度为其中有效字节数
    pub(crate) fn load_blocks(&self, inode: &DiskInode) -> Result<Vec<Block>> {
        let block_bytes = self.geometry.block_bytes;
        let size = inode.size as usize;

        (0..size.div_ceil(block_bytes))
            .map(|index| {
                let addr = self.data_block(inode, index as u64)?;
                let mut block = self.read_block(addr)?;
                block.set_len(size - index * block_bytes);
                Ok(block)
            })
            .collect()
    }

    pub(crate) fn read_content(&self, inode: &DiskInode) -> Result<Vec<u8>> {
        let mut content = Vec::with_capacity(inode.size as usize);
        for block in self.load_blocks(inode)? {
            content.extend_from_slice(&block.bytes()[..block.len()]);
        }
        Ok(content)
    }

    /// inode 占用的全部块，包括各级索引块
    pub(crate) fn occupied_blocks(&self, inode: &DiskInode) -> Result<Vec<u16>> {
        let mut blocks: Vec<u16> = inode.direct.iter().copied().filter(|&p| p != 0).collect();

        // (块地址, 其下还有几级)
        let mut stack: Vec<(u16, usize)> = inode
            .indirect
            .iter()
            .enumerate()
            .rev()
            .filter(|&(_, &addr)| addr != 0)
            .map(|(i, &addr)| (addr, i + 1))
            .collect();
        while let Some((addr, depth)) = stack.pop() {
            blocks.push(addr);
            if depth == 0 {
                continue;
            }
            let block = self.read_block(addr)?;
            let children: Vec<_> = block
                .pointers(self.geometry.capacity)
                .filter(|&p| p != 0)
                .collect();
            stack.extend(children.into_iter().rev().map(|child| (child, depth - 1)));
        }

        Ok(blocks)
    }

    /// 释放 inode 的全部块，大小归零
    pub(crate) fn release_blocks(&mut self, inode: &mut DiskInode) -> Result<()> {
        let blocks = self.occupied_blocks(inode)?;
        // 倒序释放：最先占用的块最后入栈，下次分配时最先被取回
        for &addr in blocks.iter().rev() {
            self.dealloc_data(addr)?;
        }

        inode.size = 0;
        inode.direct = Default::default();
        inode.indirect = Default::default();
        Ok(())
    }
}
