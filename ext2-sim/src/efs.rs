//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：持有超级块与整张 inode 表的内存副本，
//! 管理空闲 inode 与空闲块两条链表。
//!
//! 每次修改都会立即写回镜像，超级块中的空闲计数不会多于实际可用的空间。

use std::path::Path;

use block_dev::{BlockDevice, BlockFile};
use log::{debug, info, warn};

use crate::block::Block;
use crate::layout::*;
use crate::{Error, Resource, Result, DISK_BYTES, ROOT_INO};

/// 超级块按最小块长读出，之后才知道真正的块大小
const SUPER_BLOCK_PROBE: usize = 1024;

pub struct FileSystem {
    pub(crate) device: Box<dyn BlockDevice>,
    pub(crate) geometry: Geometry,
    pub(crate) super_block: SuperBlock,
    pub(crate) inodes: Vec<DiskInode>,
}

/// 沿 next 指针走完一条空闲链表的结果
#[derive(Debug, Default)]
pub(crate) struct FreeListWalk {
    /// 链表节点所在的块，自 tail 起
    pub nodes: Vec<u16>,
    /// 节点内记录的空闲地址
    pub addresses: Vec<u16>,
    /// 遇到环或越界指针而提前停止
    pub truncated: bool,
}

impl FileSystem {
    /// 在 `path` 处新建镜像。
    ///
    /// 参数在创建文件之前检查，不合法时不会留下任何文件。
    pub fn create(path: impl AsRef<Path>, block_size_kib: usize, inode_count: usize) -> Result<Self> {
        let geometry = Geometry::new(block_size_kib, inode_count)?;
        let device = BlockFile::create(path, DISK_BYTES as u64)?;
        Self::format(Box::new(device), geometry)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let device = BlockFile::open(path)?;
        Self::mount(Box::new(device))
    }

    /// 按 `geometry` 在设备上建立空文件系统
    pub fn format(device: Box<dyn BlockDevice>, geometry: Geometry) -> Result<Self> {
        let bb = geometry.block_bytes;
        let zero = Block::zeroed(0, bb);
        for addr in 0..geometry.total_blocks {
            device.write_block(addr as usize, zero.bytes())?;
        }

        let mut inodes = vec![DiskInode::default(); geometry.inode_count as usize];
        let root = &mut inodes[ROOT_INO as usize];
        root.init(DiskInodeKind::Directory);
        root.size = 2 * DirEntry::SIZE as u32;
        root.direct[0] = geometry.root_dir;

        let fs = Self {
            device,
            geometry: geometry.clone(),
            super_block: SuperBlock::init(&geometry),
            inodes,
        };

        for block in chain(
            geometry.inode_list.clone(),
            (1..geometry.inode_count).rev(),
            bb,
            geometry.capacity,
        ) {
            fs.write_block(&block)?;
        }
        for block in chain(
            geometry.free_list.clone(),
            geometry.data_area.clone().rev(),
            bb,
            geometry.capacity,
        ) {
            fs.write_block(&block)?;
        }

        let mut root_dir = Block::zeroed(geometry.root_dir, bb);
        root_dir.bytes_mut()[..DirEntry::SIZE].copy_from_slice(&DirEntry::new(".", ROOT_INO).to_bytes());
        root_dir.bytes_mut()[DirEntry::SIZE..2 * DirEntry::SIZE]
            .copy_from_slice(&DirEntry::new("..", ROOT_INO).to_bytes());
        fs.write_block(&root_dir)?;

        for addr in geometry.inode_table.clone() {
            fs.write_inode_block(addr)?;
        }
        fs.write_super_block()?;

        info!(
            "formatted: block size {} KiB, {} blocks, {} inodes, {} free blocks",
            geometry.block_size_kib,
            geometry.total_blocks,
            geometry.inode_count,
            fs.super_block.free_block_count
        );
        Ok(fs)
    }

    /// 读出超级块与 inode 表
    pub fn mount(device: Box<dyn BlockDevice>) -> Result<Self> {
        let mut probe = [0; SUPER_BLOCK_PROBE];
        device.read_block(0, &mut probe)?;
        let super_block = SuperBlock::from_bytes(&probe);

        let geometry = Geometry::new(
            super_block.block_size_kib as usize,
            super_block.inode_count as usize,
        )
        .map_err(|err| Error::corruption(format!("superblock describes no valid layout: {err}")))?;
        if !super_block.is_valid(&geometry) {
            return Err(Error::corruption(format!(
                "superblock disagrees with its layout: {super_block:?}"
            )));
        }

        let mut fs = Self {
            device,
            geometry,
            super_block,
            inodes: Vec::new(),
        };
        fs.inodes = fs.load_inode_table()?;
        if !fs.inodes[ROOT_INO as usize].is_dir() {
            return Err(Error::corruption("root inode is not a directory"));
        }

        debug!("mounted {:?}", fs.super_block);
        Ok(fs)
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn inodes(&self) -> &[DiskInode] {
        &self.inodes
    }

    pub fn inode(&self, ino: u16) -> Result<&DiskInode> {
        self.inodes
            .get(ino as usize)
            .ok_or_else(|| Error::corruption(format!("inode {ino} is out of range")))
    }

    pub fn read_block(&self, addr: u16) -> Result<Block> {
        self.check_addr(addr)?;
        let mut block = Block::zeroed(addr, self.geometry.block_bytes);
        self.device.read_block(addr as usize, block.bytes_mut())?;
        block.set_len(block.capacity());
        Ok(block)
    }

    pub fn write_block(&self, block: &Block) -> Result<()> {
        self.check_addr(block.addr())?;
        self.device.write_block(block.addr() as usize, block.bytes())?;
        Ok(())
    }

    /// 替换内存中的 inode 并写回
    pub(crate) fn store_inode(&mut self, ino: u16, inode: DiskInode) -> Result<()> {
        let slot = self
            .inodes
            .get_mut(ino as usize)
            .ok_or_else(|| Error::corruption(format!("inode {ino} is out of range")))?;
        *slot = inode;
        self.write_inode(ino)
    }

    /// 以某种方式修改 inode 并写回
    pub(crate) fn update_inode<V>(
        &mut self,
        ino: u16,
        f: impl FnOnce(&mut DiskInode) -> V,
    ) -> Result<V> {
        let mut inode = *self.inode(ino)?;
        let ret = f(&mut inode);
        self.store_inode(ino, inode)?;
        Ok(ret)
    }

    pub(crate) fn write_super_block(&self) -> Result<()> {
        let mut block = Block::zeroed(0, self.geometry.block_bytes);
        self.super_block.write_to(block.bytes_mut());
        self.write_block(&block)
    }

    /// 在磁盘上分配新的 inode 并返回其编号
    pub fn alloc_inode(&mut self) -> Result<u16> {
        if self.super_block.free_inode_count == 0 {
            return Err(Error::ResourceExhausted(Resource::Inode));
        }

        let capacity = self.geometry.capacity;
        loop {
            let tail = self.super_block.inode_list_tail;
            let mut block = self.read_block(tail)?;
            let mut node = FreeNode::new(&mut block, capacity);

            if let Some(ino) = node.pop() {
                self.write_block(&block)?;
                let inode = self.inode(ino)?;
                if !inode.is_empty() || !inode.is_pristine() {
                    return Err(Error::corruption(format!(
                        "inode {ino} is on the free list but in use"
                    )));
                }
                self.super_block.free_inode_count -= 1;
                self.write_super_block()?;
                debug!("alloc inode {ino}");
                return Ok(ino);
            }

            // 栈顶节点已空：转向下一个节点，空节点归还给空闲块
            let next = node.next();
            if next == 0 {
                return Err(Error::corruption(format!(
                    "{} free inodes recorded but the free inode list is empty",
                    self.super_block.free_inode_count
                )));
            }
            self.super_block.inode_list_tail = next;
            self.write_super_block()?;
            debug!("inode list node {tail} drained, tail is now {next}");
            self.dealloc_data(tail)?;
        }
    }

    /// 回收 inode：清零后压入空闲 inode 链表。
    ///
    /// 栈顶节点已满时先取一块作为新的栈顶，取不到则 inode 原样保留。
    pub fn dealloc_inode(&mut self, ino: u16) -> Result<()> {
        if ino == ROOT_INO {
            return Err(Error::corruption("attempt to free the root inode"));
        }

        let capacity = self.geometry.capacity;
        let tail = self.super_block.inode_list_tail;
        let mut block = self.read_block(tail)?;
        let grew = FreeNode::new(&block, capacity).is_full();
        if grew {
            let addr = self.alloc_data()?;
            block = Block::zeroed(addr, self.geometry.block_bytes);
            FreeNode::new(&mut block, capacity).set_next(tail);
        }

        self.store_inode(ino, DiskInode::default())?;
        FreeNode::new(&mut block, capacity).push(ino);
        self.write_block(&block)?;
        if grew {
            self.super_block.inode_list_tail = block.addr();
            debug!("inode list grew a node at {}", block.addr());
        }

        self.super_block.free_inode_count += 1;
        self.write_super_block()?;
        debug!("dealloc inode {ino}");
        Ok(())
    }

    /// 回收一个 inode 要新占用的块数：栈顶节点已满时为 1
    pub(crate) fn inode_release_cost(&self) -> Result<u64> {
        let block = self.read_block(self.super_block.inode_list_tail)?;
        Ok(FreeNode::new(&block, self.geometry.capacity).is_full() as u64)
    }

    /// 在磁盘上分配新的数据块并返回其地址，块内容清零
    pub fn alloc_data(&mut self) -> Result<u16> {
        if self.super_block.free_block_count == 0 {
            return Err(Error::ResourceExhausted(Resource::Block));
        }

        let tail = self.super_block.free_block_tail;
        if tail == 0 {
            return Err(Error::corruption(format!(
                "{} free blocks recorded but the free block list is empty",
                self.super_block.free_block_count
            )));
        }

        let mut block = self.read_block(tail)?;
        let mut node = FreeNode::new(&mut block, self.geometry.capacity);
        let addr = match node.pop() {
            Some(addr) => {
                self.write_block(&block)?;
                addr
            }
            None => {
                // 空节点自身就是一个空闲块
                let next = node.next();
                self.super_block.free_block_tail = next;
                if next == 0 {
                    self.super_block.free_block_head = 0;
                }
                tail
            }
        };

        self.super_block.free_block_count -= 1;
        self.write_super_block()?;
        self.write_block(&Block::zeroed(addr, self.geometry.block_bytes))?;
        debug!("alloc block {addr}");
        Ok(addr)
    }

    pub fn dealloc_data(&mut self, addr: u16) -> Result<()> {
        if addr < self.geometry.inode_list.start || addr >= self.geometry.total_blocks {
            return Err(Error::corruption(format!(
                "block {addr} is not in the allocatable area"
            )));
        }

        let tail = self.super_block.free_block_tail;
        let pushed = if tail == 0 {
            false
        } else {
            let mut block = self.read_block(tail)?;
            let pushed = FreeNode::new(&mut block, self.geometry.capacity).push(addr);
            if pushed {
                self.write_block(&block)?;
            }
            pushed
        };

        if !pushed {
            // 栈顶节点已满或链表为空：被释放的块自己成为新的栈顶
            let mut block = Block::zeroed(addr, self.geometry.block_bytes);
            FreeNode::new(&mut block, self.geometry.capacity).set_next(tail);
            self.write_block(&block)?;
            self.super_block.free_block_tail = addr;
            if tail == 0 {
                self.super_block.free_block_head = addr;
            }
        }

        self.super_block.free_block_count += 1;
        self.write_super_block()?;
        debug!("dealloc block {addr}");
        Ok(())
    }

    /// 沿空闲链表自 tail 走到链底
    pub(crate) fn walk_free_list(&self, resource: Resource) -> Result<FreeListWalk> {
        let mut addr = match resource {
            Resource::Inode => self.super_block.inode_list_tail,
            Resource::Block => self.super_block.free_block_tail,
        };
        let total = self.geometry.total_blocks;

        let mut walk = FreeListWalk::default();
        while addr != 0 {
            // 节点数不可能超过总块数，否则必有环
            if walk.nodes.len() >= total as usize || addr >= total {
                warn!("{resource} free list is broken at block {addr}");
                walk.truncated = true;
                break;
            }
            let block = self.read_block(addr)?;
            let node = FreeNode::new(&block, self.geometry.capacity);
            walk.nodes.push(addr);
            walk.addresses.extend(node.addresses());
            addr = node.next();
        }

        Ok(walk)
    }

    fn check_addr(&self, addr: u16) -> Result<()> {
        if addr >= self.geometry.total_blocks {
            return Err(Error::corruption(format!(
                "block {addr} is beyond the end of the disk ({} blocks)",
                self.geometry.total_blocks
            )));
        }
        Ok(())
    }

    /// 通过编号获取 inode 所在块，改写其中的记录
    fn write_inode(&self, ino: u16) -> Result<()> {
        let (addr, offset) = self.geometry.inode_pos(ino);
        let mut block = self.read_block(addr)?;
        block.bytes_mut()[offset..offset + INODE_SIZE]
            .copy_from_slice(&self.inodes[ino as usize].to_bytes());
        self.write_block(&block)
    }

    /// 整块写出 inode 表中的一块
    fn write_inode_block(&self, addr: u16) -> Result<()> {
        let per_block = self.geometry.block_bytes / INODE_SIZE;
        let first = (addr - self.geometry.inode_table.start) as usize * per_block;

        let mut block = Block::zeroed(addr, self.geometry.block_bytes);
        for (slot, inode) in block
            .bytes_mut()
            .chunks_exact_mut(INODE_SIZE)
            .zip(self.inodes.iter().skip(first))
        {
            slot.copy_from_slice(&inode.to_bytes());
        }
        self.write_block(&block)
    }

    fn load_inode_table(&self) -> Result<Vec<DiskInode>> {
        let count = self.geometry.inode_count as usize;
        let mut inodes = Vec::with_capacity(count);

        for addr in self.geometry.inode_table.clone() {
            let block = self.read_block(addr)?;
            for record in block.bytes().chunks_exact(INODE_SIZE) {
                if inodes.len() == count {
                    break;
                }
                let ino = inodes.len();
                let inode = DiskInode::from_bytes(record).ok_or_else(|| {
                    Error::corruption(format!("inode {ino} has an unknown kind {}", record[7]))
                })?;
                inodes.push(inode);
            }
        }

        Ok(inodes)
    }
}

impl core::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileSystem")
            .field("geometry", &self.geometry)
            .field("super_block", &self.super_block)
            .finish_non_exhaustive()
    }
}
