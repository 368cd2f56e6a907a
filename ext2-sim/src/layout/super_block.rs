use crate::layout::Geometry;

/// 超级块：
/// - 记录建盘参数，用于重建 [`Geometry`]；
/// - 记录两条空闲链表的头尾与计数
///
/// 各字段以小端 u16 依次存于第0块开头，其余字节为0。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub block_size_kib: u16,
    pub root_dir: u16,
    pub inode_table_pos: u16,
    pub inode_count: u16,
    pub free_inode_count: u16,
    pub free_block_count: u16,
    /// 空闲块链表最底层的节点，0 表示链表为空
    pub free_block_head: u16,
    /// 空闲块链表最顶层（唯一可能不满）的节点
    pub free_block_tail: u16,
    pub inode_list_head: u16,
    pub inode_list_tail: u16,
}

impl SuperBlock {
    pub const SIZE: usize = 20;

    pub fn init(geometry: &Geometry) -> Self {
        let free_blocks = geometry.data_area.len() + geometry.free_list.len();
        Self {
            block_size_kib: geometry.block_size_kib,
            root_dir: geometry.root_dir,
            inode_table_pos: geometry.inode_table.start,
            inode_count: geometry.inode_count,
            free_inode_count: geometry.inode_count - 1,
            free_block_count: free_blocks as u16,
            free_block_head: geometry.free_list.end - 1,
            free_block_tail: geometry.free_list.start,
            inode_list_head: geometry.inode_list.end - 1,
            inode_list_tail: geometry.inode_list.start,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut fields = bytes[..Self::SIZE]
            .chunks_exact(2)
            .map(|field| u16::from_le_bytes([field[0], field[1]]));
        let mut next = || fields.next().unwrap_or_default();

        Self {
            block_size_kib: next(),
            root_dir: next(),
            inode_table_pos: next(),
            inode_count: next(),
            free_inode_count: next(),
            free_block_count: next(),
            free_block_head: next(),
            free_block_tail: next(),
            inode_list_head: next(),
            inode_list_tail: next(),
        }
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        let fields = [
            self.block_size_kib,
            self.root_dir,
            self.inode_table_pos,
            self.inode_count,
            self.free_inode_count,
            self.free_block_count,
            self.free_block_head,
            self.free_block_tail,
            self.inode_list_head,
            self.inode_list_tail,
        ];
        for (dst, field) in bytes[..Self::SIZE].chunks_exact_mut(2).zip(fields) {
            dst.copy_from_slice(&field.to_le_bytes());
        }
    }

    /// 与按建盘参数重新推出的布局是否吻合
    pub fn is_valid(&self, geometry: &Geometry) -> bool {
        let total = geometry.total_blocks;
        let in_disk = |addr: u16| addr < total;

        self.root_dir == geometry.root_dir
            && self.inode_table_pos == geometry.inode_table.start
            && self.free_inode_count <= self.inode_count
            && self.free_block_count <= total
            && in_disk(self.free_block_head)
            && in_disk(self.free_block_tail)
            && in_disk(self.inode_list_head)
            && in_disk(self.inode_list_tail)
            && self.inode_list_tail != 0
    }
}
