//! # 布局计算
//!
//! 磁盘总容量恒为 [`DISK_KIB`] KiB，块大小与 inode 数在建盘时给定，
//! 其余各区域的边界都由这两个参数推出：
//!
//! 超级块 | inode 表 | 空闲 inode 链表 | 根目录 | 空闲数据块 | 空闲块链表节点

use core::ops::Range;

use crate::layout::{DIRECT_COUNT, INODE_SIZE};
use crate::{Error, Result, DISK_BYTES, DISK_KIB};

/// 建盘时为超级块、根目录、至少一个空闲块及取整余量保留的块数
const RESERVED_BLOCKS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub block_size_kib: u16,
    pub inode_count: u16,
    /// 块的字节数
    pub block_bytes: usize,
    pub total_blocks: u16,
    /// 间接块或空闲链表节点可容纳的地址数，
    /// 块内最后一个2字节单元留给链表的 next 指针
    pub capacity: usize,
    pub inode_table: Range<u16>,
    pub inode_list: Range<u16>,
    pub root_dir: u16,
    /// 建盘时的空闲数据块
    pub data_area: Range<u16>,
    /// 建盘时的空闲块链表节点
    pub free_list: Range<u16>,
}

/// 逻辑块在索引树中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPath {
    /// 0 表示直接索引，1~3 表示一至三级间接索引
    pub depth: usize,
    /// 直接索引时只有 `slots[0]` 有效；
    /// 间接索引时 `slots[..depth]` 自顶向下依次是各级索引块内的下标
    pub slots: [usize; 3],
}

impl Geometry {
    pub fn new(block_size_kib: usize, inode_count: usize) -> Result<Self> {
        Self::validate(block_size_kib, inode_count)?;

        let block_bytes = block_size_kib * 1024;
        let total_blocks = DISK_KIB / block_size_kib;
        let capacity = block_bytes / 2 - 1;

        let inode_table_start = 1;
        let inode_table_end = inode_table_start + (INODE_SIZE * inode_count).div_ceil(block_bytes);
        // 空闲 inode 链表至少保留一个节点，即使 inode 全部被占用
        let inode_list_end = inode_table_end + (inode_count - 1).div_ceil(capacity).max(1);
        let root_dir = inode_list_end;
        let data_start = root_dir + 1;
        if data_start >= total_blocks {
            return Err(Error::CapacityExceeded(format!(
                "{inode_count} inodes leave no room for data with {block_size_kib} KiB blocks"
            )));
        }

        // 余下的块分成数据块与链表节点，节点本身也是空闲块
        let remaining = total_blocks - data_start;
        let nodes = remaining.div_ceil(capacity + 1);
        let data_blocks = remaining - nodes;
        if data_blocks < 1 {
            return Err(Error::CapacityExceeded(format!(
                "{inode_count} inodes leave no free data block with {block_size_kib} KiB blocks"
            )));
        }
        let free_list_start = data_start + data_blocks;

        // total_blocks 不超过 1024，以下转换不会截断
        Ok(Self {
            block_size_kib: block_size_kib as u16,
            inode_count: inode_count as u16,
            block_bytes,
            total_blocks: total_blocks as u16,
            capacity,
            inode_table: inode_table_start as u16..inode_table_end as u16,
            inode_list: inode_table_end as u16..inode_list_end as u16,
            root_dir: root_dir as u16,
            data_area: data_start as u16..free_list_start as u16,
            free_list: free_list_start as u16..total_blocks as u16,
        })
    }

    /// 建盘前的参数检查：块大小必须是2的幂，inode 数在 `1..=max_inode_count` 之内
    pub fn validate(block_size_kib: usize, inode_count: usize) -> Result<()> {
        if block_size_kib == 0 || !block_size_kib.is_power_of_two() || block_size_kib > DISK_KIB {
            return Err(Error::InvalidArgument(format!(
                "block size {block_size_kib} KiB is not a power of two within 1..={DISK_KIB}"
            )));
        }
        if inode_count < 1 {
            return Err(Error::InvalidArgument(
                "inode count must be at least 1".to_owned(),
            ));
        }

        let max = Self::max_inode_count(block_size_kib)?;
        if inode_count > max {
            return Err(Error::CapacityExceeded(format!(
                "{inode_count} inodes exceed the maximum of {max} for {block_size_kib} KiB blocks"
            )));
        }

        Ok(())
    }

    /// 给定块大小时可容纳的最大 inode 数。
    ///
    /// 由 `32n + 2(n-1)B/(B-2) <= D - 5B` 解出 n：
    /// `n <= ((D - 5B)(B - 2) + 2B) / (34B - 64)`
    pub fn max_inode_count(block_size_kib: usize) -> Result<usize> {
        const OVERFLOW: &str = "maximum inode count";

        let block_bytes = (block_size_kib as u64)
            .checked_mul(1024)
            .ok_or(Error::Overflow(OVERFLOW))?;
        let disk = DISK_BYTES as u64;
        let reserved = block_bytes
            .checked_mul(RESERVED_BLOCKS)
            .ok_or(Error::Overflow(OVERFLOW))?;
        let Some(room) = disk.checked_sub(reserved) else {
            return Ok(0);
        };

        let numerator = room
            .checked_mul(block_bytes - 2)
            .and_then(|n| n.checked_add(2 * block_bytes))
            .ok_or(Error::Overflow(OVERFLOW))?;
        let denominator = block_bytes
            .checked_mul(INODE_SIZE as u64 + 2)
            .and_then(|d| d.checked_sub(2 * INODE_SIZE as u64))
            .ok_or(Error::Overflow(OVERFLOW))?;

        Ok((numerator / denominator).min(u16::MAX as u64) as usize)
    }

    /// 第 `depth` 级索引覆盖的数据块数
    pub fn tier_span(&self, depth: usize) -> u64 {
        match depth {
            0 => DIRECT_COUNT as u64,
            _ => (self.capacity as u64).saturating_pow(depth as u32),
        }
    }

    /// 把文件内的逻辑块号投影到索引树上
    pub fn locate(&self, block_index: u64) -> Result<BlockPath> {
        let capacity = self.capacity as u64;
        let mut index = block_index;

        for depth in 0..=3 {
            let span = self.tier_span(depth);
            if index < span {
                let mut slots = [0; 3];
                if depth == 0 {
                    slots[0] = index as usize;
                } else {
                    // 以 capacity 为基数的 depth 位数字，高位在前
                    for slot in slots[..depth].iter_mut().rev() {
                        *slot = (index % capacity) as usize;
                        index /= capacity;
                    }
                }
                return Ok(BlockPath { depth, slots });
            }
            index -= span;
        }

        Err(Error::CapacityExceeded(format!(
            "block index {block_index} is beyond the triple indirect tier"
        )))
    }

    /// 容纳 `size` 字节需要的数据块与索引块总数
    pub fn blocks_needed(&self, size: usize) -> u64 {
        let capacity = self.capacity as u64;
        let mut data = size.div_ceil(self.block_bytes) as u64;
        let mut total = data;

        data = data.saturating_sub(DIRECT_COUNT as u64);
        for depth in 1..=3 {
            if data == 0 {
                break;
            }
            let used = data.min(self.tier_span(depth));
            // 自下而上每一级索引块的数量
            let mut per_level = used;
            for _ in 0..depth {
                per_level = per_level.div_ceil(capacity);
                total += per_level;
            }
            data -= used;
        }

        total
    }

    /// 第 `ino` 个 inode 所在的块与块内偏移
    pub fn inode_pos(&self, ino: u16) -> (u16, usize) {
        let byte = ino as usize * INODE_SIZE;
        let block = self.inode_table.start as usize + byte / self.block_bytes;
        (block as u16, byte % self.block_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_kib_blocks_with_sixteen_inodes() {
        let geo = Geometry::new(1, 16).unwrap();

        assert_eq!(geo.total_blocks, 1024);
        assert_eq!(geo.capacity, 511);
        assert_eq!(geo.inode_table, 1..2);
        assert_eq!(geo.inode_list, 2..3);
        assert_eq!(geo.root_dir, 3);
        // 1020 块余量：2 个节点，1018 个数据块
        assert_eq!(geo.data_area, 4..1022);
        assert_eq!(geo.free_list, 1022..1024);
    }

    #[test]
    fn regions_are_ordered() {
        for (bs, n) in [(1, 1), (1, 1000), (2, 513), (4, 4096), (64, 100), (128, 11565)] {
            let geo = Geometry::new(bs, n).unwrap();
            assert!(geo.inode_table.start < geo.inode_table.end);
            assert_eq!(geo.inode_table.end, geo.inode_list.start);
            assert!(geo.inode_list.start < geo.inode_list.end);
            assert_eq!(geo.inode_list.end, geo.root_dir);
            assert_eq!(geo.root_dir + 1, geo.data_area.start);
            assert!(geo.data_area.start < geo.data_area.end);
            assert_eq!(geo.data_area.end, geo.free_list.start);
            assert_eq!(geo.free_list.end, geo.total_blocks);
        }
    }

    #[test]
    fn block_size_must_be_a_power_of_two() {
        assert!(matches!(Geometry::new(3, 16), Err(Error::InvalidArgument(_))));
        assert!(matches!(Geometry::new(0, 16), Err(Error::InvalidArgument(_))));
        assert!(matches!(Geometry::new(2048, 16), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn inode_count_is_bounded() {
        assert!(matches!(Geometry::new(1, 0), Err(Error::InvalidArgument(_))));

        let max = Geometry::max_inode_count(1).unwrap();
        assert_eq!(max, 30686);
        assert!(Geometry::new(1, max).is_ok());
        assert!(matches!(
            Geometry::new(1, max + 1),
            Err(Error::CapacityExceeded(_))
        ));
    }

    #[test]
    fn huge_blocks_admit_no_inodes() {
        assert_eq!(Geometry::max_inode_count(256).unwrap(), 0);
        assert!(matches!(
            Geometry::new(256, 1),
            Err(Error::CapacityExceeded(_))
        ));
    }

    #[test]
    fn locate_walks_every_tier() {
        let geo = Geometry::new(1, 16).unwrap();
        let cap = geo.capacity as u64;

        assert_eq!(geo.locate(4).unwrap(), BlockPath { depth: 0, slots: [4, 0, 0] });
        assert_eq!(geo.locate(5).unwrap(), BlockPath { depth: 1, slots: [0, 0, 0] });
        assert_eq!(
            geo.locate(5 + cap - 1).unwrap(),
            BlockPath { depth: 1, slots: [cap as usize - 1, 0, 0] }
        );
        assert_eq!(geo.locate(5 + cap).unwrap(), BlockPath { depth: 2, slots: [0, 0, 0] });
        assert_eq!(
            geo.locate(5 + cap + cap + 3).unwrap(),
            BlockPath { depth: 2, slots: [1, 3, 0] }
        );

        let triple = 5 + cap + cap * cap;
        assert_eq!(geo.locate(triple).unwrap(), BlockPath { depth: 3, slots: [0, 0, 0] });
        assert_eq!(
            geo.locate(triple + cap * cap + 2 * cap + 7).unwrap(),
            BlockPath { depth: 3, slots: [1, 2, 7] }
        );
        assert!(matches!(
            geo.locate(triple + cap * cap * cap),
            Err(Error::CapacityExceeded(_))
        ));
    }

    #[test]
    fn blocks_needed_counts_index_blocks() {
        let geo = Geometry::new(1, 16).unwrap();
        let bb = geo.block_bytes;

        assert_eq!(geo.blocks_needed(0), 0);
        assert_eq!(geo.blocks_needed(100), 1);
        assert_eq!(geo.blocks_needed(5 * bb), 5);
        // 第6块起用上一级索引
        assert_eq!(geo.blocks_needed(5 * bb + 1), 7);
        assert_eq!(geo.blocks_needed((5 + 511) * bb), 5 + 511 + 1);
        // 二级索引：顶层块 + 一个一级块
        assert_eq!(geo.blocks_needed((5 + 511 + 1) * bb), 5 + 511 + 1 + 1 + 1 + 1);
    }

    #[test]
    fn inode_positions() {
        let geo = Geometry::new(1, 100).unwrap();
        assert_eq!(geo.inode_pos(0), (1, 0));
        assert_eq!(geo.inode_pos(31), (1, 31 * 32));
        assert_eq!(geo.inode_pos(32), (2, 0));
    }
}
