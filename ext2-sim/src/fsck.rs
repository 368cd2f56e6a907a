//! # 一致性检查
//!
//! 把空闲链表中记录的地址与从根目录出发实际可达的 inode 和块逐一对账：
//! 健康的镜像中每个地址要么空闲一次，要么被占用一次。
//!
//! 只报告，不修复。

use enumflags2::{bitflags, BitFlags};
use log::{info, warn};

use crate::{FileSystem, Resource, Result};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// 既不空闲也没被占用
    Leaked = 1 << 0,
    /// 既空闲又被占用
    DoubleBooked = 1 << 1,
    /// 在空闲链表中出现多次
    DuplicateFree = 1 << 2,
    /// 被多处引用
    SharedUse = 1 << 3,
}

/// 某个地址在空闲集合与占用集合中各出现了几次
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub addr: u16,
    pub free: u32,
    pub used: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FsckReport {
    /// 以块地址为下标
    pub blocks: Vec<Occupancy>,
    /// 以 inode 编号为下标
    pub inodes: Vec<Occupancy>,
    /// 非空但从根目录不可达的 inode
    pub orphans: Vec<u16>,
    /// 有环或越界的空闲链表，其计数可能不全
    pub broken_lists: Vec<Resource>,
}

impl Occupancy {
    fn new(addr: usize) -> Self {
        Self {
            addr: addr as u16,
            ..Default::default()
        }
    }

    pub fn anomalies(&self) -> BitFlags<Anomaly> {
        let mut found = BitFlags::empty();
        match (self.free, self.used) {
            (0, 0) => found |= Anomaly::Leaked,
            (1.., 1..) => found |= Anomaly::DoubleBooked,
            _ => {}
        }
        if self.free > 1 {
            found |= Anomaly::DuplicateFree;
        }
        if self.used > 1 {
            found |= Anomaly::SharedUse;
        }
        found
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.anomalies().is_empty()
    }
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.broken_lists.is_empty()
            && self.orphans.is_empty()
            && self.blocks.iter().chain(&self.inodes).all(Occupancy::is_healthy)
    }

    /// 有问题的地址
    pub fn problems(&self) -> impl Iterator<Item = (Resource, &Occupancy)> + '_ {
        let blocks = self.blocks.iter().map(|o| (Resource::Block, o));
        let inodes = self.inodes.iter().map(|o| (Resource::Inode, o));
        blocks
            .chain(inodes)
            .filter(|(_, occupancy)| !occupancy.is_healthy())
    }
}

fn slot<'t>(table: &'t mut [Occupancy], addr: u16, what: &str) -> Option<&'t mut Occupancy> {
    let slot = table.get_mut(addr as usize);
    if slot.is_none() {
        warn!("{what} {addr} is out of range");
    }
    slot
}

impl FileSystem {
    pub fn check(&self) -> Result<FsckReport> {
        let geometry = &self.geometry;
        let mut report = FsckReport {
            blocks: (0..geometry.total_blocks as usize).map(Occupancy::new).collect(),
            inodes: (0..geometry.inode_count as usize).map(Occupancy::new).collect(),
            ..Default::default()
        };

        // 元数据：超级块、inode 表、空闲 inode 链表节点
        report.blocks[0].used += 1;
        for addr in geometry.inode_table.clone() {
            report.blocks[addr as usize].used += 1;
        }

        let inode_list = self.walk_free_list(Resource::Inode)?;
        if inode_list.truncated {
            report.broken_lists.push(Resource::Inode);
        }
        for &addr in &inode_list.nodes {
            report.blocks[addr as usize].used += 1;
        }
        for &ino in &inode_list.addresses {
            if let Some(occupancy) = slot(&mut report.inodes, ino, "free inode") {
                occupancy.free += 1;
            }
        }

        // 空闲块链表的节点本身也是空闲块
        let block_list = self.walk_free_list(Resource::Block)?;
        if block_list.truncated {
            report.broken_lists.push(Resource::Block);
        }
        for &addr in block_list.nodes.iter().chain(&block_list.addresses) {
            if let Some(occupancy) = slot(&mut report.blocks, addr, "free block") {
                occupancy.free += 1;
            }
        }

        let mut reached = vec![false; report.inodes.len()];
        let blocks = &mut report.blocks;
        let inodes = &mut report.inodes;
        self.walk_tree(
            |ino, inode, _| {
                reached[ino as usize] = true;
                inodes[ino as usize].used += 1;
                for addr in self.occupied_blocks(inode)? {
                    if let Some(occupancy) = slot(blocks, addr, "occupied block") {
                        occupancy.used += 1;
                    }
                }
                Ok(())
            },
            |_, _| {},
        )?;

        report.orphans = self
            .inodes
            .iter()
            .enumerate()
            .filter(|&(ino, inode)| !inode.is_empty() && !reached[ino])
            .map(|(ino, _)| ino as u16)
            .collect();

        for (resource, occupancy) in report.problems() {
            warn!("{resource} {}: {:?}", occupancy.addr, occupancy.anomalies());
        }
        for ino in &report.orphans {
            warn!("inode {ino} is in use but unreachable");
        }
        info!(
            "fsck: {} blocks, {} inodes checked, {}",
            report.blocks.len(),
            report.inodes.len(),
            if report.is_clean() { "clean" } else { "problems found" }
        );

        Ok(report)
    }
}
