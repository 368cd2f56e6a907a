use std::collections::BTreeMap;

use crate::layout::{DiskInodeKind, Timestamp};
use crate::{FileSystem, Resource, Result};

/// 镜像概况，供 dumpe2fs 之类的展示使用
#[derive(Debug, Clone, Default)]
pub struct FsInfo {
    pub block_size_kib: u16,
    pub total_blocks: u16,
    pub inode_count: u16,
    pub free_block_count: u16,
    pub free_inode_count: u16,
    /// 文件与软链接
    pub file_count: usize,
    pub dir_count: usize,
    /// 空闲块（含空闲链表节点），升序
    pub free_blocks: Vec<u16>,
    /// 空闲 inode，升序
    pub free_inodes: Vec<u16>,
    /// 可达的 inode，按编号升序
    pub inodes: Vec<InodeUsage>,
}

/// 一个在用 inode 的占用情况
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeUsage {
    pub ino: u16,
    pub kind: DiskInodeKind,
    pub size: u32,
    pub links: u16,
    pub created: Timestamp,
    /// 数据块与索引块
    pub blocks: Vec<u16>,
    /// 指向它的全部路径，根目录为 `/`
    pub names: Vec<String>,
}

impl FileSystem {
    pub fn dump_info(&self) -> Result<FsInfo> {
        let sb = &self.super_block;
        let mut info = FsInfo {
            block_size_kib: sb.block_size_kib,
            total_blocks: self.geometry.total_blocks,
            inode_count: sb.inode_count,
            free_block_count: sb.free_block_count,
            free_inode_count: sb.free_inode_count,
            ..Default::default()
        };

        let block_list = self.walk_free_list(Resource::Block)?;
        info.free_blocks = block_list.nodes;
        info.free_blocks.extend(block_list.addresses);
        info.free_blocks.sort_unstable();
        info.free_inodes = self.walk_free_list(Resource::Inode)?.addresses;
        info.free_inodes.sort_unstable();

        let mut usage = BTreeMap::new();
        let mut aliases: Vec<(u16, String)> = Vec::new();
        self.walk_tree(
            |ino, inode, path| {
                usage.insert(
                    ino,
                    InodeUsage {
                        ino,
                        kind: inode.kind,
                        size: inode.size,
                        links: inode.links,
                        created: inode.created,
                        blocks: self.occupied_blocks(inode)?,
                        names: vec![path.to_owned()],
                    },
                );
                Ok(())
            },
            |ino, path| aliases.push((ino, path.to_owned())),
        )?;
        for (ino, path) in aliases {
            if let Some(usage) = usage.get_mut(&ino) {
                usage.names.push(path);
            }
        }

        info.dir_count = usage.values().filter(|u| u.kind == DiskInodeKind::Directory).count();
        info.file_count = usage.len() - info.dir_count;
        info.inodes = usage.into_values().collect();

        Ok(info)
    }
}
