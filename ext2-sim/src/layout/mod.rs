//! # 磁盘数据结构层
//!
//! 磁盘布局：
//! 超级块 | inode 表 | 空闲 inode 链表 | 根目录 | 数据块 | 空闲块链表节点

mod geometry;
pub use geometry::{BlockPath, Geometry};

mod super_block;
pub use super_block::SuperBlock;

mod free_list;
pub use free_list::{chain, FreeNode};

mod inode;
pub use inode::{DiskInode, DiskInodeKind, Timestamp, DIRECT_COUNT, INODE_SIZE};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{validate_name, DirEntry, NAME_MAX_LEN};
