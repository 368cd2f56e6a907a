//! 单文件镜像上的类 ext2 文件系统

/* 整体架构，自上而下 */

// 路径层：目录、链接与文件读写
mod vfs;
pub use vfs::{DirListing, Stat};

// 一致性检查
mod fsck;
pub use fsck::{Anomaly, FsckReport, Occupancy};

// 镜像信息汇总
mod dump;
pub use dump::{FsInfo, InodeUsage};

// 索引树：文件内逻辑块到磁盘块的映射
mod addressing;

// 磁盘块管理器层：布局、inode 表与两条空闲链表
mod efs;
pub use efs::FileSystem;

// 磁盘数据结构层
pub mod layout;

// 块：镜像中一块数据的临时副本
mod block;
pub use block::Block;

mod error;
pub use error::{Error, Resource, Result};

pub use block_dev::{BlockDevice, BlockFile};

/// 镜像总容量（KiB）
pub const DISK_KIB: usize = 1024;
pub const DISK_BYTES: usize = DISK_KIB * 1024;
/// 单个文件的大小上限
pub const MAX_FILE_SIZE: usize = 1024 * 1024;
/// 写入时攒够这么多块就落盘一次
pub const WRITE_BUFFER_SIZE: usize = 64;
/// 软链接最多跟随的层数
pub const MAX_SYMLINK_DEPTH: usize = 8;
/// 根目录的 inode 编号
pub const ROOT_INO: u16 = 0;
