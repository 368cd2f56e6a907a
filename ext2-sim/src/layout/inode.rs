//! 磁盘上的 inode
//!
//! 数据块通过索引树定位：
//! - 直接索引：[`DIRECT_COUNT`] 个块编号，各自指向一个**数据块**
//! - 一级：索引块连续存储**块编号**，每个编号都指向一个数据块
//! - 二级：索引块内每个编号都指向一个一级索引块
//! - 三级：索引块内每个编号都指向一个二级索引块
//!
//! 每个索引块可存 `Geometry::capacity` 个编号，树上的定位见
//! [`Geometry::locate`](crate::layout::Geometry::locate)。

use chrono::{Datelike, Local, Timelike};

/// inode 记录恒为32字节
pub const INODE_SIZE: usize = 32;
/// 直接索引块个数
pub const DIRECT_COUNT: usize = 5;

/// 创建时间，精确到秒
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub year: u16,
    /// 1~12
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiskInodeKind {
    #[default]
    Empty = 0,
    Directory = 1,
    File = 2,
    SymDirectory = 3,
    SymFile = 4,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
    pub created: Timestamp,
    pub size: u32,
    pub kind: DiskInodeKind,
    /// 硬链接个数
    pub links: u16,
    /// 直接索引块
    pub direct: [u16; DIRECT_COUNT],
    /// 一、二、三级索引块
    pub indirect: [u16; 3],
}

impl Timestamp {
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            year: u16::try_from(now.year()).unwrap_or_default(),
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            min: now.minute() as u8,
            sec: now.second() as u8,
        }
    }
}

impl DiskInodeKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Empty,
            1 => Self::Directory,
            2 => Self::File,
            3 => Self::SymDirectory,
            4 => Self::SymFile,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_symlink(self) -> bool {
        matches!(self, Self::SymDirectory | Self::SymFile)
    }
}

impl DiskInode {
    #[inline]
    pub fn init(&mut self, kind: DiskInodeKind) {
        *self = Self {
            created: Timestamp::now(),
            kind,
            links: 1,
            ..Default::default()
        }
    }

    /// 回到空闲状态：类型、大小、链接数与全部指针清零
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn touch(&mut self) {
        self.created = Timestamp::now();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kind == DiskInodeKind::Empty
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DiskInodeKind::Directory
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }

    /// 空闲的 inode 必须全为零值
    pub fn is_pristine(&self) -> bool {
        self.size == 0
            && self.links == 0
            && self.direct.iter().chain(&self.indirect).all(|&p| p == 0)
    }

    /// 解码失败（未知类型）返回 `None`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);

        let mut direct = [0; DIRECT_COUNT];
        for (i, ptr) in direct.iter_mut().enumerate() {
            *ptr = u16_at(14 + 2 * i);
        }

        Some(Self {
            created: Timestamp {
                year: u16_at(0),
                month: bytes[2],
                day: bytes[3],
                hour: bytes[4],
                min: bytes[5],
                sec: bytes[6],
            },
            kind: DiskInodeKind::from_u8(bytes[7])?,
            size: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            links: u16_at(12),
            direct,
            indirect: [u16_at(24), u16_at(26), u16_at(28)],
        })
    }

    pub fn to_bytes(&self) -> [u8; INODE_SIZE] {
        let mut bytes = [0; INODE_SIZE];
        let t = &self.created;

        bytes[..2].copy_from_slice(&t.year.to_le_bytes());
        bytes[2..7].copy_from_slice(&[t.month, t.day, t.hour, t.min, t.sec]);
        bytes[7] = self.kind as u8;
        bytes[8..12].copy_from_slice(&self.size.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.links.to_le_bytes());
        for (i, ptr) in self.direct.iter().chain(&self.indirect).enumerate() {
            bytes[14 + 2 * i..16 + 2 * i].copy_from_slice(&ptr.to_le_bytes());
        }
        // 30..32 为填充

        bytes
    }
}
