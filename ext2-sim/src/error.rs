use std::fmt;
use std::io;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// 文件系统操作的错误
///
/// [`Error::Corruption`] 出现时镜像可能已处于不一致状态，
/// 之前已落盘的写入不会回滚，调用方应随后运行一致性检查。
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("too many levels of symbolic links: {0}")]
    SymlinkLoop(String),

    #[error("no free {0} left")]
    ResourceExhausted(Resource),

    #[error("filesystem corrupted: {0}")]
    Corruption(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(&'static str),

    #[error("image I/O error: {0}")]
    Io(#[from] io::Error),
}

/// 由空闲链表分配的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inode,
    Block,
}

impl Error {
    /// 构造 [`Error::Corruption`]，同时记录日志
    pub(crate) fn corruption(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        log::error!("{detail}");
        Self::Corruption(detail)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inode => f.pad("inode"),
            Self::Block => f.pad("block"),
        }
    }
}
