//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块的大小由调用方传入的缓冲区长度决定：第 `block_id` 块位于
//! `block_id * buf.len()` 字节处。这样在读出超级块之前，
//! 文件系统也能以最小块长读取第0块。

mod block_file;

use std::io;

pub use self::block_file::BlockFile;

/// 块设备驱动特质
pub trait BlockDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;
}
