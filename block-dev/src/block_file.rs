use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::BlockDevice;

/// A disk image stored as one host file.
///
/// No handle is kept between calls: every transfer opens the image,
/// seeks, reads or writes one whole block and closes it again.
#[derive(Debug, Clone)]
pub struct BlockFile {
    path: PathBuf,
}

impl BlockFile {
    /// Wraps an existing image.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.metadata()?.len();
        log::debug!("image={} len={len}", path.display());

        Ok(Self { path })
    }

    /// Creates (or truncates) an image of `len` zeroed bytes.
    pub fn create(path: impl AsRef<Path>, len: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        fd.set_len(len)?;
        log::debug!("image={} created len={len}", path.display());

        Ok(Self { path })
    }

    fn seek_to(&self, file: &mut File, block_id: usize, block_size: usize) -> io::Result<()> {
        let pos = (block_id as u64)
            .checked_mul(block_size as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "block offset overflow"))?;
        file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let mut file = File::open(&self.path)?;
        self.seek_to(&mut file, block_id, buf.len())?;
        // 不足一整块说明镜像被截断了
        file.read_exact(buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        self.seek_to(&mut file, block_id, buf.len())?;
        file.write_all(buf)?;
        file.flush()
    }
}
