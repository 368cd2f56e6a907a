#![allow(dead_code)]

use ext2_sim::FileSystem;
use tempfile::TempDir;

pub struct Scratch {
    pub dir: TempDir,
    pub fs: FileSystem,
}

pub fn scratch(block_size_kib: usize, inode_count: usize) -> Scratch {
    let dir = tempfile::tempdir().unwrap();
    let fs = FileSystem::create(dir.path().join("disk.img"), block_size_kib, inode_count).unwrap();
    Scratch { dir, fs }
}

impl Scratch {
    pub fn reopen(&mut self) {
        self.fs = FileSystem::open(self.dir.path().join("disk.img")).unwrap();
    }

    /// 在用的 inode 数
    pub fn used_inodes(&self) -> usize {
        self.fs.inodes().iter().filter(|inode| !inode.is_empty()).count()
    }

    pub fn assert_clean(&self) {
        let report = self.fs.check().unwrap();
        let problems: Vec<_> = report.problems().collect();
        assert!(
            report.is_clean(),
            "problems: {problems:?}, orphans: {:?}",
            report.orphans
        );
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}
