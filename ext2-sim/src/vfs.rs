//! # 路径层
//!
//! 以绝对路径操作文件树：逐级线性扫描目录项解析路径，
//! 维护目录项、硬链接计数与软链接。

use log::{debug, info, warn};

use crate::layout::{validate_name, DirEntry, DiskInode, DiskInodeKind, Timestamp};
use crate::{Error, FileSystem, Resource, Result, MAX_FILE_SIZE, MAX_SYMLINK_DEPTH, ROOT_INO};

/// 目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub name: String,
    pub stat: Stat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: u16,
    pub kind: DiskInodeKind,
    pub size: u32,
    pub links: u16,
    pub created: Timestamp,
}

/// 拆开绝对路径，允许末尾的 `/`
fn components(path: &str) -> Result<Vec<&str>> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Error::InvalidArgument(format!("path {path:?} is not absolute")));
    };
    Ok(rest.split('/').filter(|part| !part.is_empty()).collect())
}

/// 父目录路径与最后一段名字
fn split_last(path: &str) -> Result<(String, &str)> {
    let mut parts = components(path)?;
    let name = parts
        .pop()
        .ok_or_else(|| Error::InvalidArgument(format!("path {path:?} names the root directory")))?;
    Ok((format!("/{}", parts.join("/")), name))
}

impl FileSystem {
    /// 列出目录内容，不含 `.` 与 `..`
    pub fn list(&self, path: &str) -> Result<Vec<DirListing>> {
        let ino = self.resolve(path)?;
        let dir = self.dir_inode(ino, path)?;

        self.dir_entries(dir)?
            .into_iter()
            .skip(2)
            .map(|entry| {
                Ok(DirListing {
                    name: entry.name(),
                    stat: self.stat_of(entry.inode_id())?,
                })
            })
            .collect()
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.new_entry(path)?;
        self.reserve(1, 1 + self.growth(parent, DirEntry::SIZE)?)?;

        let ino = self.alloc_inode()?;
        let addr = self.alloc_data()?;
        let mut block = self.read_block(addr)?;
        block.bytes_mut()[..DirEntry::SIZE].copy_from_slice(&DirEntry::new(".", ino).to_bytes());
        block.bytes_mut()[DirEntry::SIZE..2 * DirEntry::SIZE]
            .copy_from_slice(&DirEntry::new("..", parent).to_bytes());
        self.write_block(&block)?;

        self.update_inode(ino, |inode| {
            inode.init(DiskInodeKind::Directory);
            inode.size = 2 * DirEntry::SIZE as u32;
            inode.direct[0] = addr;
        })?;
        self.append_entry(parent, name, ino)?;

        info!("mkdir {path}: inode {ino}");
        Ok(())
    }

    /// 删除空目录
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name, ino) = self.existing_entry(path)?;
        let mut dir = *self.inode(ino)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(path.to_owned()));
        }
        if dir.size != 2 * DirEntry::SIZE as u32 {
            return Err(Error::DirectoryNotEmpty(path.to_owned()));
        }

        self.remove_entry(parent, name)?;
        self.release_blocks(&mut dir)?;
        self.dealloc_inode(ino)?;

        info!("rmdir {path}: inode {ino}");
        Ok(())
    }

    /// 写入整个文件：路径已存在时覆盖（经软链接则覆盖其目标），否则新建
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FILE_SIZE {
            return Err(Error::CapacityExceeded(format!(
                "{} bytes exceed the file size limit of {MAX_FILE_SIZE}",
                data.len()
            )));
        }

        let (parent_path, name) = split_last(path)?;
        let parent = self.resolve(&parent_path)?;
        self.dir_inode(parent, &parent_path)?;
        let needed = self.geometry.blocks_needed(data.len());

        let ino = match self.find_entry(parent, name)? {
            Some(ino) => {
                let ino = self.follow(ino, 0)?;
                let mut inode = *self.inode(ino)?;
                if inode.is_dir() {
                    return Err(Error::IsADirectory(path.to_owned()));
                }
                // 旧内容占用的块会先被释放
                let reclaimed = self.occupied_blocks(&inode)?.len() as u64;
                self.reserve(0, needed.saturating_sub(reclaimed))?;

                self.release_blocks(&mut inode)?;
                inode.touch();
                self.store_inode(ino, inode)?;
                ino
            }
            None => {
                validate_name(name)?;
                self.reserve(1, needed + self.growth(parent, DirEntry::SIZE)?)?;

                let ino = self.alloc_inode()?;
                self.update_inode(ino, |inode| inode.init(DiskInodeKind::File))?;
                self.append_entry(parent, name, ino)?;
                ino
            }
        };

        self.write_at(ino, 0, data)?;
        info!("write {path}: inode {ino}, {} bytes", data.len());
        Ok(())
    }

    /// 读出整个文件，经软链接则读其目标
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let ino = self.resolve(path)?;
        let inode = self.inode(ino)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory(path.to_owned()));
        }
        self.read_content(inode)
    }

    /// 在 `dest` 处新建指向 `src` 所在 inode 的目录项
    pub fn hard_link(&mut self, src: &str, dest: &str) -> Result<()> {
        let (_, _, ino) = self.existing_entry(src)?;
        if self.inode(ino)?.is_dir() {
            return Err(Error::IsADirectory(src.to_owned()));
        }

        let links = self
            .inode(ino)?
            .links
            .checked_add(1)
            .ok_or_else(|| Error::CapacityExceeded(format!("{src} cannot take more links")))?;

        let (parent, name) = self.new_entry(dest)?;
        self.reserve(0, self.growth(parent, DirEntry::SIZE)?)?;
        self.append_entry(parent, name, ino)?;
        self.update_inode(ino, |inode| inode.links = links)?;

        info!("link {dest} -> inode {ino} ({links} links)");
        Ok(())
    }

    /// 在 `dest` 处新建内容为 `src` 的软链接。
    ///
    /// `src` 必须存在；指向目录时链接记为符号目录，否则记为符号文件。
    pub fn soft_link(&mut self, src: &str, dest: &str) -> Result<()> {
        let kind = if self.inode(self.resolve(src)?)?.is_dir() {
            DiskInodeKind::SymDirectory
        } else {
            DiskInodeKind::SymFile
        };

        let (parent, name) = self.new_entry(dest)?;
        let needed = self.geometry.blocks_needed(src.len());
        self.reserve(1, needed + self.growth(parent, DirEntry::SIZE)?)?;

        let ino = self.alloc_inode()?;
        self.update_inode(ino, |inode| inode.init(kind))?;
        self.append_entry(parent, name, ino)?;
        self.write_at(ino, 0, src.as_bytes())?;

        info!("symlink {dest} -> {src}: inode {ino}");
        Ok(())
    }

    /// 删除文件或软链接的目录项，最后一个链接消失时回收 inode
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let (parent, name, ino) = self.existing_entry(path)?;
        let mut inode = *self.inode(ino)?;
        match inode.kind {
            DiskInodeKind::Directory => return Err(Error::IsADirectory(path.to_owned())),
            DiskInodeKind::Empty => {
                return Err(Error::corruption(format!(
                    "{path} refers to the free inode {ino}"
                )))
            }
            _ => {}
        }
        if inode.links == 0 {
            return Err(Error::corruption(format!(
                "inode {ino} of {path} has no links left"
            )));
        }

        if inode.links == 1 {
            // 回收 inode 可能要为空闲 inode 链表再取一块
            let reclaimed = self.occupied_blocks(&inode)?.len() as u64;
            self.reserve(0, self.inode_release_cost()?.saturating_sub(reclaimed))?;
        }

        self.remove_entry(parent, name)?;
        inode.links -= 1;
        if inode.links == 0 {
            self.release_blocks(&mut inode)?;
            self.dealloc_inode(ino)?;
            info!("delete {path}: inode {ino} freed");
        } else {
            self.store_inode(ino, inode)?;
            info!("unlink {path}: inode {ino} keeps {} links", inode.links);
        }
        Ok(())
    }

    /// 跟随软链接
    pub fn stat(&self, path: &str) -> Result<Stat> {
        self.stat_of(self.resolve(path)?)
    }

    /// 不跟随最后一段的软链接
    pub fn lstat(&self, path: &str) -> Result<Stat> {
        self.stat_of(self.resolve_at(path, false, 0)?)
    }

    /// 软链接中记录的路径
    pub fn read_link(&self, path: &str) -> Result<String> {
        let ino = self.resolve_at(path, false, 0)?;
        let inode = self.inode(ino)?;
        if !inode.is_symlink() {
            return Err(Error::InvalidArgument(format!("{path} is not a symbolic link")));
        }
        self.link_target(inode)
    }

    /// 解析路径，沿途与末尾的软链接都会被跟随
    pub fn resolve(&self, path: &str) -> Result<u16> {
        self.resolve_at(path, true, 0)
    }

    fn resolve_at(&self, path: &str, follow_last: bool, depth: usize) -> Result<u16> {
        let parts = components(path)?;
        let mut ino = ROOT_INO;

        for name in parts {
            ino = self.follow(ino, depth)?;
            let dir = self.inode(ino)?;
            if !dir.is_dir() {
                return Err(Error::NotADirectory(path.to_owned()));
            }
            ino = self
                .lookup(dir, name)?
                .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        }

        if follow_last {
            ino = self.follow(ino, depth)?;
        }
        Ok(ino)
    }

    /// 软链接替换为它指向的 inode，其余原样返回
    fn follow(&self, mut ino: u16, mut depth: usize) -> Result<u16> {
        loop {
            let inode = self.inode(ino)?;
            if !inode.is_symlink() {
                return Ok(ino);
            }
            depth += 1;
            if depth > MAX_SYMLINK_DEPTH {
                return Err(Error::SymlinkLoop(self.link_target(inode)?));
            }
            let target = self.link_target(inode)?;
            debug!("follow symlink {ino} -> {target}");
            ino = self.resolve_at(&target, false, depth)?;
        }
    }

    fn link_target(&self, inode: &DiskInode) -> Result<String> {
        let content = self.read_content(inode)?;
        String::from_utf8(content).map_err(|_| Error::corruption("symbolic link target is not UTF-8"))
    }

    /// 在目录下通过名字获取目录项的 inode 编号
    fn lookup(&self, dir: &DiskInode, name: &str) -> Result<Option<u16>> {
        Ok(self
            .dir_entries(dir)?
            .into_iter()
            .find(|entry| entry.matches(name))
            .map(|entry| entry.inode_id()))
    }

    fn find_entry(&self, parent: u16, name: &str) -> Result<Option<u16>> {
        self.lookup(self.inode(parent)?, name)
    }

    pub(crate) fn dir_entries(&self, dir: &DiskInode) -> Result<Vec<DirEntry>> {
        if dir.size as usize % DirEntry::SIZE != 0 {
            return Err(Error::corruption(format!(
                "directory size {} is not a multiple of {}",
                dir.size,
                DirEntry::SIZE
            )));
        }

        let mut entries = Vec::with_capacity(dir.size as usize / DirEntry::SIZE);
        for block in self.load_blocks(dir)? {
            entries.extend(block.dir_entries());
        }
        Ok(entries)
    }

    fn dir_inode(&self, ino: u16, path: &str) -> Result<&DiskInode> {
        let inode = self.inode(ino)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory(path.to_owned()));
        }
        Ok(inode)
    }

    fn stat_of(&self, ino: u16) -> Result<Stat> {
        let inode = self.inode(ino)?;
        Ok(Stat {
            ino,
            kind: inode.kind,
            size: inode.size,
            links: inode.links,
            created: inode.created,
        })
    }

    /// 待新建的目录项：父目录存在且其中没有同名项
    fn new_entry<'p>(&self, path: &'p str) -> Result<(u16, &'p str)> {
        let (parent_path, name) = split_last(path)?;
        validate_name(name)?;
        let parent = self.resolve(&parent_path)?;
        let dir = self.dir_inode(parent, &parent_path)?;
        if self.lookup(dir, name)?.is_some() {
            return Err(Error::AlreadyExists(path.to_owned()));
        }
        Ok((parent, name))
    }

    /// 已存在的目录项：父目录、名字与其 inode 编号
    fn existing_entry<'p>(&self, path: &'p str) -> Result<(u16, &'p str, u16)> {
        let (parent_path, name) = split_last(path)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument(format!("{path} cannot be unlinked")));
        }
        let parent = self.resolve(&parent_path)?;
        let dir = self.dir_inode(parent, &parent_path)?;
        let ino = self
            .lookup(dir, name)?
            .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        Ok((parent, name, ino))
    }

    /// 在目录末尾追加一项
    fn append_entry(&mut self, parent: u16, name: &str, ino: u16) -> Result<()> {
        let size = self.inode(parent)?.size as usize;
        self.write_at(parent, size, &DirEntry::new(name, ino).to_bytes())?;
        self.update_inode(parent, DiskInode::touch)
    }

    /// 移除目录项：取出全部目录项，释放目录的所有块后写回剩余的项
    fn remove_entry(&mut self, parent: u16, name: &str) -> Result<u16> {
        let mut dir = *self.inode(parent)?;
        let mut entries = self.dir_entries(&dir)?;
        let pos = entries
            .iter()
            .skip(2)
            .position(|entry| entry.matches(name))
            .ok_or_else(|| Error::NotFound(name.to_owned()))?
            + 2;
        let removed = entries.remove(pos);

        let bytes: Vec<u8> = entries.iter().flat_map(|entry| entry.to_bytes()).collect();
        self.release_blocks(&mut dir)?;
        dir.touch();
        self.store_inode(parent, dir)?;
        self.write_at(parent, 0, &bytes)?;

        Ok(removed.inode_id())
    }

    /// 目录再增加 `extra` 字节需要的新块数
    fn growth(&self, ino: u16, extra: usize) -> Result<u64> {
        let size = self.inode(ino)?.size as usize;
        let geometry = &self.geometry;
        Ok(geometry.blocks_needed(size + extra) - geometry.blocks_needed(size))
    }

    /// 动手之前确认 inode 与块都够用
    fn reserve(&self, inodes: u16, blocks: u64) -> Result<()> {
        if self.super_block.free_inode_count < inodes {
            return Err(Error::ResourceExhausted(Resource::Inode));
        }
        if (self.super_block.free_block_count as u64) < blocks {
            return Err(Error::ResourceExhausted(Resource::Block));
        }
        Ok(())
    }

    /// 自根目录广度优先遍历文件树，每个 inode 只访问一次。
    ///
    /// `visit` 收到 inode 编号与到达它的路径；同一 inode 的其余路径
    /// 由 `alias` 收到。
    pub(crate) fn walk_tree(
        &self,
        mut visit: impl FnMut(u16, &DiskInode, &str) -> Result<()>,
        mut alias: impl FnMut(u16, &str),
    ) -> Result<()> {
        let mut seen = vec![false; self.inodes.len()];
        let mut queue = std::collections::VecDeque::from([(ROOT_INO, "/".to_owned())]);
        seen[ROOT_INO as usize] = true;

        while let Some((ino, path)) = queue.pop_front() {
            let inode = self.inode(ino)?;
            visit(ino, inode, &path)?;
            if !inode.is_dir() {
                continue;
            }

            for entry in self.dir_entries(inode)?.into_iter().skip(2) {
                let child = entry.inode_id();
                let child_path = match path.as_str() {
                    "/" => format!("/{}", entry.name()),
                    _ => format!("{path}/{}", entry.name()),
                };
                match seen.get_mut(child as usize) {
                    Some(true) => alias(child, &child_path),
                    Some(flag) => {
                        *flag = true;
                        queue.push_back((child, child_path));
                    }
                    None => warn!("{child_path} refers to inode {child} beyond the table"),
                }
            }
        }

        Ok(())
    }
}
