mod common;

use common::{pattern, scratch};
use ext2_sim::layout::DiskInodeKind;
use ext2_sim::{Error, MAX_SYMLINK_DEPTH};

#[test]
fn hard_link_outlives_the_original() {
    let mut s = scratch(1, 16);
    let data = pattern(3000);
    s.fs.write_file("/f", &data).unwrap();
    s.fs.mkdir("/d").unwrap();
    s.fs.hard_link("/f", "/d/g").unwrap();

    let stat = s.fs.stat("/d/g").unwrap();
    assert_eq!(stat.links, 2);
    assert_eq!(stat.ino, s.fs.stat("/f").unwrap().ino);
    s.assert_clean();

    s.fs.delete("/f").unwrap();
    assert_eq!(s.fs.read_file("/d/g").unwrap(), data);
    assert_eq!(s.fs.stat("/d/g").unwrap().links, 1);

    let free = s.fs.super_block().free_block_count;
    s.fs.delete("/d/g").unwrap();
    assert_eq!(s.fs.super_block().free_block_count, free + 3);
    assert!(matches!(s.fs.stat("/d/g"), Err(Error::NotFound(_))));
    s.assert_clean();
}

#[test]
fn directories_cannot_be_hard_linked() {
    let mut s = scratch(1, 16);
    s.fs.mkdir("/d").unwrap();
    assert!(matches!(s.fs.hard_link("/d", "/e"), Err(Error::IsADirectory(_))));
    assert!(matches!(s.fs.delete("/d"), Err(Error::IsADirectory(_))));
}

#[test]
fn links_refuse_existing_names() {
    let mut s = scratch(1, 16);
    s.fs.write_file("/a", b"a").unwrap();
    s.fs.write_file("/b", b"b").unwrap();

    assert!(matches!(s.fs.hard_link("/a", "/b"), Err(Error::AlreadyExists(_))));
    assert!(matches!(s.fs.soft_link("/a", "/b"), Err(Error::AlreadyExists(_))));
    assert!(matches!(s.fs.mkdir("/b"), Err(Error::AlreadyExists(_))));
    assert_eq!(s.fs.read_file("/b").unwrap(), b"b");
}

#[test]
fn soft_links_are_followed() {
    let mut s = scratch(1, 16);
    s.fs.mkdir("/d").unwrap();
    s.fs.write_file("/d/f", b"inside").unwrap();
    s.fs.soft_link("/d", "/sd").unwrap();
    s.fs.soft_link("/d/f", "/sf").unwrap();

    assert_eq!(s.fs.lstat("/sd").unwrap().kind, DiskInodeKind::SymDirectory);
    assert_eq!(s.fs.lstat("/sf").unwrap().kind, DiskInodeKind::SymFile);
    assert_eq!(s.fs.stat("/sd").unwrap().kind, DiskInodeKind::Directory);
    assert_eq!(s.fs.read_link("/sf").unwrap(), "/d/f");

    assert_eq!(s.fs.read_file("/sf").unwrap(), b"inside");
    assert_eq!(s.fs.read_file("/sd/f").unwrap(), b"inside");
    let names: Vec<_> = s.fs.list("/sd").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["f"]);

    // 经软链接覆盖写入目标
    s.fs.write_file("/sf", b"changed").unwrap();
    assert_eq!(s.fs.read_file("/d/f").unwrap(), b"changed");
    assert_eq!(s.fs.lstat("/sf").unwrap().size, 4);

    // 经软链接目录新建文件
    s.fs.write_file("/sd/g", b"new").unwrap();
    assert_eq!(s.fs.read_file("/d/g").unwrap(), b"new");

    s.fs.delete("/sd").unwrap();
    s.fs.delete("/sf").unwrap();
    assert_eq!(s.fs.read_file("/d/f").unwrap(), b"changed");
    s.assert_clean();
}

#[test]
fn dangling_soft_links() {
    let mut s = scratch(1, 16);
    assert!(matches!(s.fs.soft_link("/missing", "/m"), Err(Error::NotFound(_))));
    assert!(matches!(s.fs.lstat("/m"), Err(Error::NotFound(_))));

    s.fs.write_file("/f", b"x").unwrap();
    s.fs.soft_link("/f", "/s").unwrap();
    s.fs.delete("/f").unwrap();

    assert!(matches!(s.fs.read_file("/s"), Err(Error::NotFound(_))));
    assert_eq!(s.fs.read_link("/s").unwrap(), "/f");
    s.assert_clean();
}

#[test]
fn soft_link_cycles_are_cut_off() {
    let mut s = scratch(1, 16);
    // 目标删除后，以硬链接把软链接本身挂回原来的名字
    s.fs.write_file("/l", b"l").unwrap();
    s.fs.soft_link("/l", "/self").unwrap();
    s.fs.delete("/l").unwrap();
    s.fs.hard_link("/self", "/l").unwrap();

    s.fs.write_file("/x", b"x").unwrap();
    s.fs.write_file("/y", b"y").unwrap();
    s.fs.soft_link("/x", "/a").unwrap();
    s.fs.soft_link("/y", "/b").unwrap();
    s.fs.delete("/x").unwrap();
    s.fs.delete("/y").unwrap();
    s.fs.hard_link("/b", "/x").unwrap();
    s.fs.hard_link("/a", "/y").unwrap();

    assert!(matches!(s.fs.read_file("/l"), Err(Error::SymlinkLoop(_))));
    assert!(matches!(s.fs.read_file("/a"), Err(Error::SymlinkLoop(_))));
    assert!(matches!(s.fs.write_file("/b", b"x"), Err(Error::SymlinkLoop(_))));
    assert!(matches!(s.fs.soft_link("/a", "/c"), Err(Error::SymlinkLoop(_))));
    assert_eq!(s.fs.read_link("/x").unwrap(), "/y");

    // 恰好 MAX_SYMLINK_DEPTH 层的链仍可解析
    s.fs.write_file("/t", b"end").unwrap();
    let mut target = "/t".to_owned();
    for i in 0..MAX_SYMLINK_DEPTH {
        let link = format!("/c{i}");
        s.fs.soft_link(&target, &link).unwrap();
        target = link;
    }
    assert_eq!(s.fs.read_file(&target).unwrap(), b"end");
    s.fs.soft_link(&target, "/over").unwrap();
    assert!(matches!(s.fs.read_file("/over"), Err(Error::SymlinkLoop(_))));
    s.assert_clean();
}

#[test]
fn mkdir_rmdir_reuses_resources() {
    let mut s = scratch(1, 16);
    let before = s.fs.list("/").unwrap().len();
    let sb = *s.fs.super_block();

    s.fs.mkdir("/d").unwrap();
    let ino = s.fs.stat("/d").unwrap().ino;
    s.fs.rmdir("/d").unwrap();

    assert_eq!(s.fs.list("/").unwrap().len(), before);
    assert_eq!(s.fs.super_block().free_inode_count, sb.free_inode_count);
    assert_eq!(s.fs.super_block().free_block_count, sb.free_block_count);

    s.fs.mkdir("/e").unwrap();
    assert_eq!(s.fs.stat("/e").unwrap().ino, ino);
    s.assert_clean();
}

#[test]
fn rmdir_checks_its_target() {
    let mut s = scratch(1, 16);
    s.fs.mkdir("/d").unwrap();
    s.fs.write_file("/d/f", b"x").unwrap();
    s.fs.soft_link("/d", "/s").unwrap();

    assert!(matches!(s.fs.rmdir("/d"), Err(Error::DirectoryNotEmpty(_))));
    assert!(matches!(s.fs.rmdir("/d/f"), Err(Error::NotADirectory(_))));
    assert!(matches!(s.fs.rmdir("/s"), Err(Error::NotADirectory(_))));
    assert!(matches!(s.fs.rmdir("/d/."), Err(Error::InvalidArgument(_))));
    assert!(matches!(s.fs.rmdir("/"), Err(Error::InvalidArgument(_))));
    s.assert_clean();
}

#[test]
fn listing_and_dump() {
    let mut s = scratch(1, 16);
    s.fs.mkdir("/d").unwrap();
    s.fs.write_file("/d/f", &pattern(1500)).unwrap();
    s.fs.hard_link("/d/f", "/h").unwrap();

    let listing = s.fs.list("/d/").unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "f");
    assert_eq!(listing[0].stat.size, 1500);
    assert_eq!(listing[0].stat.kind, DiskInodeKind::File);

    let info = s.fs.dump_info().unwrap();
    assert_eq!(info.dir_count, 2);
    assert_eq!(info.file_count, 1);
    assert_eq!(info.free_inodes.len(), 13);
    assert_eq!(info.free_blocks.len(), info.free_block_count as usize);

    let file = info.inodes.iter().find(|u| u.kind == DiskInodeKind::File).unwrap();
    assert_eq!(file.blocks.len(), 2);
    let mut names = file.names.clone();
    names.sort();
    assert_eq!(names, ["/d/f", "/h"]);
    assert_eq!(info.inodes[0].names, ["/"]);
}
