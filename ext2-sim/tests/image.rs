mod common;

use common::{pattern, scratch};
use ext2_sim::{Error, FileSystem, Resource, MAX_FILE_SIZE};

#[test]
fn small_disk_walkthrough() {
    let mut s = scratch(1, 16);
    s.fs.mkdir("/a").unwrap();
    let data = pattern(100);
    s.fs.write_file("/a/f", &data).unwrap();
    assert_eq!(s.fs.read_file("/a/f").unwrap(), data);

    s.fs.delete("/a/f").unwrap();
    s.fs.rmdir("/a").unwrap();
    s.assert_clean();
}

#[test]
fn create_then_open_reproduces_the_image() {
    for (bs, n) in [(1, 16), (2, 100), (4, 8), (64, 30)] {
        let mut s = scratch(bs, n);
        s.fs.mkdir("/d").unwrap();
        s.fs.write_file("/d/x", b"hello").unwrap();

        let super_block = *s.fs.super_block();
        let inodes = s.fs.inodes().to_vec();
        s.reopen();
        assert_eq!(*s.fs.super_block(), super_block);
        assert_eq!(s.fs.inodes(), &inodes[..]);
        assert_eq!(s.fs.read_file("/d/x").unwrap(), b"hello");
        s.assert_clean();
    }
}

#[test]
fn too_many_inodes_leave_no_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let max = ext2_sim::layout::Geometry::max_inode_count(1).unwrap();

    let err = FileSystem::create(&path, 1, max + 1).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)), "{err}");
    assert!(!path.exists());

    let err = FileSystem::create(&path, 3, 16).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    assert!(!path.exists());
}

#[test]
fn fresh_image_is_clean() {
    for (bs, n) in [(1, 16), (1, 2000), (2, 513), (8, 64), (128, 11565)] {
        let s = scratch(bs, n);
        s.assert_clean();
        assert_eq!(s.used_inodes(), 1);
    }
}

#[test]
fn files_span_the_index_tiers() {
    let mut s = scratch(1, 16);
    let free = s.fs.super_block().free_block_count;
    // 直接、一级、二级索引
    let sizes = [1024 * 5, 1024 * 5 + 1, 1024 * (5 + 511), 1024 * (5 + 511) + 4000];
    for &size in &sizes {
        let data = pattern(size);
        s.fs.write_file("/f", &data).unwrap();
        s.reopen();
        assert_eq!(s.fs.read_file("/f").unwrap(), data, "{size} bytes");
        s.assert_clean();
        s.fs.delete("/f").unwrap();
        assert_eq!(s.fs.super_block().free_block_count, free);
    }
}

#[test]
fn largest_files() {
    let mut s = scratch(1, 4);
    // 1000 个数据块 + 3 个索引块，几乎占满整个盘
    let data = pattern(1000 * 1024);
    s.fs.write_file("/big", &data).unwrap();
    assert_eq!(s.fs.read_file("/big").unwrap(), data);
    s.assert_clean();
    s.fs.delete("/big").unwrap();

    // 1 MiB 的文件加上索引块放不进 1 MiB 的盘
    let err = s.fs.write_file("/max", &pattern(MAX_FILE_SIZE)).unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(Resource::Block)), "{err}");
    let err = s.fs.write_file("/max", &vec![0; MAX_FILE_SIZE + 1]).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)), "{err}");
    assert_eq!(s.used_inodes(), 1);
    s.assert_clean();
}

#[test]
fn overwrite_replaces_content() {
    let mut s = scratch(1, 16);
    s.fs.write_file("/f", &pattern(9000)).unwrap();
    let free = s.fs.super_block().free_block_count;

    s.fs.write_file("/f", b"short").unwrap();
    assert_eq!(s.fs.read_file("/f").unwrap(), b"short");
    assert_eq!(s.fs.stat("/f").unwrap().size, 5);
    // 9 个数据块 + 1 个索引块只剩 1 块
    assert_eq!(s.fs.super_block().free_block_count, free + 9);
    s.assert_clean();
}

#[test]
fn inode_count_is_conserved() {
    let mut s = scratch(1, 16);
    let total = s.fs.super_block().inode_count as usize;
    let check = |s: &common::Scratch| {
        assert_eq!(s.fs.super_block().free_inode_count as usize + s.used_inodes(), total);
    };

    s.fs.mkdir("/a").unwrap();
    check(&s);
    for i in 0..6 {
        s.fs.write_file(&format!("/a/f{i}"), b"x").unwrap();
        check(&s);
    }
    s.fs.hard_link("/a/f0", "/h").unwrap();
    s.fs.soft_link("/a/f1", "/s").unwrap();
    check(&s);
    for i in 0..6 {
        s.fs.delete(&format!("/a/f{i}")).unwrap();
        check(&s);
    }
    s.fs.delete("/h").unwrap();
    s.fs.delete("/s").unwrap();
    s.fs.rmdir("/a").unwrap();
    check(&s);
    assert_eq!(s.used_inodes(), 1);
    s.assert_clean();
}

#[test]
fn inodes_run_out() {
    let mut s = scratch(1, 3);
    s.fs.write_file("/a", b"1").unwrap();
    s.fs.write_file("/b", b"2").unwrap();

    let err = s.fs.write_file("/c", b"3").unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(Resource::Inode)), "{err}");
    s.assert_clean();

    s.fs.delete("/a").unwrap();
    s.fs.write_file("/c", b"3").unwrap();
    s.assert_clean();
}

#[test]
fn inode_list_grows_and_drains() {
    // 每个链表节点只有 511 个单元，释放足够多的 inode 后需要新节点
    let mut s = scratch(1, 600);
    let names: Vec<String> = (0..599).map(|i| format!("/f{i}")).collect();
    for name in &names {
        s.fs.write_file(name, b"").unwrap();
    }
    assert_eq!(s.fs.super_block().free_inode_count, 0);
    s.assert_clean();

    for name in &names {
        s.fs.delete(name).unwrap();
    }
    assert_eq!(s.fs.super_block().free_inode_count, 599);
    s.assert_clean();

    s.reopen();
    s.fs.write_file("/again", b"ok").unwrap();
    s.assert_clean();
}

#[test]
fn delete_on_a_full_disk_keeps_the_inode() {
    let mut s = scratch(1, 600);
    let names: Vec<String> = (0..599).map(|i| format!("/f{i}")).collect();
    for name in &names {
        s.fs.write_file(name, b"").unwrap();
    }
    // 空闲 inode 链表的栈顶节点恰好填满
    for name in &names[..511] {
        s.fs.delete(name).unwrap();
    }

    let geometry = s.fs.geometry().clone();
    for name in names[596..].iter().rev() {
        let free = s.fs.super_block().free_block_count as u64;
        let mut n = free;
        while geometry.blocks_needed(n as usize * geometry.block_bytes) > free {
            n -= 1;
        }
        s.fs.write_file(name, &pattern(n as usize * geometry.block_bytes)).unwrap();
    }
    assert_eq!(s.fs.super_block().free_block_count, 0);

    let err = s.fs.delete("/f511").unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(Resource::Block)), "{err}");
    assert_eq!(s.fs.read_file("/f511").unwrap(), b"");
    assert_eq!(s.fs.super_block().free_inode_count, 511);
    s.assert_clean();

    s.fs.write_file("/f598", b"").unwrap();
    s.fs.delete("/f511").unwrap();
    assert_eq!(s.fs.super_block().free_inode_count, 512);
    s.assert_clean();
}

#[test]
fn blocks_run_out() {
    let mut s = scratch(64, 8);
    // 64 KiB 块：16 块，其中 1 个超级块、1 个 inode 表、1 个 inode 链表、1 个根目录
    let free = s.fs.super_block().free_block_count as usize;
    assert_eq!(free, 12);

    s.fs.write_file("/f", &pattern(64 * 1024 * 5)).unwrap();
    s.fs.write_file("/g", &pattern(64 * 1024 * 5)).unwrap();
    let err = s.fs.write_file("/h", &pattern(64 * 1024 * 3)).unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(Resource::Block)), "{err}");
    s.assert_clean();
}

#[test]
fn bad_paths_and_names() {
    let mut s = scratch(1, 16);
    let invalid = |r: Result<(), Error>| matches!(r, Err(Error::InvalidArgument(_)));

    assert!(invalid(s.fs.mkdir("relative")));
    assert!(invalid(s.fs.mkdir("/toolong")));
    assert!(invalid(s.fs.mkdir("/")));
    assert!(invalid(s.fs.write_file("/a b", b"")));
    assert!(matches!(s.fs.read_file("/nope"), Err(Error::NotFound(_))));
    assert!(matches!(s.fs.read_file("/"), Err(Error::IsADirectory(_))));
    assert!(matches!(s.fs.list("/nope/x"), Err(Error::NotFound(_))));
}
