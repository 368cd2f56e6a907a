//! Console rendering of listings, image dumps and fsck reports.


use std::io::{self, Write};

use chrono::NaiveDate;
use ext2_sim::layout::{DiskInodeKind, Timestamp};
use ext2_sim::{DirListing, FsInfo, FsckReport, Resource};

/// `ls -l` style type letter
pub fn kind_letter(kind: DiskInodeKind) -> char {
    match kind {
        DiskInodeKind::Directory => 'd',
        DiskInodeKind::File => '-',
        DiskInodeKind::SymDirectory | DiskInodeKind::SymFile => 'l',
        DiskInodeKind::Empty => '?',
    }
}

pub fn format_timestamp(t: &Timestamp) -> String {
    NaiveDate::from_ymd_opt(t.year.into(), t.month.into(), t.day.into())
        .and_then(|date| date.and_hms_opt(t.hour.into(), t.min.into(), t.sec.into()))
        .map(|time| time.format("%b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| "??? ?? ??:??:?? ????".to_owned())
}

/// Collapses a sorted address list into `a-b` runs.
pub fn format_ranges(addrs: &[u16]) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut iter = addrs.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while end < u16::MAX && iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            runs.push(start.to_string());
        } else {
            runs.push(format!("{start}-{end}"));
        }
    }

    runs.join(", ")
}

pub fn print_listing(out: &mut impl Write, entries: &[DirListing]) -> io::Result<()> {
    for entry in entries {
        let stat = &entry.stat;
        writeln!(
            out,
            "{} {:>3} {:>8} {} {}",
            kind_letter(stat.kind),
            stat.links,
            stat.size,
            format_timestamp(&stat.created),
            entry.name
        )?;
    }
    Ok(())
}

pub fn print_dump(out: &mut impl Write, info: &FsInfo) -> io::Result<()> {
    writeln!(out, "Block size:        {} KiB", info.block_size_kib)?;
    writeln!(out, "Block count:       {}", info.total_blocks)?;
    writeln!(out, "Free blocks:       {}", info.free_block_count)?;
    writeln!(out, "Inode count:       {}", info.inode_count)?;
    writeln!(out, "Free inodes:       {}", info.free_inode_count)?;
    writeln!(out, "Directories:       {}", info.dir_count)?;
    writeln!(out, "Files:             {}", info.file_count)?;
    writeln!(out, "Free block list:   {}", format_ranges(&info.free_blocks))?;
    writeln!(out, "Free inode list:   {}", format_ranges(&info.free_inodes))?;
    writeln!(out)?;

    for usage in &info.inodes {
        writeln!(
            out,
            "Inode {} ({}, {} bytes, {} links, created {})",
            usage.ino,
            kind_letter(usage.kind),
            usage.size,
            usage.links,
            format_timestamp(&usage.created)
        )?;
        writeln!(out, "  names:  {}", usage.names.join(" "))?;
        let mut blocks = usage.blocks.clone();
        blocks.sort_unstable();
        writeln!(out, "  blocks: {}", format_ranges(&blocks))?;
    }
    Ok(())
}

pub fn print_fsck(out: &mut impl Write, report: &FsckReport) -> io::Result<()> {
    let mut problems = 0;
    for (resource, occupancy) in report.problems() {
        if problems == 0 {
            writeln!(out, "{:<6} {:>6} {:>5} {:>5}  problem", "kind", "addr", "free", "used")?;
        }
        let flags: Vec<String> = occupancy
            .anomalies()
            .iter()
            .map(|anomaly| format!("{anomaly:?}"))
            .collect();
        writeln!(
            out,
            "{:<6} {:>6} {:>5} {:>5}  {}",
            resource,
            occupancy.addr,
            occupancy.free,
            occupancy.used,
            flags.join(",")
        )?;
        problems += 1;
    }

    for ino in &report.orphans {
        writeln!(out, "inode {ino} is in use but not reachable from /")?;
    }
    for list in &report.broken_lists {
        let name = match list {
            Resource::Inode => "free inode list",
            Resource::Block => "free block list",
        };
        writeln!(out, "{name} is broken; counts may be incomplete")?;
    }

    writeln!(
        out,
        "{} blocks, {} inodes checked: {}",
        report.blocks.len(),
        report.inodes.len(),
        if report.is_clean() {
            "clean".to_owned()
        } else {
            format!("{problems} problems")
        }
    )
}
