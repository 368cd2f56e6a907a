mod cli;

use std::fs;
use std::io::{self, Write};

use anyhow::{bail, Context};
use clap::Parser;
use ext2_sim::FileSystem;
use ext2_sim_cli::{print_dump, print_fsck, print_listing};

use self::cli::{Cli, Command, ImageCommand};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    log::debug!("{cli:?}");
    let mut out = io::stdout().lock();

    let command = match cli.command {
        Command::Mkfs { block_size, inodes } => {
            let fs = FileSystem::create(&cli.image, block_size, inodes)
                .with_context(|| format!("cannot create {}", cli.image.display()))?;
            let sb = fs.super_block();
            writeln!(
                out,
                "{}: {} blocks of {} KiB, {} inodes, {} free blocks",
                cli.image.display(),
                fs.geometry().total_blocks,
                sb.block_size_kib,
                sb.inode_count,
                sb.free_block_count
            )?;
            return Ok(());
        }
        Command::Image(command) => command,
    };

    let mut fs = FileSystem::open(&cli.image)
        .with_context(|| format!("cannot open {}", cli.image.display()))?;

    match command {
        ImageCommand::List { path } => print_listing(&mut out, &fs.list(&path)?)?,
        ImageCommand::Mkdir { path } => fs.mkdir(&path)?,
        ImageCommand::Rmdir { path } => fs.rmdir(&path)?,
        ImageCommand::Dumpe2fs => print_dump(&mut out, &fs.dump_info()?)?,
        ImageCommand::Write { host, path } => {
            let data = fs::read(&host).with_context(|| format!("cannot read {}", host.display()))?;
            fs.write_file(&path, &data)?;
        }
        ImageCommand::Read { path, host } => {
            let data = fs.read_file(&path)?;
            fs::write(&host, data).with_context(|| format!("cannot write {}", host.display()))?;
        }
        ImageCommand::Ln { src, dest } => fs.hard_link(&src, &dest)?,
        ImageCommand::Lnsym { src, dest } => fs.soft_link(&src, &dest)?,
        ImageCommand::Del { path } => fs.delete(&path)?,
        ImageCommand::Fsck => {
            let report = fs.check()?;
            print_fsck(&mut out, &report)?;
            if !report.is_clean() {
                bail!("{} is inconsistent", cli.image.display());
            }
        }
    }

    Ok(())
}
