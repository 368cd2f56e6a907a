use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operate on a 1 MiB ext2-like filesystem image
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Image file
    #[arg(long, short, default_value = "disk.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a fresh image, replacing any existing file
    Mkfs {
        /// Block size in KiB, a power of two
        #[arg(long, short, default_value_t = 1)]
        block_size: usize,

        /// Number of inodes, including the root directory
        #[arg(long, short = 'n', default_value_t = 1024)]
        inodes: usize,
    },

    #[command(flatten)]
    Image(ImageCommand),
}

/// Commands that work on an existing image
#[derive(Debug, Subcommand)]
pub enum ImageCommand {
    /// List a directory
    List {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Create a directory
    Mkdir { path: String },

    /// Remove an empty directory
    Rmdir { path: String },

    /// Print superblock counters, free lists and inode usage
    Dumpe2fs,

    /// Copy a host file into the image
    Write { host: PathBuf, path: String },

    /// Copy a file out of the image
    Read { path: String, host: PathBuf },

    /// Create a hard link
    Ln { src: String, dest: String },

    /// Create a symbolic link
    Lnsym { src: String, dest: String },

    /// Remove a file or symbolic link
    Del { path: String },

    /// Cross-check free lists against the directory tree
    Fsck,
}
