use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mfs_types::{ContentHash, MfsType};

#[derive(Parser)]
#[command(
    name = "mfs",
    about = "MFS: content-addressed Merkle file store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a Merkle file directory
    Init(InitArgs),
    /// Print the SHA-1 content hash of a file
    Hash(HashArgs),
    /// Decode and describe the records in a file
    Inspect(InspectArgs),
    /// Store a file as a block and link it under the root node
    Put(PutArgs),
    /// Write a stored block to stdout
    Cat(CatArgs),
    /// List the children of a node
    Ls(LsArgs),
    /// Unlink a child from the root node
    Rm(RmArgs),
    /// Check every block reachable from a node
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub dir: PathBuf,
    /// Flush every block to disk before linking it
    #[arg(long)]
    pub fsync: bool,
    /// Skip hash verification on read
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Args)]
pub struct HashArgs {
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct PutArgs {
    pub dir: PathBuf,
    pub file: PathBuf,
    /// Type tag for the reference (name such as `blob`, or a byte such as `0x40`).
    /// Detected from the file's leading byte when omitted.
    #[arg(long)]
    pub tag: Option<MfsType>,
}

#[derive(Args)]
pub struct CatArgs {
    pub dir: PathBuf,
    pub hash: ContentHash,
}

#[derive(Args)]
pub struct LsArgs {
    pub dir: PathBuf,
    /// Node to list (defaults to the root)
    pub hash: Option<ContentHash>,
    /// Include tombstoned children
    #[arg(short, long)]
    pub all: bool,
    /// Descend into child nodes
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct RmArgs {
    pub dir: PathBuf,
    pub hash: ContentHash,
    /// Drop tombstones from the rewritten node
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub dir: PathBuf,
    /// Node to verify from (defaults to the root)
    pub hash: Option<ContentHash>,
}
