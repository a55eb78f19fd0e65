use std::fs;
use std::io::Write;

use anyhow::{bail, Context};
use colored::Colorize;
use mfs_buffer::ByteBuffer;
use mfs_format::{
    decode_any, Attribute, DataspaceHeader, DatatypeHeader, MerkleNode, MerkleNodeHeader,
    SymbolTable,
};
use mfs_store::{MerkleFile, StoreConfig, VerifyReport};
use mfs_types::{ContentHash, MfsType};

use crate::cli::*;

/// Dispatch a parsed command line to its handler.
pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init(args) => cmd_init(args),
        Command::Hash(args) => cmd_hash(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Put(args) => cmd_put(args),
        Command::Cat(args) => cmd_cat(args),
        Command::Ls(args) => cmd_ls(args),
        Command::Rm(args) => cmd_rm(args),
        Command::Verify(args) => cmd_verify(args),
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<()> {
    let config = StoreConfig {
        fsync: args.fsync,
        verify_on_read: !args.no_verify,
    };
    let mfs = MerkleFile::init(&args.dir, config)?;
    println!(
        "{} Initialized MFS in {}",
        "✓".green().bold(),
        mfs.path().display().to_string().bold()
    );
    Ok(())
}

fn cmd_hash(args: HashArgs) -> anyhow::Result<()> {
    for path in &args.files {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        println!("{}  {}", ContentHash::digest(&bytes), path.display());
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let bytes = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let mut buf = ByteBuffer::from_bytes(&bytes);
    while buf.remaining() > 0 {
        let offset = buf.offset();
        // Zero bytes past the last record are padding.
        if buf.peek_u8()? == MfsType::NIL.as_u8() {
            break;
        }
        let header = decode_any(&mut buf)
            .with_context(|| format!("decoding record at offset {offset}"))?;
        buf.seek(offset)?;
        println!(
            "{} {} {}",
            format!("@{offset:<6}").dimmed(),
            header.mfs_type().to_string().cyan().bold(),
            format!("(body {} bytes)", header.total_size()).dimmed()
        );
        for line in describe_record(header.mfs_type(), &mut buf)
            .with_context(|| format!("decoding {} at offset {offset}", header.mfs_type()))?
        {
            println!("    {line}");
        }
        buf.align()?;
    }
    Ok(())
}

/// Fully decode the record at the cursor and describe it, leaving the cursor after it.
fn describe_record(tag: MfsType, buf: &mut ByteBuffer) -> anyhow::Result<Vec<String>> {
    let lines = match tag {
        MfsType::DATATYPE => vec![describe_datatype(&DatatypeHeader::decode(buf)?)],
        MfsType::DATASPACE => vec![describe_dataspace(&DataspaceHeader::decode(buf)?)],
        MfsType::SYMBOL_TABLE => SymbolTable::decode(buf)?
            .entries()
            .iter()
            .map(|entry| format!("[{}] {:?}", entry.index, entry.symbol))
            .collect(),
        MfsType::ATTRIBUTE => {
            let attr = Attribute::decode(buf)?;
            vec![
                format!("name:      {:?}", attr.name()),
                format!("datatype:  {}", describe_datatype(attr.datatype())),
                format!("dataspace: {}", describe_dataspace(attr.dataspace())),
                format!("data:      {} bytes", attr.data().len()),
            ]
        }
        MfsType::MERKLE_NODE => MerkleNodeHeader::decode(buf)?
            .objects()
            .iter()
            .map(describe_child)
            .collect(),
        other => bail!("no describer for {other}"),
    };
    Ok(lines)
}

fn describe_datatype(dt: &DatatypeHeader) -> String {
    let class = dt
        .class()
        .map(|c| format!("{c:?}"))
        .unwrap_or_else(|| format!("code {:#04x}", dt.code()));
    format!(
        "{class}, {} byte(s), flags {:#06x}",
        dt.element_size(),
        dt.flags()
    )
}

fn describe_dataspace(ds: &DataspaceHeader) -> String {
    if ds.is_scalar() {
        return "scalar".into();
    }
    let shape: Vec<String> = ds.shape().iter().map(u64::to_string).collect();
    format!("({})", shape.join(", "))
}

fn describe_child(child: &MerkleNode) -> String {
    let line = format!(
        "{:<13} {:>3} {:#06x} {}",
        child.mfs_type.to_string(),
        child.mode,
        child.flags,
        child.hash
    );
    if child.is_tombstone() {
        line.dimmed().strikethrough().to_string()
    } else {
        line
    }
}

/// Tag of a file's content: the record it decodes as, or a raw blob.
fn detect_tag(bytes: &[u8]) -> MfsType {
    decode_any(&mut ByteBuffer::from_bytes(bytes))
        .map(|header| header.mfs_type())
        .unwrap_or(MfsType::BLOB)
}

/// Current root node, or an empty one when no root is set.
fn load_root(mfs: &MerkleFile) -> anyhow::Result<MerkleNodeHeader> {
    match mfs.root()? {
        Some(hash) => Ok(mfs.tree().get_node(&hash)?),
        None => Ok(MerkleNodeHeader::new()),
    }
}

fn require_root(mfs: &MerkleFile, hash: Option<ContentHash>) -> anyhow::Result<ContentHash> {
    match hash {
        Some(hash) => Ok(hash),
        None => mfs
            .root()?
            .with_context(|| format!("no root set in {}", mfs.path().display())),
    }
}

fn cmd_put(args: PutArgs) -> anyhow::Result<()> {
    let mfs = MerkleFile::open(&args.dir)?;
    let bytes = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let tag = args.tag.unwrap_or_else(|| detect_tag(&bytes));

    let tree = mfs.tree();
    let child = tree.put_block(tag, &bytes)?;
    let mut root = load_root(&mfs)?;
    root.add_child(child)?;
    let root_hash = tree.put_node(&root)?;
    mfs.set_root(&root_hash)?;

    println!("{} Stored {} as {}", "✓".green(), args.file.display(), tag.to_string().cyan());
    println!("  Block: {}", child.hash.to_string().yellow());
    println!("  Root:  {}", root_hash.to_string().yellow());
    Ok(())
}

fn cmd_cat(args: CatArgs) -> anyhow::Result<()> {
    let mfs = MerkleFile::open(&args.dir)?;
    let bytes = mfs.tree().get_block(&args.hash)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_ls(args: LsArgs) -> anyhow::Result<()> {
    let mfs = MerkleFile::open(&args.dir)?;
    let hash = require_root(&mfs, args.hash)?;
    let tree = mfs.tree();

    if args.recursive {
        for entry in tree.walk(&hash)? {
            let indent = "  ".repeat(entry.depth - 1);
            println!("{indent}{}", describe_child(&entry.node));
        }
        return Ok(());
    }

    let node = tree.get_node(&hash)?;
    for child in node.objects() {
        if child.is_tombstone() && !args.all {
            continue;
        }
        println!("{}", describe_child(child));
    }
    Ok(())
}

fn cmd_rm(args: RmArgs) -> anyhow::Result<()> {
    let mfs = MerkleFile::open(&args.dir)?;
    let mut root = load_root(&mfs)?;
    if !root.delete_child(&args.hash) {
        bail!("{} is not a live child of the root", args.hash);
    }
    if args.compact {
        root.compact();
    }
    let root_hash = mfs.tree().put_node(&root)?;
    mfs.set_root(&root_hash)?;
    println!("{} Removed {}", "✓".green(), args.hash.to_string().yellow());
    println!("  Root:  {}", root_hash.to_string().yellow());
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<()> {
    let mfs = MerkleFile::open(&args.dir)?;
    let hash = require_root(&mfs, args.hash)?;
    let report = mfs.tree().verify(&hash)?;
    print_report(&hash, &report);
    if !report.is_valid() {
        bail!(
            "{} missing and {} corrupt block(s)",
            report.missing.len(),
            report.corrupt.len()
        );
    }
    Ok(())
}

fn print_report(root: &ContentHash, report: &VerifyReport) {
    if report.is_valid() {
        println!("{} Tree {} verified", "✓".green().bold(), root.short_hex().yellow());
    } else {
        println!("{} Tree {} is damaged", "✗".red().bold(), root.short_hex().yellow());
    }
    println!("  Nodes:  {}", report.nodes);
    println!("  Blocks: {}", report.blocks);
    for hash in &report.missing {
        println!("  {} {}", "missing".red(), hash);
    }
    for hash in &report.corrupt {
        println!("  {} {}", "corrupt".red(), hash);
    }
}
