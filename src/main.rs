mod consts;
mod disk;
mod error;
mod fs;
mod mkfs;
mod path;
mod serve;
mod types;

use anyhow::{bail, Context};
use clap::{Arg, ArgMatches, Command};
use consts::{DEFAULT_BLOCK_SIZE, INODE_SIZE};
use disk::Disk;
use fs::Ufs;
use std::io::Write;
use types::{DirEntry, FileKind};

fn main() -> anyhow::Result<()> {
    let matches = Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("mkfs")
                .about("Create a new file system image")
                .arg(image_arg("Location of the new file system image"))
                .arg(block_size_arg())
                .arg(
                    Arg::new("inodes")
                        .short('i')
                        .long("inodes")
                        .default_value("32")
                        .help("Number of inodes"),
                )
                .arg(
                    Arg::new("data-blocks")
                        .short('d')
                        .long("data-blocks")
                        .default_value("32")
                        .help("Number of data blocks"),
                ),
        )
        .subcommand(
            Command::new("bits")
                .about("Print the superblock and allocation bitmaps")
                .arg(image_arg("Location of the file system image"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("cat")
                .about("Print a file's block list and content by inode number")
                .arg(image_arg("Location of the file system image"))
                .arg(Arg::new("inode").required(true).help("Inode number"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("cp")
                .about("Copy a host file's bytes into an existing inode")
                .arg(image_arg("Location of the file system image"))
                .arg(Arg::new("src").required(true).help("Host file to copy from"))
                .arg(Arg::new("inode").required(true).help("Destination inode number"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("ls")
                .about("List a directory by path")
                .arg(image_arg("Location of the file system image"))
                .arg(Arg::new("path").required(true).help("Path from the root, e.g. /a/b"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("mkdir")
                .about("Create a directory under a parent inode")
                .arg(image_arg("Location of the file system image"))
                .arg(Arg::new("parent").required(true).help("Parent directory inode number"))
                .arg(Arg::new("name").required(true).help("Directory name"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("touch")
                .about("Create a regular file under a parent inode")
                .arg(image_arg("Location of the file system image"))
                .arg(Arg::new("parent").required(true).help("Parent directory inode number"))
                .arg(Arg::new("name").required(true).help("File name"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("rm")
                .about("Unlink an entry under a parent inode")
                .arg(image_arg("Location of the file system image"))
                .arg(Arg::new("parent").required(true).help("Parent directory inode number"))
                .arg(Arg::new("name").required(true).help("Entry name"))
                .arg(block_size_arg()),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the image over HTTP")
                .arg(image_arg("Location of the file system image"))
                .arg(
                    Arg::new("addr")
                        .short('a')
                        .long("addr")
                        .default_value("127.0.0.1:8080")
                        .help("Address to listen on"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("mkfs", sub)) => cmd_mkfs(sub),
        Some(("bits", sub)) => cmd_bits(sub),
        Some(("cat", sub)) => cmd_cat(sub),
        Some(("cp", sub)) => cmd_cp(sub),
        Some(("ls", sub)) => cmd_ls(sub),
        Some(("mkdir", sub)) => cmd_create(sub, FileKind::Directory),
        Some(("touch", sub)) => cmd_create(sub, FileKind::Regular),
        Some(("rm", sub)) => cmd_rm(sub),
        Some(("serve", sub)) => serve::serve(str_arg(sub, "image"), str_arg(sub, "addr")),
        _ => unreachable!(),
    }
}

fn image_arg(help: &str) -> Arg {
    Arg::new("image").required(true).help(help.to_string())
}

fn block_size_arg() -> Arg {
    Arg::new("block-size")
        .short('b')
        .long("block-size")
        .default_value("4096")
        .value_parser(["1024", "2048", "4096"])
        .help("Block size in bytes")
}

fn str_arg<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches.get_one::<String>(name).unwrap()
}

fn u32_arg(matches: &ArgMatches, name: &str) -> anyhow::Result<u32> {
    str_arg(matches, name)
        .parse::<u32>()
        .with_context(|| format!("invalid {}", name))
}

fn open_fs(matches: &ArgMatches) -> anyhow::Result<Ufs> {
    let block_size = u32_arg(matches, "block-size").unwrap_or(DEFAULT_BLOCK_SIZE);
    let disk = Disk::open(str_arg(matches, "image"), block_size)?;
    Ok(Ufs::new(disk))
}

fn cmd_mkfs(matches: &ArgMatches) -> anyhow::Result<()> {
    mkfs::make(
        str_arg(matches, "image"),
        u32_arg(matches, "block-size")?,
        u32_arg(matches, "inodes")?,
        u32_arg(matches, "data-blocks")?,
    )
}

fn cmd_bits(matches: &ArgMatches) -> anyhow::Result<()> {
    let fs = open_fs(matches)?;
    let sb = fs.read_super_block()?;

    println!("Super");
    println!("inode_region_addr {}", sb.inode_region_addr);
    println!("inode_region_len {}", sb.inode_region_len);
    let capacity = sb.inode_region_len * fs.block_size() / INODE_SIZE;
    println!("num_inodes {}", capacity);
    println!("data_region_addr {}", sb.data_region_addr);
    println!("data_region_len {}", sb.data_region_len);
    println!("num_data {}", sb.num_data);
    println!();

    println!("Inode bitmap");
    print_bitmap_bytes(fs.read_inode_bitmap(&sb).as_raw_slice(), capacity);
    println!();

    println!("Data bitmap");
    print_bitmap_bytes(fs.read_data_bitmap(&sb).as_raw_slice(), sb.num_data);

    Ok(())
}

fn print_bitmap_bytes(bytes: &[u8], bits: u32) {
    let count = ((bits + 7) / 8) as usize;
    for byte in &bytes[..count] {
        print!("{} ", byte);
    }
    println!();
}

fn cmd_cat(matches: &ArgMatches) -> anyhow::Result<()> {
    let fs = open_fs(matches)?;
    let inum = u32_arg(matches, "inode")?;

    let inode = match fs.stat(inum) {
        Ok(inode) => inode,
        Err(_) => bail!("Error reading file"),
    };
    if inode.kind == FileKind::Directory || inode.size == 0 {
        bail!("Error reading file");
    }

    println!("File blocks");
    let bs = fs.block_size();
    let block_count = (inode.size + bs - 1) / bs;
    for i in 0..block_count as usize {
        if inode.direct[i] == 0 {
            bail!("Error reading file");
        }
        println!("{}", inode.direct[i]);
    }
    println!();

    println!("File data");
    let content = fs
        .read(inum, inode.size as usize)
        .context("Error reading file")?;
    std::io::stdout().write_all(&content)?;

    Ok(())
}

fn cmd_cp(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut fs = open_fs(matches)?;
    let inum = u32_arg(matches, "inode").context("Could not write to dst_file")?;
    let content =
        std::fs::read(str_arg(matches, "src")).context("Could not write to dst_file")?;

    fs.write(inum, &content)
        .context("Could not write to dst_file")?;
    Ok(())
}

fn cmd_ls(matches: &ArgMatches) -> anyhow::Result<()> {
    let fs = open_fs(matches)?;
    let target = str_arg(matches, "path");

    let inum = path::resolve(&fs, target).context("Directory not found")?;
    let inode = fs.stat(inum)?;

    if inode.kind == FileKind::Regular {
        let (_, name) = path::split(target);
        println!("{}\t{}", inum, name);
        return Ok(());
    }

    let content = fs.read(inum, inode.size as usize)?;
    let mut entries = DirEntry::decode_listing(&content)?;
    entries.sort_by_key(|e| e.name());
    for entry in entries {
        println!("{}\t{}", entry.inum, entry.name());
    }
    Ok(())
}

fn cmd_create(matches: &ArgMatches, kind: FileKind) -> anyhow::Result<()> {
    let mut fs = open_fs(matches)?;
    let parent = u32_arg(matches, "parent")?;
    let what = match kind {
        FileKind::Directory => "directory",
        FileKind::Regular => "file",
    };

    fs.create(parent, kind, str_arg(matches, "name"))
        .with_context(|| format!("Error creating {}", what))?;
    Ok(())
}

fn cmd_rm(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut fs = open_fs(matches)?;
    let parent = u32_arg(matches, "parent")?;

    fs.unlink(parent, str_arg(matches, "name"))
        .context("Error removing entry")?;
    Ok(())
}
