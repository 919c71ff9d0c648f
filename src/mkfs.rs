use crate::{
    consts::{DIR_ENT_SIZE, INODE_SIZE, ROOT_INODE},
    disk::Disk,
    fs::{Bitmap, Ufs},
    types::{DirEntry, FileKind, Inode, Superblock},
};
use anyhow::ensure;
use std::{fs::OpenOptions, path::Path};

/// Formats a fresh image: superblock in block 0, then the inode bitmap,
/// data bitmap, inode region and data region, block-aligned and disjoint.
/// Inode 0 becomes the root directory, backed by the first data block and
/// seeded with "." and "..".
pub fn make<P>(path: P, block_size: u32, num_inodes: u32, num_data: u32) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    ensure!(
        block_size >= DIR_ENT_SIZE && block_size % DIR_ENT_SIZE == 0,
        "block size must be a multiple of the {}-byte directory entry",
        DIR_ENT_SIZE
    );
    ensure!(num_inodes > 0 && num_data > 0, "image cannot be empty");

    let bits_per_block = block_size * 8;
    let inode_bitmap_len = div_ceil(num_inodes, bits_per_block);
    let data_bitmap_len = div_ceil(num_data, bits_per_block);
    let inode_region_len = div_ceil(num_inodes * INODE_SIZE, block_size);

    let inode_bitmap_addr = 1;
    let data_bitmap_addr = inode_bitmap_addr + inode_bitmap_len;
    let inode_region_addr = data_bitmap_addr + data_bitmap_len;
    let data_region_addr = inode_region_addr + inode_region_len;

    let sb = Superblock {
        inode_bitmap_addr,
        inode_bitmap_len,
        data_bitmap_addr,
        data_bitmap_len,
        inode_region_addr,
        inode_region_len,
        num_inodes,
        data_region_addr,
        data_region_len: num_data,
        num_data,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path.as_ref())?;
    file.set_len((data_region_addr + num_data) as u64 * block_size as u64)?;
    drop(file);

    let mut disk = Disk::open(path.as_ref(), block_size)?;
    let mut buf = Vec::new();
    sb.serialize_into(&mut buf)?;
    disk.write_block(0, &buf);

    // the root listing lives in the first data block
    let seed = DirEntry::encode_listing(&[
        DirEntry::new(".", ROOT_INODE),
        DirEntry::new("..", ROOT_INODE),
    ])?;
    disk.write_block(data_region_addr, &seed);

    let mut fs = Ufs::new(disk);

    let mut inode_bitmap = Bitmap::repeat(false, (inode_bitmap_len * block_size * 8) as usize);
    inode_bitmap.set(ROOT_INODE as usize, true);
    fs.write_inode_bitmap(&sb, &inode_bitmap);

    let mut data_bitmap = Bitmap::repeat(false, (data_bitmap_len * block_size * 8) as usize);
    data_bitmap.set(0, true);
    fs.write_data_bitmap(&sb, &data_bitmap);

    let capacity = (inode_region_len * block_size / INODE_SIZE) as usize;
    let mut inodes = vec![Inode::default(); capacity];
    let mut root = Inode::new(FileKind::Directory);
    root.size = 2 * DIR_ENT_SIZE;
    root.direct[0] = data_region_addr;
    inodes[ROOT_INODE as usize] = root;
    fs.write_inode_region(&sb, &inodes)
        .map_err(anyhow::Error::from)?;

    fs.sync()?;
    Ok(())
}

fn div_ceil(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::DIRECT_PTRS;
    use std::path::PathBuf;

    fn image_path(name: &str) -> anyhow::Result<PathBuf> {
        let mut path = std::env::temp_dir();
        path.push(name);
        path.set_extension("img");
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(path)
    }

    #[test]
    fn regions_are_laid_out_in_order() -> anyhow::Result<()> {
        let path = image_path("mkfs_layout")?;
        make(&path, 1024, 8, 8)?;

        let fs = Ufs::new(Disk::open(&path, 1024)?);
        let sb = fs.read_super_block()?;

        assert_eq!(sb.inode_bitmap_addr, 1);
        assert_eq!(sb.inode_bitmap_len, 1);
        assert_eq!(sb.data_bitmap_addr, 2);
        assert_eq!(sb.data_bitmap_len, 1);
        assert_eq!(sb.inode_region_addr, 3);
        assert_eq!(sb.inode_region_len, 1); // 8 inodes * 128 bytes
        assert_eq!(sb.data_region_addr, 4);
        assert_eq!(sb.num_inodes, 8);
        assert_eq!(sb.num_data, 8);

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn fresh_root_is_an_empty_directory() -> anyhow::Result<()> {
        let path = image_path("mkfs_root")?;
        make(&path, 1024, 8, 8)?;

        let fs = Ufs::new(Disk::open(&path, 1024)?);
        let root = fs.stat(ROOT_INODE)?;
        assert_eq!(root.kind, FileKind::Directory);
        assert_eq!(root.size, 2 * DIR_ENT_SIZE);
        assert_ne!(root.direct[0], 0);
        assert!(root.direct[1..].iter().all(|&b| b == 0));

        let listing = fs.read(ROOT_INODE, root.size as usize)?;
        let entries = DirEntry::decode_listing(&listing)?;
        assert_eq!(entries[0].name(), ".");
        assert_eq!(entries[0].inum, ROOT_INODE as i32);
        assert_eq!(entries[1].name(), "..");
        assert_eq!(entries[1].inum, ROOT_INODE as i32);

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn only_first_bits_are_claimed() -> anyhow::Result<()> {
        let path = image_path("mkfs_bitmaps")?;
        make(&path, 1024, 8, 8)?;

        let fs = Ufs::new(Disk::open(&path, 1024)?);
        let sb = fs.read_super_block()?;
        let inode_bits = fs.read_inode_bitmap(&sb);
        let data_bits = fs.read_data_bitmap(&sb);

        assert!(inode_bits[0]);
        assert_eq!(inode_bits[..sb.num_inodes as usize].count_ones(), 1);
        assert!(data_bits[0]);
        assert_eq!(data_bits[..sb.num_data as usize].count_ones(), 1);

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn inode_capacity_covers_direct_pointers() -> anyhow::Result<()> {
        let path = image_path("mkfs_capacity")?;
        make(&path, 4096, 32, 64)?;

        let fs = Ufs::new(Disk::open(&path, 4096)?);
        let sb = fs.read_super_block()?;
        let inodes = fs.read_inode_region(&sb)?;
        assert!(inodes.len() >= sb.num_inodes as usize);
        assert!(inodes.iter().all(|i| i.direct.len() == DIRECT_PTRS));

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn refuses_to_overwrite_existing_image() -> anyhow::Result<()> {
        let path = image_path("mkfs_no_overwrite")?;
        make(&path, 1024, 8, 8)?;
        assert!(make(&path, 1024, 8, 8).is_err());

        Ok(std::fs::remove_file(&path)?)
    }
}
