use anyhow::ensure;
use memmap::MmapMut;
use std::{fs::OpenOptions, io, path::Path};

/// Block-addressed storage over a memory-mapped image file. The block size
/// is fixed when the image is opened and every access moves whole blocks.
///
/// This layer has no failure surface of its own: addressing a block outside
/// the image is a caller bug and panics.
#[derive(Debug)]
pub struct Disk {
    mmap: MmapMut,
    block_size: u32,
}

impl Disk {
    pub fn open<P>(path: P, block_size: u32) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        ensure!(block_size > 0, "block size must be positive");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        ensure!(
            len > 0 && len % block_size as u64 == 0,
            "image size {} is not a multiple of the block size {}",
            len,
            block_size
        );
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { mmap, block_size })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn num_blocks(&self) -> u32 {
        (self.mmap.len() / self.block_size as usize) as u32
    }

    pub fn read_block(&self, n: u32) -> &[u8] {
        let bs = self.block_size as usize;
        let start = n as usize * bs;
        &self.mmap[start..start + bs]
    }

    /// Rewrites block `n` in full. A buffer shorter than the block size is
    /// zero-extended, so the tail of the block never keeps stale bytes.
    pub fn write_block(&mut self, n: u32, buf: &[u8]) {
        let bs = self.block_size as usize;
        assert!(buf.len() <= bs, "buffer larger than one block");

        let start = n as usize * bs;
        let block = &mut self.mmap[start..start + bs];
        block[..buf.len()].copy_from_slice(buf);
        block[buf.len()..].fill(0);
    }

    pub fn sync(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_image(name: &str, blocks: u32, block_size: u32) -> anyhow::Result<PathBuf> {
        let mut path = std::env::temp_dir();
        path.push(name);
        path.set_extension("img");
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let file = std::fs::File::create(&path)?;
        file.set_len(blocks as u64 * block_size as u64)?;
        Ok(path)
    }

    #[test]
    fn write_then_read_block() -> anyhow::Result<()> {
        let path = make_image("disk_write_then_read", 4, 512)?;
        let mut disk = Disk::open(&path, 512)?;

        assert_eq!(disk.num_blocks(), 4);
        assert_eq!(disk.block_size(), 512);

        disk.write_block(2, b"hello");
        assert_eq!(&disk.read_block(2)[..5], b"hello");

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn short_write_zeroes_tail() -> anyhow::Result<()> {
        let path = make_image("disk_short_write", 2, 512)?;
        let mut disk = Disk::open(&path, 512)?;

        disk.write_block(0, &[0xff; 512]);
        disk.write_block(0, b"abc");

        let block = disk.read_block(0);
        assert_eq!(&block[..3], b"abc");
        assert!(block[3..].iter().all(|&b| b == 0));

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn persists_across_reopen() -> anyhow::Result<()> {
        let path = make_image("disk_reopen", 2, 512)?;
        {
            let mut disk = Disk::open(&path, 512)?;
            disk.write_block(1, b"persisted");
            disk.sync()?;
        }
        let disk = Disk::open(&path, 512)?;
        assert_eq!(&disk.read_block(1)[..9], b"persisted");

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn rejects_ragged_image() -> anyhow::Result<()> {
        let path = make_image("disk_ragged", 1, 500)?;
        assert!(Disk::open(&path, 512).is_err());

        Ok(std::fs::remove_file(&path)?)
    }
}
