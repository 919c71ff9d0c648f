use crate::{
    consts::{max_file_size, DIRECT_PTRS, DIR_ENT_NAME_SIZE, DIR_ENT_SIZE, INODE_SIZE},
    disk::Disk,
    error::{FsError, Result},
    types::{DirEntry, FileKind, Inode, Superblock},
};
use bitvec::{order::Lsb0, vec::BitVec};
use std::io;

pub type Bitmap = BitVec<u8, Lsb0>;

/// The file system engine. Owns the block store for its whole lifetime and
/// keeps no state between calls: every operation re-reads the superblock
/// and whichever structures it touches, mutates them in memory, and writes
/// everything back before returning. Callers must serialize access; issuing
/// two operations concurrently against one image corrupts the metadata.
#[derive(Debug)]
pub struct Ufs {
    disk: Disk,
}

impl Ufs {
    pub fn new(disk: Disk) -> Self {
        Self { disk }
    }

    pub fn block_size(&self) -> u32 {
        self.disk.block_size()
    }

    pub fn sync(&self) -> io::Result<()> {
        self.disk.sync()
    }

    /// Decodes the region layout from block 0.
    pub fn read_super_block(&self) -> Result<Superblock> {
        Superblock::deserialize_from(self.disk.read_block(0)).map_err(|_| FsError::Io)
    }

    /// The returned bitmap spans the whole region, so its bit count is the
    /// region capacity and may exceed `num_inodes`; callers bound-check.
    pub fn read_inode_bitmap(&self, sb: &Superblock) -> Bitmap {
        self.read_bitmap(sb.inode_bitmap_addr, sb.inode_bitmap_len)
    }

    pub fn write_inode_bitmap(&mut self, sb: &Superblock, bits: &Bitmap) {
        self.write_bitmap(sb.inode_bitmap_addr, bits)
    }

    pub fn read_data_bitmap(&self, sb: &Superblock) -> Bitmap {
        self.read_bitmap(sb.data_bitmap_addr, sb.data_bitmap_len)
    }

    pub fn write_data_bitmap(&mut self, sb: &Superblock, bits: &Bitmap) {
        self.write_bitmap(sb.data_bitmap_addr, bits)
    }

    /// Reads the whole inode table. The sequence length is the region
    /// capacity (`inode_region_len * block_size / INODE_SIZE`), not
    /// `num_inodes`.
    pub fn read_inode_region(&self, sb: &Superblock) -> Result<Vec<Inode>> {
        let mut bytes =
            Vec::with_capacity((sb.inode_region_len * self.disk.block_size()) as usize);
        for i in 0..sb.inode_region_len {
            bytes.extend_from_slice(self.disk.read_block(sb.inode_region_addr + i));
        }

        let count = bytes.len() / INODE_SIZE as usize;
        let mut cursor = bytes.as_slice();
        (0..count)
            .map(|_| Inode::deserialize_from(&mut cursor).map_err(|_| FsError::Io))
            .collect()
    }

    /// Writes the whole inode table back, even when only one entry changed.
    pub fn write_inode_region(&mut self, sb: &Superblock, inodes: &[Inode]) -> Result<()> {
        let region_bytes = (sb.inode_region_len * self.disk.block_size()) as usize;
        assert!(inodes.len() * INODE_SIZE as usize <= region_bytes);

        let mut bytes = Vec::with_capacity(region_bytes);
        for inode in inodes {
            inode.serialize_into(&mut bytes).map_err(|_| FsError::Io)?;
        }
        bytes.resize(region_bytes, 0);

        let bs = self.disk.block_size() as usize;
        for (i, chunk) in bytes.chunks(bs).enumerate() {
            self.disk.write_block(sb.inode_region_addr + i as u32, chunk);
        }
        Ok(())
    }

    /// Returns a copy of the on-disk inode record. The inode bitmap is not
    /// consulted, so a freed inode keeps its stale record readable until a
    /// later `create` reuses the number.
    pub fn stat(&self, inum: u32) -> Result<Inode> {
        let sb = self.read_super_block()?;
        if inum >= sb.num_inodes {
            return Err(FsError::InvalidInode);
        }

        let inodes = self.read_inode_region(&sb)?;
        if inum as usize >= inodes.len() {
            return Err(FsError::InvalidInode);
        }
        Ok(inodes[inum as usize])
    }

    /// Finds `name` in the given directory. First exact match with a
    /// non-free inum wins.
    pub fn lookup(&self, parent: u32, name: &str) -> Result<u32> {
        let parent_inode = self.stat(parent)?;
        if parent_inode.kind != FileKind::Directory {
            return Err(FsError::InvalidInode);
        }

        let listing = self.read(parent, parent_inode.size as usize)?;
        for entry in DirEntry::decode_listing(&listing).map_err(|_| FsError::Io)? {
            if !entry.is_free() && entry.name() == name {
                return Ok(entry.inum as u32);
            }
        }
        Err(FsError::NotFound)
    }

    /// Reads up to `max_size` bytes from the start of the file, following
    /// the direct pointers in order.
    pub fn read(&self, inum: u32, max_size: usize) -> Result<Vec<u8>> {
        let inode = self.stat(inum)?;
        let bs = self.disk.block_size() as usize;
        if max_size > max_file_size(self.disk.block_size()) {
            return Err(FsError::InvalidSize);
        }

        let len = max_size.min(inode.size as usize);
        let mut out = Vec::with_capacity(len);
        let mut slot = 0;
        while out.len() < len {
            let block = self.disk.read_block(inode.direct[slot]);
            let take = (len - out.len()).min(bs);
            out.extend_from_slice(&block[..take]);
            slot += 1;
        }
        Ok(out)
    }

    /// Replaces a regular file's content. Requests longer than
    /// `DIRECT_PTRS * block_size` are silently capped, and when the data
    /// bitmap runs out mid-growth the effective size degrades to the blocks
    /// actually claimed; the caller compares the returned count against the
    /// request.
    pub fn write(&mut self, inum: u32, data: &[u8]) -> Result<usize> {
        let mut inode = self.stat(inum)?;
        if inode.kind != FileKind::Regular {
            return Err(FsError::InvalidType);
        }
        let sb = self.read_super_block()?;

        let bs = self.disk.block_size() as usize;
        let mut size = data.len().min(max_file_size(self.disk.block_size()));
        let mut blocks_needed = (size + bs - 1) / bs;

        let mut data_bitmap = self.read_data_bitmap(&sb);
        let current = inode.direct.iter().filter(|&&b| b != 0).count();

        for i in current..blocks_needed {
            match claim_free(&mut data_bitmap, sb.num_data as usize) {
                Some(rel) => inode.direct[i] = sb.data_region_addr + rel as u32,
                None => {
                    blocks_needed = i;
                    size = i * bs;
                    break;
                }
            }
        }
        for i in blocks_needed..current {
            let rel = (inode.direct[i] - sb.data_region_addr) as usize;
            data_bitmap.set(rel, false);
            inode.direct[i] = 0;
        }

        let mut written = 0;
        for i in 0..blocks_needed {
            let take = bs.min(size - written);
            self.disk
                .write_block(inode.direct[i], &data[written..written + take]);
            written += take;
        }

        inode.size = size as u32;
        let mut inodes = self.read_inode_region(&sb)?;
        inodes[inum as usize] = inode;
        self.write_inode_region(&sb, &inodes)?;
        self.write_data_bitmap(&sb, &data_bitmap);

        Ok(written)
    }

    /// Creates `name` under `parent`. Idempotent: an existing entry of the
    /// same kind returns its inode number, a kind mismatch is refused.
    ///
    /// All bitmap and inode mutations are staged in memory and persisted
    /// only once every allocation has succeeded, so a failed create leaves
    /// the image untouched.
    pub fn create(&mut self, parent: u32, kind: FileKind, name: &str) -> Result<u32> {
        let sb = self.read_super_block()?;
        if name.is_empty() || name.len() >= DIR_ENT_NAME_SIZE {
            return Err(FsError::InvalidName);
        }

        let mut parent_inode = self.stat(parent)?;
        if parent_inode.kind != FileKind::Directory {
            return Err(FsError::InvalidInode);
        }

        let listing = self.read(parent, parent_inode.size as usize)?;
        let mut entries = DirEntry::decode_listing(&listing).map_err(|_| FsError::Io)?;
        for entry in &entries {
            if !entry.is_free() && entry.name() == name {
                let existing = self.stat(entry.inum as u32)?;
                return if existing.kind == kind {
                    Ok(entry.inum as u32)
                } else {
                    Err(FsError::InvalidType)
                };
            }
        }

        // Space budget: one block to seed a new directory's listing, plus
        // one for the parent when the append crosses a block boundary. A
        // boundary block left over from an earlier shrink is reused.
        let bs = self.disk.block_size();
        let parent_full = parent_inode.size % bs == 0;
        let parent_slot = (parent_inode.size / bs) as usize;
        if parent_full && parent_slot >= DIRECT_PTRS {
            return Err(FsError::NotEnoughSpace);
        }

        let mut data_bitmap = self.read_data_bitmap(&sb);
        let mut needed = 0;
        if kind == FileKind::Directory {
            needed += 1;
        }
        if parent_full && parent_inode.direct[parent_slot] == 0 {
            needed += 1;
        }
        if data_bitmap[..sb.num_data as usize].count_zeros() < needed {
            return Err(FsError::NotEnoughSpace);
        }

        let mut inode_bitmap = self.read_inode_bitmap(&sb);
        let new_inum = claim_free(&mut inode_bitmap, sb.num_inodes as usize)
            .ok_or(FsError::NotEnoughSpace)? as u32;

        let mut new_inode = Inode::new(kind);
        if kind == FileKind::Directory {
            // budget-checked above
            let rel = claim_free(&mut data_bitmap, sb.num_data as usize)
                .ok_or(FsError::NotEnoughSpace)?;
            new_inode.direct[0] = sb.data_region_addr + rel as u32;
            new_inode.size = 2 * DIR_ENT_SIZE;

            let seed = DirEntry::encode_listing(&[
                DirEntry::new(".", new_inum),
                DirEntry::new("..", parent),
            ])
            .map_err(|_| FsError::Io)?;
            self.disk.write_block(new_inode.direct[0], &seed);
        }

        if parent_full && parent_inode.direct[parent_slot] == 0 {
            let rel = claim_free(&mut data_bitmap, sb.num_data as usize)
                .ok_or(FsError::NotEnoughSpace)?;
            parent_inode.direct[parent_slot] = sb.data_region_addr + rel as u32;
        }
        entries.push(DirEntry::new(name, new_inum));
        parent_inode.size += DIR_ENT_SIZE;

        let mut inodes = self.read_inode_region(&sb)?;
        inodes[new_inum as usize] = new_inode;
        inodes[parent as usize] = parent_inode;

        self.write_inode_bitmap(&sb, &inode_bitmap);
        self.write_data_bitmap(&sb, &data_bitmap);
        self.write_inode_region(&sb, &inodes)?;
        self.write_listing(&parent_inode, &entries)?;

        Ok(new_inum)
    }

    /// Removes `name` from `parent`. Unlinking a name that does not exist
    /// is a successful no-op; a directory must contain nothing beyond its
    /// "." and ".." entries. The entry is removed by compacting the
    /// listing, never by tombstoning.
    pub fn unlink(&mut self, parent: u32, name: &str) -> Result<()> {
        let sb = self.read_super_block()?;
        let mut parent_inode = self.stat(parent)?;
        if parent_inode.kind != FileKind::Directory {
            return Err(FsError::InvalidInode);
        }
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::UnlinkNotAllowed);
        }
        if name.len() >= DIR_ENT_NAME_SIZE {
            return Err(FsError::InvalidName);
        }

        let target = match self.lookup(parent, name) {
            Ok(inum) => inum,
            Err(FsError::NotFound) => return Ok(()),
            Err(e) => return Err(e),
        };
        let target_inode = self.stat(target)?;
        if target_inode.kind == FileKind::Directory && target_inode.size > 2 * DIR_ENT_SIZE {
            return Err(FsError::NotEmpty);
        }

        let bs = self.disk.block_size();
        let mut inode_bitmap = self.read_inode_bitmap(&sb);
        inode_bitmap.set(target as usize, false);

        let mut data_bitmap = self.read_data_bitmap(&sb);
        let block_count = (target_inode.size + bs - 1) / bs;
        for i in 0..block_count as usize {
            let rel = (target_inode.direct[i] - sb.data_region_addr) as usize;
            data_bitmap.set(rel, false);
        }

        let listing = self.read(parent, parent_inode.size as usize)?;
        let mut entries = DirEntry::decode_listing(&listing).map_err(|_| FsError::Io)?;
        entries.retain(|e| e.is_free() || e.name() != name);
        parent_inode.size -= DIR_ENT_SIZE;

        let mut inodes = self.read_inode_region(&sb)?;
        inodes[parent as usize] = parent_inode;

        self.write_inode_bitmap(&sb, &inode_bitmap);
        self.write_data_bitmap(&sb, &data_bitmap);
        self.write_inode_region(&sb, &inodes)?;
        self.write_listing(&parent_inode, &entries)?;

        Ok(())
    }

    fn read_bitmap(&self, addr: u32, len: u32) -> Bitmap {
        let mut bytes = Vec::with_capacity((len * self.disk.block_size()) as usize);
        for i in 0..len {
            bytes.extend_from_slice(self.disk.read_block(addr + i));
        }
        Bitmap::from_slice(&bytes)
    }

    fn write_bitmap(&mut self, addr: u32, bits: &Bitmap) {
        let bs = self.disk.block_size() as usize;
        for (i, chunk) in bits.as_raw_slice().chunks(bs).enumerate() {
            self.disk.write_block(addr + i as u32, chunk);
        }
    }

    /// Rewrites a directory's backing blocks from its entry sequence. The
    /// tail of the last touched block is zero-filled by the block store.
    fn write_listing(&mut self, dir_inode: &Inode, entries: &[DirEntry]) -> Result<()> {
        let bytes = DirEntry::encode_listing(entries).map_err(|_| FsError::Io)?;
        let bs = self.disk.block_size() as usize;
        for (i, chunk) in bytes.chunks(bs).enumerate() {
            self.disk.write_block(dir_inode.direct[i], chunk);
        }
        Ok(())
    }
}

fn claim_free(bitmap: &mut Bitmap, limit: usize) -> Option<usize> {
    let i = bitmap[..limit].first_zero()?;
    bitmap.set(i, true);
    Some(i)
}
