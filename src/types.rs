use crate::consts::{DIRECT_PTRS, DIR_ENT_NAME_SIZE, DIR_ENT_SIZE, FREE_ENTRY};
use anyhow::{anyhow, ensure};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Region layout of the image, decoded from block 0. Addresses and lengths
/// are in block units; all regions are disjoint. Written once by `mkfs` and
/// read-only afterwards.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub inode_bitmap_addr: u32,
    pub inode_bitmap_len: u32,
    pub data_bitmap_addr: u32,
    pub data_bitmap_len: u32,
    pub inode_region_addr: u32,
    pub inode_region_len: u32,
    pub num_inodes: u32,
    pub data_region_addr: u32,
    pub data_region_len: u32,
    pub num_data: u32,
}

impl Superblock {
    pub fn serialize_into<W>(&self, w: W) -> anyhow::Result<()>
    where
        W: Write,
    {
        bincode::serialize_into(w, self).map_err(|e| e.into())
    }

    pub fn deserialize_from<R>(r: R) -> anyhow::Result<Self>
    where
        R: Read,
    {
        bincode::deserialize_from(r).map_err(|e| e.into())
    }
}

/// Directory is tag zero so a zero-filled inode table decodes cleanly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
}

impl Default for FileKind {
    fn default() -> Self {
        FileKind::Directory
    }
}

/// One file or directory: its kind, logical byte length, and the data
/// blocks backing it. `direct` holds absolute block numbers; 0 marks an
/// unused slot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub kind: FileKind,
    pub size: u32,
    pub direct: [u32; DIRECT_PTRS],
}

impl Default for Inode {
    fn default() -> Self {
        Self::new(FileKind::Directory)
    }
}

impl Inode {
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            size: 0,
            direct: [0; DIRECT_PTRS],
        }
    }

    pub fn serialize_into<W>(&self, w: W) -> anyhow::Result<()>
    where
        W: Write,
    {
        bincode::serialize_into(w, self).map_err(|e| e.into())
    }

    pub fn deserialize_from<R>(r: R) -> anyhow::Result<Self>
    where
        R: Read,
    {
        bincode::deserialize_from(r).map_err(|e| e.into())
    }
}

/// Fixed-size (name, inum) record. A directory's content is a dense
/// sequence of these; `inum == -1` marks a free slot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; DIR_ENT_NAME_SIZE],
    pub inum: i32,
}

impl DirEntry {
    /// `name` must leave room for the trailing NUL.
    pub fn new(name: &str, inum: u32) -> Self {
        assert!(name.len() < DIR_ENT_NAME_SIZE, "entry name too long");

        let mut bytes = [0u8; DIR_ENT_NAME_SIZE];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: bytes,
            inum: inum as i32,
        }
    }

    pub fn is_free(&self) -> bool {
        self.inum == FREE_ENTRY
    }

    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DIR_ENT_NAME_SIZE);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Decodes a directory's byte content into its entry sequence.
    pub fn decode_listing(buf: &[u8]) -> anyhow::Result<Vec<DirEntry>> {
        ensure!(
            buf.len() % DIR_ENT_SIZE as usize == 0,
            "directory content of {} bytes is not a whole number of entries",
            buf.len()
        );

        buf.chunks_exact(DIR_ENT_SIZE as usize)
            .map(|chunk| bincode::deserialize(chunk).map_err(|e| anyhow!(e)))
            .collect()
    }

    pub fn encode_listing(entries: &[DirEntry]) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entries.len() * DIR_ENT_SIZE as usize);
        for entry in entries {
            bincode::serialize_into(&mut buf, entry)?;
        }
        Ok(buf)
    }
}
