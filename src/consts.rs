/// Number of direct block pointers in an inode. There is no indirection, so
/// this also caps the file size at `DIRECT_PTRS * block_size`.
pub const DIRECT_PTRS: usize = 30;

/// Maximum directory entry name length, including the trailing NUL.
pub const DIR_ENT_NAME_SIZE: usize = 28;

/// Size of one encoded directory entry: 28 name bytes plus a 4-byte inum.
pub const DIR_ENT_SIZE: u32 = 32;

/// Size of one encoded inode record: kind + size + 30 direct pointers.
pub const INODE_SIZE: u32 = 128;

/// The root directory. Pre-existing in every formatted image.
pub const ROOT_INODE: u32 = 0;

/// Sentinel inum marking a free directory entry.
pub const FREE_ENTRY: i32 = -1;

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

pub fn max_file_size(block_size: u32) -> usize {
    DIRECT_PTRS * block_size as usize
}
