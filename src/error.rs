use std::fmt;

/// Failure surface of the engine operations. Callers map these onto their
/// own surface: exit codes for the command-line tools, status codes for the
/// HTTP wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Inode number out of range, or the referenced inode has the wrong
    /// structure for the operation (e.g. lookup against a regular file).
    InvalidInode,
    /// Empty name, or a name that does not fit a directory entry.
    InvalidName,
    /// Type mismatch against an existing entry.
    InvalidType,
    /// Read request larger than the maximum file size.
    InvalidSize,
    /// Lookup miss.
    NotFound,
    /// Inode or data bitmap exhausted.
    NotEnoughSpace,
    /// Unlink against a directory that still has real entries.
    NotEmpty,
    /// Unlink against "." or "..".
    UnlinkNotAllowed,
    /// Undecodable on-disk structure.
    Io,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::InvalidInode => "invalid inode number",
            FsError::InvalidName => "invalid name",
            FsError::InvalidType => "invalid type",
            FsError::InvalidSize => "invalid size",
            FsError::NotFound => "entry not found",
            FsError::NotEnoughSpace => "not enough space",
            FsError::NotEmpty => "directory is not empty",
            FsError::UnlinkNotAllowed => "unlink not allowed",
            FsError::Io => "corrupt file system structure",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for FsError {}

pub type Result<T> = std::result::Result<T, FsError>;
