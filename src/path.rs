use crate::{consts::ROOT_INODE, error::Result, fs::Ufs};

/// Walks an absolute slash-separated path from the root, one `lookup` per
/// segment. Empty segments (leading, trailing, doubled slashes) are
/// skipped, so "/", "" and "//" all resolve to the root.
pub fn resolve(fs: &Ufs, path: &str) -> Result<u32> {
    let mut current = ROOT_INODE;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current = fs.lookup(current, segment)?;
    }
    Ok(current)
}

/// Splits a path into its parent directory and leaf name. Trailing slashes
/// are ignored, so "/a/b/" splits the same way as "/a/b".
pub fn split(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("/", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain_paths() {
        assert_eq!(split("/a/b/c.txt"), ("/a/b", "c.txt"));
        assert_eq!(split("/a"), ("/", "a"));
        assert_eq!(split("a"), ("/", "a"));
    }

    #[test]
    fn split_ignores_trailing_slash() {
        assert_eq!(split("/a/b/"), ("/a", "b"));
        assert_eq!(split("/a/"), ("/", "a"));
    }

    #[test]
    fn split_of_root_is_empty_leaf() {
        assert_eq!(split("/"), ("/", ""));
        assert_eq!(split(""), ("/", ""));
    }
}
