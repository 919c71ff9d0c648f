use crate::{
    consts::{DEFAULT_BLOCK_SIZE, ROOT_INODE},
    disk::Disk,
    error::FsError,
    fs::Ufs,
    path,
    types::{DirEntry, FileKind, Inode},
};
use anyhow::anyhow;
use std::io::Read;
use tiny_http::{Method, Response, Server};

/// Runs a single-threaded, blocking HTTP loop translating GET/PUT/DELETE
/// into engine calls. Requests are served one at a time, which is exactly
/// the serialization the engine requires.
pub fn serve(image: &str, addr: &str) -> anyhow::Result<()> {
    let disk = Disk::open(image, DEFAULT_BLOCK_SIZE)?;
    let mut fs = Ufs::new(disk);

    let server = Server::http(addr).map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;
    eprintln!("serving {} on http://{}", image, addr);

    for mut request in server.incoming_requests() {
        let url = request.url().to_string();
        let method = request.method().clone();
        let (status, body) = match method {
            Method::Get => get(&fs, &url),
            Method::Put => {
                let mut content = Vec::new();
                match request.as_reader().read_to_end(&mut content) {
                    Ok(_) => put(&mut fs, &url, &content),
                    Err(_) => (500, b"failed to read request body\n".to_vec()),
                }
            }
            Method::Delete => delete(&mut fs, &url),
            _ => (405, b"method not allowed\n".to_vec()),
        };

        let response = Response::from_data(body).with_status_code(status);
        if let Err(e) = request.respond(response) {
            eprintln!("failed to respond: {}", e);
        }
    }
    Ok(())
}

/// A trailing slash or a directory target returns a sorted listing;
/// a regular file returns its raw content.
pub(crate) fn get(fs: &Ufs, url: &str) -> (u16, Vec<u8>) {
    let wants_listing = url.ends_with('/') || url.is_empty();
    let inum = match path::resolve(fs, url) {
        Ok(inum) => inum,
        Err(_) => return (404, b"file or directory not found\n".to_vec()),
    };
    let inode = match fs.stat(inum) {
        Ok(inode) => inode,
        Err(_) => return (500, b"failed to read inode\n".to_vec()),
    };

    match inode.kind {
        FileKind::Directory => match listing(fs, inum, &inode) {
            Ok(text) => (200, text.into_bytes()),
            Err(_) => (500, b"failed to read directory\n".to_vec()),
        },
        FileKind::Regular if wants_listing => (404, b"not a directory\n".to_vec()),
        FileKind::Regular => match fs.read(inum, inode.size as usize) {
            Ok(content) => (200, content),
            Err(_) => (500, b"failed to read file\n".to_vec()),
        },
    }
}

/// Creates any missing intermediate directories, then creates/overwrites a
/// regular file at the leaf with the request body.
pub(crate) fn put(fs: &mut Ufs, url: &str, content: &[u8]) -> (u16, Vec<u8>) {
    let (parent_path, leaf) = path::split(url);
    if leaf.is_empty() {
        return (400, b"missing file name\n".to_vec());
    }

    let mut parent = ROOT_INODE;
    for segment in parent_path.split('/').filter(|s| !s.is_empty()) {
        parent = match fs.lookup(parent, segment) {
            Ok(inum) => inum,
            Err(FsError::NotFound) => {
                match fs.create(parent, FileKind::Directory, segment) {
                    Ok(inum) => inum,
                    Err(_) => return (500, b"failed to create parent directory\n".to_vec()),
                }
            }
            Err(_) => return (500, b"failed to resolve parent directory\n".to_vec()),
        };
    }

    let inum = match fs.create(parent, FileKind::Regular, leaf) {
        Ok(inum) => inum,
        Err(_) => return (500, b"failed to create file\n".to_vec()),
    };
    match fs.write(inum, content) {
        Ok(_) => (201, b"created\n".to_vec()),
        Err(_) => (500, b"failed to write file\n".to_vec()),
    }
}

/// Removes a file leaf or an empty directory.
pub(crate) fn delete(fs: &mut Ufs, url: &str) -> (u16, Vec<u8>) {
    let (parent_path, leaf) = path::split(url);
    let parent = match path::resolve(fs, parent_path) {
        Ok(inum) => inum,
        Err(_) => return (404, b"file or directory not found\n".to_vec()),
    };
    if fs.lookup(parent, leaf).is_err() {
        return (404, b"file or directory not found\n".to_vec());
    }

    match fs.unlink(parent, leaf) {
        Ok(()) => (200, b"deleted\n".to_vec()),
        Err(FsError::NotEmpty) => (400, b"directory is not empty\n".to_vec()),
        Err(FsError::UnlinkNotAllowed) => (400, b"unlink not allowed\n".to_vec()),
        Err(_) => (500, b"failed to delete\n".to_vec()),
    }
}

/// Newline-terminated, lexicographically sorted entries; directories are
/// suffixed with "/", "." and ".." are omitted.
fn listing(fs: &Ufs, inum: u32, inode: &Inode) -> anyhow::Result<String> {
    let content = fs.read(inum, inode.size as usize)?;
    let mut names = Vec::new();
    for entry in DirEntry::decode_listing(&content)? {
        if entry.is_free() {
            continue;
        }
        let name = entry.name();
        if name == "." || name == ".." {
            continue;
        }
        match fs.stat(entry.inum as u32) {
            Ok(child) if child.kind == FileKind::Directory => names.push(name + "/"),
            _ => names.push(name),
        }
    }
    names.sort();

    let mut out = String::new();
    for name in names {
        out.push_str(&name);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mkfs;
    use std::path::PathBuf;

    fn make_fs(name: &str) -> anyhow::Result<(PathBuf, Ufs)> {
        let mut path = std::env::temp_dir();
        path.push(name);
        path.set_extension("img");
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        mkfs::make(&path, 1024, 32, 32)?;
        let fs = Ufs::new(Disk::open(&path, 1024)?);
        Ok((path, fs))
    }

    #[test]
    fn put_then_get_file() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_put_get")?;

        let (status, _) = put(&mut fs, "/notes.txt", b"remember the milk");
        assert_eq!(status, 201);

        let (status, body) = get(&fs, "/notes.txt");
        assert_eq!(status, 200);
        assert_eq!(body, b"remember the milk");

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn put_creates_intermediate_directories() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_put_deep")?;

        let (status, _) = put(&mut fs, "/a/b/c.txt", b"deep");
        assert_eq!(status, 201);

        let (status, body) = get(&fs, "/a/b/c.txt");
        assert_eq!(status, 200);
        assert_eq!(body, b"deep");

        let (status, body) = get(&fs, "/a/");
        assert_eq!(status, 200);
        assert_eq!(body, b"b/\n");

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn put_overwrites_existing_file() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_put_overwrite")?;

        put(&mut fs, "/f", b"first");
        put(&mut fs, "/f", b"second");

        let (status, body) = get(&fs, "/f");
        assert_eq!(status, 200);
        assert_eq!(body, b"second");

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn get_listing_is_sorted_and_suffixed() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_listing")?;

        put(&mut fs, "/zebra.txt", b"z");
        put(&mut fs, "/apple.txt", b"a");
        put(&mut fs, "/dir/inner.txt", b"i");

        let (status, body) = get(&fs, "/");
        assert_eq!(status, 200);
        assert_eq!(body, b"apple.txt\ndir/\nzebra.txt\n");

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn get_missing_path_is_404() -> anyhow::Result<()> {
        let (path, fs) = make_fs("serve_get_missing")?;

        let (status, _) = get(&fs, "/no/such/file");
        assert_eq!(status, 404);

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn trailing_slash_on_file_is_404() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_file_slash")?;

        put(&mut fs, "/f", b"x");
        let (status, _) = get(&fs, "/f/");
        assert_eq!(status, 404);

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn delete_file_then_missing_is_404() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_delete")?;

        put(&mut fs, "/f", b"x");
        let (status, _) = delete(&mut fs, "/f");
        assert_eq!(status, 200);

        let (status, _) = delete(&mut fs, "/f");
        assert_eq!(status, 404);
        let (status, _) = get(&fs, "/f");
        assert_eq!(status, 404);

        Ok(std::fs::remove_file(&path)?)
    }

    #[test]
    fn delete_nonempty_directory_is_400() -> anyhow::Result<()> {
        let (path, mut fs) = make_fs("serve_delete_nonempty")?;

        put(&mut fs, "/d/f", b"x");
        let (status, _) = delete(&mut fs, "/d");
        assert_eq!(status, 400);

        // empties out, then the directory itself can go
        let (status, _) = delete(&mut fs, "/d/f");
        assert_eq!(status, 200);
        let (status, _) = delete(&mut fs, "/d");
        assert_eq!(status, 200);

        Ok(std::fs::remove_file(&path)?)
    }
}
