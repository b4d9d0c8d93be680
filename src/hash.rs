use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Hash recorded for a file that could not be read. Never equal to a real digest.
pub const MISSING: &str = "missing";

/// Hex characters kept from the BLAKE3 digest.
pub const HASH_LEN: usize = 16;

const MMAP_THRESHOLD: u64 = 64 * 1024;

/// Content hash of the file at `path`, or [`MISSING`] when it cannot be read.
///
/// Only the bytes are hashed, so the value is stable across machines with
/// different clocks and permissions.
pub fn hash_file(path: &Path) -> String {
    match read_file(path) {
        Ok(bytes) => hash_bytes(&bytes),
        Err(_) => MISSING.to_string(),
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex[..HASH_LEN].to_string()
}

fn read_file(path: &Path) -> std::io::Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(std::io::Error::other("not a regular file"));
    }
    if metadata.len() > MMAP_THRESHOLD {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(mmap.to_vec())
    } else {
        std::fs::read(path)
    }
}

/// Memoizing hasher over repository-relative paths.
///
/// One instance lives for a single invocation; files are assumed not to change
/// underneath it.
#[derive(Debug)]
pub struct HashMemo {
    root: PathBuf,
    seen: RwLock<HashMap<String, String>>,
}

impl HashMemo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seen: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hash(&self, relative: &str) -> String {
        if let Ok(seen) = self.seen.read() {
            if let Some(hash) = seen.get(relative) {
                return hash.clone();
            }
        }

        let hash = hash_file(&self.root.join(relative));
        if let Ok(mut seen) = self.seen.write() {
            seen.insert(relative.to_string(), hash.clone());
        }
        hash
    }
}
