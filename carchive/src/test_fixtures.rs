use std::fs;
use std::path::{Path, PathBuf};

/// Content that doesn't compress down to nothing, so stream handling gets exercised.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i % 251) as u8) ^ ((i >> 10) as u8)).collect()
}

/// Write `content` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}
