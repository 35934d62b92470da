use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Ensure `root/folder` exists and return `root/folder/filename`.
///
/// `create_dir_all` treats an existing directory as success, so workers
/// racing on the same date bucket all get `Ok`.
pub fn plan(root: &Path, folder: &str, filename: &str) -> io::Result<PathBuf> {
    let bucket = root.join(folder);
    fs::create_dir_all(&bucket)?;
    Ok(bucket.join(filename))
}
