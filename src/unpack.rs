//! Extraction of parsed archives into a directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::IceFile;
use crate::datafile::DataFile;
use crate::error::IceError;

/// Write every record of both groups under `out_dir`, returning the paths
/// in extraction order.
///
/// With `use_groups` the files land in `group1`/`group2` subdirectories;
/// with `raw` each output holds the whole record (header included) instead
/// of the payload.
pub fn unpack(
    ice: &IceFile,
    out_dir: &Path,
    use_groups: bool,
    raw: bool,
) -> Result<Vec<PathBuf>, IceError> {
    let (dir1, dir2) = if use_groups {
        (out_dir.join("group1"), out_dir.join("group2"))
    } else {
        (out_dir.to_path_buf(), out_dir.to_path_buf())
    };

    let mut written = Vec::new();
    if !ice.group1_files.is_empty() {
        written.extend(unpack_group(&ice.group1_files, &dir1, raw)?);
    }
    if !ice.group2_files.is_empty() {
        written.extend(unpack_group(&ice.group2_files, &dir2, raw)?);
    }
    Ok(written)
}

fn unpack_group(files: &[DataFile], out_dir: &Path, raw: bool) -> Result<Vec<PathBuf>, IceError> {
    fs::create_dir_all(out_dir)?;

    let mut written = Vec::new();
    for file in files {
        let path = out_dir.join(file.name());
        let bytes = if raw { file.raw() } else { file.data() };
        fs::write(&path, bytes)?;
        written.push(path);
    }
    Ok(written)
}
