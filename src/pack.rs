//! Pack front-end: route filesystem paths into the two archive groups.
//!
//! Files land in group 1 when their path (relative to a walked directory)
//! contains a `group1` component or their name matches one of the group-1
//! patterns; everything else goes to group 2.  Patterns are
//! case-insensitive `*`/`?` wildcards matched against file names.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive::{IceFile, IceVersion, WriteOptions};
use crate::datafile::DataFile;
use crate::error::IceError;

/// Gather `paths`, group them, and write a fresh archive to `sink`.
/// Returns the grouped source paths in packing order.
pub fn pack<W: Write>(
    sink: &mut W,
    paths: &[PathBuf],
    version: IceVersion,
    options: WriteOptions,
    group1_patterns: &[String],
    ignore_patterns: &[String],
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), IceError> {
    let (group1, group2) = group_files(paths, group1_patterns, ignore_patterns)?;
    if group1.is_empty() && group2.is_empty() {
        return Err(IceError::InvalidInput("no files to pack".into()));
    }

    let mut ice = IceFile::new(version);
    for path in &group1 {
        ice.group1_files.push(read_data_file(path)?);
    }
    for path in &group2 {
        ice.group2_files.push(read_data_file(path)?);
    }
    ice.write(sink, options)?;
    Ok((group1, group2))
}

fn read_data_file(path: &Path) -> Result<DataFile, IceError> {
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        IceError::InvalidInput(format!("cannot derive a file name from {}", path.display()))
    })?;
    let data = fs::read(path)?;
    DataFile::new(name, &data)
}

/// Split the input paths into the two groups, walking directories
/// recursively in file-name order.
pub fn group_files(
    paths: &[PathBuf],
    group1_patterns: &[String],
    ignore_patterns: &[String],
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), IceError> {
    let mut group1 = Vec::new();
    let mut group2 = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| IceError::Io(e.into()))?;
                if entry.file_type().is_file() {
                    route(
                        entry.path(),
                        Some(path),
                        group1_patterns,
                        ignore_patterns,
                        &mut group1,
                        &mut group2,
                    );
                }
            }
        } else if path.is_file() {
            route(path, None, group1_patterns, ignore_patterns, &mut group1, &mut group2);
        } else {
            return Err(IceError::InvalidInput(format!(
                "{} does not exist",
                path.display()
            )));
        }
    }

    Ok((group1, group2))
}

fn route(
    path: &Path,
    base: Option<&Path>,
    group1_patterns: &[String],
    ignore_patterns: &[String],
    group1: &mut Vec<PathBuf>,
    group2: &mut Vec<PathBuf>,
) {
    let name = match path.file_name() {
        Some(n) => n.to_string_lossy().into_owned(),
        None => return,
    };

    if ignore_patterns.iter().any(|p| wildcard_match(p, &name)) {
        return;
    }

    let in_group1 = base
        .and_then(|b| path.strip_prefix(b).ok())
        .map(|rel| rel.components().any(|c| c.as_os_str() == "group1"))
        .unwrap_or(false)
        || group1_patterns.iter().any(|p| wildcard_match(p, &name));

    if in_group1 {
        group1.push(path.to_path_buf());
    } else {
        group2.push(path.to_path_buf());
    }
}

/// Case-insensitive `*`/`?` wildcard match over a file name.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<u8> = pattern.bytes().map(|b| b.to_ascii_lowercase()).collect();
    let text: Vec<u8> = text.bytes().map(|b| b.to_ascii_lowercase()).collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
