//! Filesystem helpers shared by the store, installer and actions

use crate::error::{ProtopinError, ProtopinResult};
use std::path::{Component, Path, PathBuf};

/// Lexically clean a path: drop `.` components, fold `..` into their parent
/// where possible, and normalize separators. Purely textual, no filesystem
/// access.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Whether `path` exists and is a regular file
pub fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Whether `path` exists and is a directory
pub fn is_dir(path: &Path) -> bool {
    path.is_dir()
}

/// Copy a file, creating the destination's parent directories
pub fn copy_file(src: &Path, dst: &Path) -> ProtopinResult<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ProtopinError::io(format!("creating directory {}", parent.display()), e))?;
    }
    std::fs::copy(src, dst).map_err(|e| {
        ProtopinError::io(
            format!("copying {} to {}", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

/// Recursively copy `src` into `dst` with merge semantics: existing files
/// are overwritten, files only present in `dst` are left alone.
pub fn copy_dir_merge(src: &Path, dst: &Path) -> ProtopinResult<()> {
    std::fs::create_dir_all(dst)
        .map_err(|e| ProtopinError::io(format!("creating directory {}", dst.display()), e))?;
    let entries = std::fs::read_dir(src)
        .map_err(|e| ProtopinError::io(format!("reading directory {}", src.display()), e))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| ProtopinError::io(format!("reading directory {}", src.display()), e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| ProtopinError::io(format!("stat {}", from.display()), e))?;
        if file_type.is_dir() {
            copy_dir_merge(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

/// List files with the given extension directly inside `dir` (no recursion)
pub fn files_with_ext(dir: &Path, ext: &str) -> ProtopinResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ProtopinError::io(format!("reading directory {}", dir.display()), e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| ProtopinError::io(format!("reading directory {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// List files with the given extension under `dir`, recursively
pub fn files_with_ext_recursive(dir: &Path, ext: &str) -> ProtopinResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_files(dir, &mut |path| {
        if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            found.push(path.to_path_buf());
        }
    })?;
    found.sort();
    Ok(found)
}

/// List every file under `dir`, recursively
pub fn all_files_recursive(dir: &Path) -> ProtopinResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_files(dir, &mut |path| found.push(path.to_path_buf()))?;
    found.sort();
    Ok(found)
}

fn collect_files(dir: &Path, visit: &mut dyn FnMut(&Path)) -> ProtopinResult<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ProtopinError::io(format!("reading directory {}", dir.display()), e))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| ProtopinError::io(format!("reading directory {}", dir.display()), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| ProtopinError::io(format!("stat {}", path.display()), e))?;
        if file_type.is_dir() {
            collect_files(&path, visit)?;
        } else if file_type.is_file() {
            visit(&path);
        }
    }
    Ok(())
}
