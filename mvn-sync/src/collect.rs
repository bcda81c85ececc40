//! Local file collection for a batch.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;
use walkdir::WalkDir;

/// Canonical form of `root`, which has to be an existing directory.
pub fn canonical_root(root: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(root)
        .with_context(|| format!("repository root {} cannot be resolved", root.display()))?;
    if !canonical.is_dir() {
        bail!("repository root {} is not a directory", root.display());
    }
    Ok(canonical)
}

/// Every regular file below `root` as an absolute path, sorted.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let root = canonical_root(root)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    debug!(root = %root.display(), count = files.len(), "collected local files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collects_nested_files_sorted() {
        let dir = tempdir().expect("tempdir");
        let version_dir = dir.path().join("org/example/lib/1.0");
        fs::create_dir_all(&version_dir).expect("create dirs");
        fs::write(version_dir.join("lib-1.0.pom"), b"<project/>").expect("write pom");
        fs::write(version_dir.join("lib-1.0.jar"), b"jar").expect("write jar");
        fs::create_dir_all(dir.path().join("empty")).expect("create empty dir");

        let files = collect_files(dir.path()).expect("collect");

        let root = fs::canonicalize(dir.path()).expect("canonical");
        assert_eq!(
            files,
            vec![
                root.join("org/example/lib/1.0/lib-1.0.jar"),
                root.join("org/example/lib/1.0/lib-1.0.pom"),
            ]
        );
        assert!(files.iter().all(|f| f.is_absolute()));
    }

    #[test]
    fn test_rejects_missing_root() {
        let dir = tempdir().expect("tempdir");
        let err = collect_files(&dir.path().join("absent")).unwrap_err();
        assert!(err.to_string().contains("cannot be resolved"));
    }

    #[test]
    fn test_rejects_file_root() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("a.txt");
        fs::write(&file, b"x").expect("write");
        let err = collect_files(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
