//! Filesystem helpers shared by the page store and migration jobs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// into place, so a reader never observes a partially-written file.
///
/// # Errors
/// Returns an error if the temp file cannot be created, written, or renamed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp_path = tmp_path_for(path);
    {
        let mut f = create_secure(&tmp_path)?;
        f.write_all(contents)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    path.with_file_name(format!(".{file_name}.tmp"))
}

/// Create a file with restrictive permissions where supported.
///
/// On Unix, this maps to 0o600. On Windows, the default inherits ACLs.
///
/// # Errors
/// Returns an error if the file cannot be created/opened.
pub fn create_secure(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().write(true).create(true).truncate(true).open(path)
    }
}

/// Move `src` into `dest_dir`, appending a monotonically-increasing numeric
/// suffix to the filename on collision.
///
/// # Errors
/// Returns an error if the directory cannot be created or the move fails.
pub fn move_with_collision_suffix(src: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let file_name = src.file_name().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing file name"))?;
    let mut dest = dest_dir.join(file_name);
    let mut suffix = 1u64;
    while dest.exists() {
        let stem = src.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
        let ext = src.extension().and_then(|s| s.to_str());
        let name = match ext {
            Some(ext) => format!("{stem}.{suffix}.{ext}"),
            None => format!("{stem}.{suffix}"),
        };
        dest = dest_dir.join(name);
        suffix += 1;
    }
    fs::rename(src, &dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        let tmp = tmp_path_for(&path);
        assert!(!tmp.exists());
    }

    #[test]
    fn move_with_collision_suffix_renames_on_conflict() {
        let dir = tempdir().unwrap();
        let dest_dir = dir.path().join("__deleted__");
        let src1 = dir.path().join("abc.md");
        fs::write(&src1, b"one").unwrap();
        let moved1 = move_with_collision_suffix(&src1, &dest_dir).unwrap();
        assert_eq!(moved1, dest_dir.join("abc.md"));

        let src2 = dir.path().join("abc.md");
        fs::write(&src2, b"two").unwrap();
        let moved2 = move_with_collision_suffix(&src2, &dest_dir).unwrap();
        assert_eq!(moved2, dest_dir.join("abc.1.md"));
        assert_eq!(fs::read(&moved2).unwrap(), b"two");
    }
}
