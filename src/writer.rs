//! Crash-safe ring file writer.
//!
//! Uses the write-fsync-rename pattern so that readers never observe a
//! partial or zero-length ring file:
//!
//! 1. Write all bytes to a temporary file in the destination directory
//!    (same filesystem, so the final step is a plain rename)
//! 2. fsync the temporary file
//! 3. Set standard readable permissions
//! 4. Atomic rename onto the destination path
//! 5. fsync the parent directory
//!
//! Any failure before the rename leaves the destination untouched; the
//! rename is the single durability/visibility commit point.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Atomic writer for a single ring file.
pub struct AtomicRingWriter {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl AtomicRingWriter {
    /// Open a temporary file next to `path`, ready to receive ring bytes.
    ///
    /// A stale temporary file left by an interrupted writer is truncated
    /// and reused.
    pub fn create(path: &Path) -> io::Result<Self> {
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination path has no file name",
            )
        })?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp_path = dir.join(format!(".{}.tmp", name.to_string_lossy()));

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;

        Ok(AtomicRingWriter {
            file,
            temp_path,
            final_path: path.to_path_buf(),
        })
    }

    /// Append bytes to the temporary file.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Force the bytes to stable storage and atomically publish them at the
    /// destination path.
    ///
    /// On failure the temporary file is removed and the destination is left
    /// untouched.
    pub fn commit(self) -> io::Result<()> {
        let AtomicRingWriter {
            file,
            temp_path,
            final_path,
        } = self;

        let result = Self::sync_and_rename(file, &temp_path, &final_path);
        if result.is_err() {
            // Already gone if the rename itself went through.
            let _ = std::fs::remove_file(&temp_path);
        }
        result
    }

    fn sync_and_rename(file: File, temp_path: &Path, final_path: &Path) -> io::Result<()> {
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }

        drop(file);
        std::fs::rename(temp_path, final_path)?;

        let dir = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        File::open(&dir)?.sync_all()?;

        debug!(path = %final_path.display(), "committed ring file");
        Ok(())
    }

    /// Discard the temporary file, leaving the destination untouched.
    pub fn abort(self) -> io::Result<()> {
        let AtomicRingWriter {
            file, temp_path, ..
        } = self;
        drop(file);
        std::fs::remove_file(&temp_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_publishes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");

        let mut writer = AtomicRingWriter::create(&path).unwrap();
        writer.write_all(b"ring bytes").unwrap();
        writer.commit().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"ring bytes");
        assert!(!dir.path().join(".object.ring.gz.tmp").exists());
    }

    #[test]
    fn test_uncommitted_write_leaves_destination_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");
        std::fs::write(&path, b"previous contents").unwrap();

        let mut writer = AtomicRingWriter::create(&path).unwrap();
        writer.write_all(b"half-written replacement").unwrap();
        // Simulate an interruption before the rename.
        drop(writer);

        assert_eq!(std::fs::read(&path).unwrap(), b"previous contents");
    }

    #[test]
    fn test_abort_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");

        let mut writer = AtomicRingWriter::create(&path).unwrap();
        writer.write_all(b"doomed").unwrap();
        writer.abort().unwrap();

        assert!(!path.exists());
        assert!(!dir.path().join(".object.ring.gz.tmp").exists());
    }

    #[test]
    fn test_failed_commit_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");
        // A directory at the destination makes the rename fail.
        std::fs::create_dir(&path).unwrap();

        let mut writer = AtomicRingWriter::create(&path).unwrap();
        writer.write_all(b"doomed").unwrap();
        assert!(writer.commit().is_err());

        assert!(!dir.path().join(".object.ring.gz.tmp").exists());
    }

    #[test]
    fn test_stale_temp_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");
        std::fs::write(dir.path().join(".object.ring.gz.tmp"), b"stale leftovers").unwrap();

        let mut writer = AtomicRingWriter::create(&path).unwrap();
        writer.write_all(b"fresh").unwrap();
        writer.commit().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn test_missing_file_name_rejected() {
        let result = AtomicRingWriter::create(Path::new("/"));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_committed_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");

        let mut writer = AtomicRingWriter::create(&path).unwrap();
        writer.write_all(b"ring bytes").unwrap();
        writer.commit().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
