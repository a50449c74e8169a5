use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Atomic file write: tempfile in the same directory, fsync, rename.
///
/// Either the old file or the complete new one is visible at `path`.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    atomic_write_with(path, |file| file.write_all(content))
}

/// Like [`atomic_write`], but the content is produced by `write`.
pub(crate) fn atomic_write_with<E, F>(path: &Path, write: F) -> Result<(), E>
where
    F: FnOnce(&mut File) -> Result<(), E>,
    E: From<io::Error>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            )
            .into())
        }
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("digest");
        fs::write(&path, "old").unwrap();

        atomic_write(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/out.bin");

        atomic_write(&path, &[1, 2, 3]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_failed_writer_leaves_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact");
        fs::write(&path, "intact").unwrap();

        let result: io::Result<()> = atomic_write_with(&path, |file| {
            file.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "intact");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
