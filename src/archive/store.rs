use crate::archive::errors::ArchiveError;
use crate::archive::metadata::ArchiveMetadata;
use crate::atomic::atomic_write_with;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Reserved entry regenerated from [`ArchiveMetadata`] on every write.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Upper bound on the buffer reserved from a header's declared size.
const PREALLOC_LIMIT: u64 = 1 << 20;

/// Entry path inside an archive. Orders directories (trailing `/`) before
/// files, then lexically within each group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    pub fn new(path: impl Into<String>) -> Self {
        EntryPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }
}

impl Ord for EntryPath {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .is_dir()
            .cmp(&self.is_dir())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for EntryPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryPath {
    fn from(path: &str) -> Self {
        EntryPath::new(path)
    }
}

impl From<String> for EntryPath {
    fn from(path: String) -> Self {
        EntryPath(path)
    }
}

/// Ordered in-memory view of a zip container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<EntryPath, Vec<u8>>,
    metadata: ArchiveMetadata,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every entry of the container at `path`.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|e| ArchiveError::read(path, e))?;
        let mut zip = ZipArchive::new(file).map_err(|e| ArchiveError::read(path, e))?;

        let mut archive = Archive::new();
        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| ArchiveError::read(path, e))?;
            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size().min(PREALLOC_LIMIT) as usize);
            if !entry.is_dir() {
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|e| ArchiveError::read(path, format!("{}: {}", name, e)))?;
            }
            archive.entries.insert(EntryPath::new(name), bytes);
        }

        if let Some(manifest) = archive.entries.get(&EntryPath::from(MANIFEST_PATH)) {
            archive.metadata = ArchiveMetadata::parse(&String::from_utf8_lossy(manifest));
        }
        debug!(
            "Loaded {} entries from {}",
            archive.entries.len(),
            path.display()
        );
        Ok(archive)
    }

    /// Write the manifest, then every entry in order, to `destination`
    /// atomically. `base` attributes override same-named ones.
    pub fn write(&self, destination: &Path, base: &ArchiveMetadata) -> Result<(), ArchiveError> {
        let manifest = self.metadata.merged(base).render();
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        atomic_write_with(destination, |file| -> io::Result<()> {
            let mut zip = ZipWriter::new(file);
            zip.start_file(MANIFEST_PATH, options)
                .map_err(io::Error::other)?;
            zip.write_all(manifest.as_bytes())?;

            for (path, bytes) in &self.entries {
                if path.as_str() == MANIFEST_PATH {
                    continue;
                }
                if path.is_dir() {
                    zip.add_directory(path.as_str(), options)
                        .map_err(io::Error::other)?;
                } else {
                    zip.start_file(path.as_str(), options)
                        .map_err(io::Error::other)?;
                    zip.write_all(bytes)?;
                }
            }
            zip.finish().map_err(io::Error::other)?;
            Ok(())
        })
        .map_err(|e| ArchiveError::write(destination, e))?;

        debug!(
            "Wrote {} entries to {}",
            self.entries.len(),
            destination.display()
        );
        Ok(())
    }

    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ArchiveMetadata {
        &mut self.metadata
    }

    pub fn insert(&mut self, path: impl Into<EntryPath>, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.entries.insert(path.into(), bytes)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .get(&EntryPath::from(path))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&EntryPath::from(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &EntryPath> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryPath, &Vec<u8>)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&EntryPath, &mut Vec<u8>)> {
        self.entries.iter_mut()
    }
}
