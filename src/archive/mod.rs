//! Compiled-module archives: zip containers with a JAR manifest.

mod errors;
mod metadata;
mod source;
mod store;

pub use errors::ArchiveError;
pub use metadata::{ArchiveMetadata, ManifestSection};
pub use source::{dump_entries, SourceArchive, VERSION_PATH};
pub use store::{Archive, EntryPath, MANIFEST_PATH};
