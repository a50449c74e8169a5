use crate::plugin::errors::PluginError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Entry inside a plugin package describing it.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Parsed `manifest.json` of one plugin package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformerManifest {
    pub name: String,
    pub version: String,
    pub author: String,
    /// Id looked up in the [`TransformerRegistry`](crate::plugin::TransformerRegistry).
    pub entry_point: String,
    /// Semver requirement on the source archive's version id.
    pub supported_versions: Option<String>,
}

#[derive(Deserialize)]
struct RawManifest {
    name: String,
    version: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(alias = "main_class", alias = "mainClass")]
    entry_point: EntryPoints,
    #[serde(default)]
    supported_versions: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntryPoints {
    One(String),
    Many(Vec<String>),
}

impl TransformerManifest {
    pub fn parse(json: &str) -> Result<Self, String> {
        let raw: RawManifest = serde_json::from_str(json).map_err(|e| e.to_string())?;

        let entry_point = match raw.entry_point {
            EntryPoints::One(entry) => entry,
            EntryPoints::Many(mut entries) => match entries.len() {
                1 => entries.remove(0),
                0 => return Err("entry_point list is empty".to_string()),
                n => {
                    return Err(format!(
                        "declares {} entry points ({}), expected exactly one",
                        n,
                        entries.join(", ")
                    ))
                }
            },
        };
        let entry_point = entry_point.trim().to_string();
        if entry_point.is_empty() {
            return Err("entry_point is empty".to_string());
        }
        if raw.name.trim().is_empty() {
            return Err("name is empty".to_string());
        }

        Ok(Self {
            name: raw.name,
            version: raw.version,
            author: raw
                .author
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            entry_point,
            supported_versions: raw.supported_versions,
        })
    }

    /// Read and parse the manifest of the package at `path`.
    pub fn read_package(path: &Path) -> Result<Self, PluginError> {
        let manifest_err = |message: String| PluginError::Manifest {
            path: path.to_path_buf(),
            message,
        };
        let file = File::open(path).map_err(|e| manifest_err(e.to_string()))?;
        let mut zip = ZipArchive::new(file).map_err(|e| manifest_err(e.to_string()))?;
        let mut entry = zip
            .by_name(MANIFEST_ENTRY)
            .map_err(|_| manifest_err(format!("no {} entry", MANIFEST_ENTRY)))?;
        let mut json = String::new();
        entry
            .read_to_string(&mut json)
            .map_err(|e| manifest_err(e.to_string()))?;
        Self::parse(&json).map_err(manifest_err)
    }
}
